//! Per-turn aggregator task
//!
//! The aggregator state is owned by a single task and fed over a channel, so
//! concurrent turns never share it.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{TurnAggregator, TurnSummary};
use crate::constants::aggregator::CHANNEL_CAPACITY;
use crate::events::AgentEvent;

pub struct AggregatorHandle {
    tx: mpsc::Sender<AgentEvent>,
    task: JoinHandle<TurnSummary>,
}

impl AggregatorHandle {
    /// Move the aggregator onto its own task
    pub fn spawn(mut aggregator: TurnAggregator) -> Self {
        let (tx, mut rx) = mpsc::channel::<AgentEvent>(CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                aggregator.handle(&event).await;
            }
            let summary = aggregator.summary();
            debug!(?summary, "Aggregator finished");
            summary
        });
        Self { tx, task }
    }

    /// Queue an event; returns false if the task is gone
    pub async fn send(&self, event: AgentEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Close the input and wait for the remaining events to be applied
    pub async fn finish(self) -> Result<TurnSummary> {
        drop(self.tx);
        self.task.await.context("Aggregator task failed")
    }
}
