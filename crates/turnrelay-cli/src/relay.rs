//! `turnrelay relay` - stream one turn into a chat thread

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use turnrelay_core::{
    AggregatorHandle, AggregatorSettings, ContinueRequest, HttpChatSink, RelayClient,
    RelayConfig, StartRequest, StreamOutcome, TurnAggregator,
};

pub enum Turn {
    Start(String),
    Continue {
        answer: String,
        session_id: String,
        plan_id: Option<String>,
    },
}

pub async fn run(
    config: RelayConfig,
    turn: Turn,
    channel: String,
    thread: Option<String>,
) -> Result<()> {
    let sink = HttpChatSink::from_config(&config.chat).with_context(|| {
        format!(
            "Chat token missing; set chat.token or {}",
            config.chat.token_env
        )
    })?;
    let client = RelayClient::from_config(&config.client);

    let opened = match turn {
        Turn::Start(prompt) => client.start(&StartRequest::new(prompt)).await,
        Turn::Continue {
            answer,
            session_id,
            plan_id,
        } => {
            let request = ContinueRequest {
                answer: Some(answer),
                session_id: Some(session_id),
                plan_id,
                ..Default::default()
            };
            client.resume(&request).await
        }
    };

    let aggregator = TurnAggregator::new(
        Arc::new(sink),
        channel,
        thread,
        AggregatorSettings::from_config(&config),
    );
    let handle = AggregatorHandle::spawn(aggregator);

    let outcome = match opened {
        Ok(mut stream) => {
            while let Some(event) = stream.next_event().await {
                if !handle.send(event).await {
                    warn!("Aggregator stopped early");
                    break;
                }
            }
            stream.outcome()
        }
        Err(err) => {
            // Rejected before streaming; surface it in the thread too
            handle.send(err.to_event()).await;
            StreamOutcome::Failed(err)
        }
    };

    let summary = handle.finish().await?;
    info!(?summary, "Relay finished");
    println!(
        "{} message(s) posted, {} edit(s), {} fallback post(s), {} notice(s), {} chars",
        summary.messages_created,
        summary.edits,
        summary.edit_fallbacks,
        summary.notices,
        summary.chars
    );

    outcome.into_result().context("Turn failed")
}
