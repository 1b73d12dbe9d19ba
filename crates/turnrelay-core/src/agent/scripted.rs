//! Scripted agent that replays fixed events
//!
//! Used by tests and demos in place of a real agent process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{AgentRequest, AgentRunner};
use crate::events::{AgentEvent, RelayError};

#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    events: Vec<AgentEvent>,
    delay: Option<Duration>,
    spawn_error: Option<RelayError>,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
}

impl ScriptedAgent {
    pub fn new(events: Vec<AgentEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Pause between events
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every spawn with this error
    pub fn failing(error: RelayError) -> Self {
        Self {
            spawn_error: Some(error),
            ..Default::default()
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn spawn(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<AgentEvent>, RelayError> {
        self.requests.lock().push(request);
        if let Some(err) = &self.spawn_error {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(self.events.len().max(1));
        let events = self.events.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            for event in events {
                if let Some(delay) = delay {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() || tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_events_in_order() {
        let agent = ScriptedAgent::new(vec![AgentEvent::text("a"), AgentEvent::done()]);
        let mut rx = agent
            .spawn(AgentRequest::new("go"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(AgentEvent::text("a")));
        assert_eq!(rx.recv().await, Some(AgentEvent::done()));
        assert_eq!(rx.recv().await, None);
        assert_eq!(agent.requests()[0].prompt, "go");
    }

    #[tokio::test]
    async fn test_failing_spawn() {
        let agent = ScriptedAgent::failing(RelayError::process("no agent"));
        assert!(agent
            .spawn(AgentRequest::new("x"), CancellationToken::new())
            .await
            .is_err());
        assert_eq!(agent.requests().len(), 1);
    }
}
