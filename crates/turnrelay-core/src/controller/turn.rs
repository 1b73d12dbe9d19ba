//! Turn task
//!
//! Relays agent events to the consumer and persists their side effects:
//! - `init` links the agent session to the plan (once)
//! - the first `question` commits pending assistant text and becomes the
//!   plan's pending question; later questions are dropped
//! - `result` is stamped with the plan id and clears the pending question
//! - stream end commits the remaining assistant text as one entry
//!
//! Persistence failures are logged and never end the relay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{AgentEvent, RelayError};
use crate::plan::{EntryRole, PlanUpdate};
use crate::storage::ConversationStore;

enum Flow {
    Continue,
    Stop,
}

pub(super) struct Turn {
    store: Arc<dyn ConversationStore>,
    plan_id: String,
    tx: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
    accumulated: String,
    question_seen: bool,
    session_recorded: bool,
    timeout: Duration,
}

impl Turn {
    pub(super) fn new(
        store: Arc<dyn ConversationStore>,
        plan_id: String,
        tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
        session_recorded: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            plan_id,
            tx,
            cancel,
            accumulated: String::new(),
            question_seen: false,
            session_recorded,
            timeout,
        }
    }

    pub(super) async fn run(mut self, mut agent_rx: mpsc::Receiver<AgentEvent>) {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.tx.closed() => {
                    info!(plan_id = %self.plan_id, "Consumer disconnected, cancelling turn");
                    self.cancel.cancel();
                    return;
                }
                _ = &mut deadline => {
                    warn!(plan_id = %self.plan_id, "Turn timed out after {:?}", self.timeout);
                    self.cancel.cancel();
                    let error = RelayError::timeout(format!(
                        "turn exceeded {}s",
                        self.timeout.as_secs()
                    ));
                    if let Flow::Continue = self.forward(error.to_event()).await {
                        self.commit().await;
                        let _ = self.tx.send(AgentEvent::done()).await;
                    }
                    return;
                }
                event = agent_rx.recv() => match event {
                    Some(event) => {
                        if let Flow::Stop = self.process(event).await {
                            return;
                        }
                    }
                    None => {
                        debug!(plan_id = %self.plan_id, "Agent closed without done");
                        self.commit().await;
                        let _ = self.tx.send(AgentEvent::done()).await;
                        return;
                    }
                }
            }
        }
    }

    async fn process(&mut self, event: AgentEvent) -> Flow {
        match event {
            AgentEvent::Init(init) => {
                self.record_session(&init.session_id).await;
                self.forward(AgentEvent::Init(init)).await
            }
            AgentEvent::Text(text) => {
                self.accumulated.push_str(&text.content);
                self.forward(AgentEvent::Text(text)).await
            }
            AgentEvent::Question(set) => {
                if self.question_seen {
                    debug!(
                        plan_id = %self.plan_id,
                        tool_use_id = %set.tool_use_id,
                        "Dropping additional question"
                    );
                    return Flow::Continue;
                }
                self.question_seen = true;
                self.commit().await;
                log_store_error(
                    &self.plan_id,
                    "persist pending question",
                    self.store
                        .set_pending_question(&self.plan_id, Some(&set))
                        .await,
                );
                self.forward(AgentEvent::Question(set)).await
            }
            AgentEvent::Result(mut result) => {
                if let Some(session_id) = result.session_id.clone() {
                    self.record_session(&session_id).await;
                }
                self.accumulated.push_str(&result.content);
                result.plan_id = Some(self.plan_id.clone());
                log_store_error(
                    &self.plan_id,
                    "clear pending question",
                    self.store.set_pending_question(&self.plan_id, None).await,
                );
                self.forward(AgentEvent::Result(result)).await
            }
            AgentEvent::Done(done) => {
                if let Some(session_id) = done.session_id.clone() {
                    self.record_session(&session_id).await;
                }
                self.commit().await;
                self.forward(AgentEvent::Done(done)).await;
                Flow::Stop
            }
            other => self.forward(other).await,
        }
    }

    /// Send downstream; a closed consumer cancels the turn
    async fn forward(&mut self, event: AgentEvent) -> Flow {
        if self.tx.send(event).await.is_err() {
            info!(plan_id = %self.plan_id, "Consumer disconnected, cancelling turn");
            self.cancel.cancel();
            return Flow::Stop;
        }
        Flow::Continue
    }

    async fn record_session(&mut self, session_id: &str) {
        if self.session_recorded {
            return;
        }
        self.session_recorded = true;
        log_store_error(
            &self.plan_id,
            "link session",
            self.store
                .update_plan(&self.plan_id, PlanUpdate::session(session_id))
                .await,
        );
    }

    /// Persist accumulated assistant text as one entry
    async fn commit(&mut self) {
        if self.accumulated.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.accumulated);
        log_store_error(
            &self.plan_id,
            "persist assistant entry",
            self.store
                .append(&self.plan_id, EntryRole::Assistant, &content)
                .await,
        );
    }
}

fn log_store_error(plan_id: &str, action: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        warn!(plan_id = %plan_id, "Failed to {}: {:#}", action, e);
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use async_trait::async_trait;

    use super::*;
    use crate::events::{InitData, Question, QuestionSet, ResultData};

    /// Store whose every write fails
    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn create_plan(
            &self,
            _: Option<&str>,
            _: &str,
            _: &str,
        ) -> anyhow::Result<crate::plan::Plan> {
            bail!("disk full")
        }
        async fn update_plan(&self, _: &str, _: PlanUpdate) -> anyhow::Result<()> {
            bail!("disk full")
        }
        async fn append(&self, _: &str, _: EntryRole, _: &str) -> anyhow::Result<()> {
            bail!("disk full")
        }
        async fn set_pending_question(
            &self,
            _: &str,
            _: Option<&QuestionSet>,
        ) -> anyhow::Result<()> {
            bail!("disk full")
        }
        async fn record_answer(&self, _: &str, _: &str) -> anyhow::Result<()> {
            bail!("disk full")
        }
        async fn get_plan(&self, _: &str) -> anyhow::Result<Option<crate::plan::Plan>> {
            bail!("disk full")
        }
        async fn find_plan_by_session(
            &self,
            _: &str,
        ) -> anyhow::Result<Option<crate::plan::Plan>> {
            bail!("disk full")
        }
        async fn conversation(
            &self,
            _: &str,
        ) -> anyhow::Result<Vec<crate::plan::ConversationEntry>> {
            bail!("disk full")
        }
    }

    fn events() -> Vec<AgentEvent> {
        vec![
            AgentEvent::Init(InitData {
                session_id: "s1".into(),
                model: None,
                cwd: None,
            }),
            AgentEvent::text("Hi"),
            AgentEvent::Question(QuestionSet {
                tool_use_id: "q1".into(),
                questions: vec![Question {
                    text: "Which?".into(),
                    header: None,
                    options: vec![],
                    multi_select: false,
                }],
            }),
            AgentEvent::Result(ResultData {
                content: "Done".into(),
                plan_id: None,
                session_id: None,
                duration_ms: None,
                cost_usd: None,
            }),
        ]
    }

    #[tokio::test]
    async fn test_store_failures_do_not_stop_relay() {
        let (agent_tx, agent_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let turn = Turn::new(
            Arc::new(BrokenStore),
            "p1".into(),
            tx,
            CancellationToken::new(),
            false,
            Duration::from_secs(5),
        );

        for event in events() {
            agent_tx.send(event).await.unwrap();
        }
        drop(agent_tx);
        turn.run(agent_rx).await;

        let mut relayed = Vec::new();
        while let Some(event) = rx.recv().await {
            relayed.push(event);
        }
        let kinds: Vec<_> = relayed.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["init", "text", "question", "result", "done"]);
        let AgentEvent::Result(result) = &relayed[3] else {
            panic!("expected result");
        };
        assert_eq!(result.plan_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_dropped_consumer_cancels_turn() {
        let (_agent_tx, agent_rx) = mpsc::channel::<AgentEvent>(8);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let cancel = CancellationToken::new();
        let turn = Turn::new(
            Arc::new(BrokenStore),
            "p1".into(),
            tx,
            cancel.clone(),
            false,
            Duration::from_secs(5),
        );
        turn.run(agent_rx).await;
        assert!(cancel.is_cancelled());
    }
}
