//! Session/plan controller
//!
//! Validates start/continue requests, creates or resolves the plan, starts
//! the agent and hands back the turn's event stream. The stream relays
//! agent events verbatim while the turn task persists their side effects.

mod turn;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgentRequest, AgentRunner};
use crate::constants;
use crate::events::error::{
    MISSING_ANSWER, MISSING_PROMPT, MISSING_SESSION_ID, PLAN_NOT_FOUND, SESSION_MISMATCH,
};
use crate::events::{AgentEvent, PlanCreatedData, RelayError};
use crate::plan::{auto_name, EntryRole};
use crate::storage::ConversationStore;

use turn::Turn;

/// Body of a start request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<String>,
}

impl StartRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }
}

/// Body of a continue request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<String>,
}

/// Events of one turn, in emission order
///
/// Dropping the stream cancels the turn.
pub struct TurnStream {
    plan_id: String,
    events: mpsc::Receiver<AgentEvent>,
}

impl TurnStream {
    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub async fn next(&mut self) -> Option<AgentEvent> {
        self.events.recv().await
    }

    /// Drain every remaining event
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> ReceiverStream<AgentEvent> {
        ReceiverStream::new(self.events)
    }
}

pub struct PlanController {
    store: Arc<dyn ConversationStore>,
    agent: Arc<dyn AgentRunner>,
    turn_timeout: Duration,
}

impl PlanController {
    pub fn new(store: Arc<dyn ConversationStore>, agent: Arc<dyn AgentRunner>) -> Self {
        Self {
            store,
            agent,
            turn_timeout: Duration::from_secs(constants::agent::TURN_TIMEOUT_SECS),
        }
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Start a fresh turn on a new plan
    ///
    /// The first event of the stream is always `plan_created`.
    pub async fn start(&self, request: StartRequest) -> Result<TurnStream, RelayError> {
        let prompt = non_empty(request.prompt.as_deref())
            .ok_or_else(|| RelayError::validation(MISSING_PROMPT, "prompt is required"))?
            .to_string();

        let name = auto_name(&prompt);
        let plan_id = match self
            .store
            .create_plan(request.project_id.as_deref(), &name, &name)
            .await
        {
            Ok(plan) => plan.id,
            Err(e) => {
                // Relay without a persisted plan rather than failing the turn
                let ephemeral = uuid::Uuid::new_v4().to_string();
                warn!(plan_id = %ephemeral, "Failed to create plan: {:#}", e);
                ephemeral
            }
        };
        info!(plan_id = %plan_id, name = %name, "Starting turn");

        if let Err(e) = self.store.append(&plan_id, EntryRole::User, &prompt).await {
            warn!(plan_id = %plan_id, "Failed to persist prompt: {:#}", e);
        }

        let agent_request = AgentRequest {
            prompt,
            resume_session_id: None,
            project_path: request.project_path.map(PathBuf::from),
            image_paths: request.image_paths.into_iter().map(PathBuf::from).collect(),
        };

        let created = AgentEvent::PlanCreated(PlanCreatedData {
            plan_id: plan_id.clone(),
            name,
        });
        self.launch(plan_id, agent_request, false, Some(created)).await
    }

    /// Answer a pending question and resume the agent session
    pub async fn resume(&self, request: ContinueRequest) -> Result<TurnStream, RelayError> {
        let answer = non_empty(request.answer.as_deref())
            .ok_or_else(|| RelayError::validation(MISSING_ANSWER, "answer is required"))?
            .to_string();
        let session_id = non_empty(request.session_id.as_deref())
            .ok_or_else(|| RelayError::validation(MISSING_SESSION_ID, "sessionId is required"))?
            .to_string();

        let lookup = match request.plan_id.as_deref() {
            Some(plan_id) => self.store.get_plan(plan_id).await,
            None => self.store.find_plan_by_session(&session_id).await,
        };
        let plan = lookup
            .map_err(|e| RelayError::unknown(format!("Failed to load plan: {:#}", e)))?
            .ok_or_else(|| {
                RelayError::session(
                    PLAN_NOT_FOUND,
                    format!("no plan found for session {}", session_id),
                )
            })?;
        if let Some(linked) = plan.session_id.as_deref() {
            if linked != session_id {
                return Err(RelayError::session(
                    SESSION_MISMATCH,
                    format!("plan {} belongs to session {}, not {}", plan.id, linked, session_id),
                ));
            }
        }
        info!(plan_id = %plan.id, session_id = %session_id, "Continuing turn");

        if let Err(e) = self.store.record_answer(&plan.id, &answer).await {
            warn!(plan_id = %plan.id, "Failed to persist answer: {:#}", e);
        }

        let agent_request = AgentRequest {
            prompt: answer,
            resume_session_id: Some(session_id),
            project_path: request.project_path.map(PathBuf::from),
            image_paths: request.image_paths.into_iter().map(PathBuf::from).collect(),
        };
        let has_session = plan.session_id.is_some();
        self.launch(plan.id, agent_request, has_session, None).await
    }

    async fn launch(
        &self,
        plan_id: String,
        request: AgentRequest,
        session_recorded: bool,
        first: Option<AgentEvent>,
    ) -> Result<TurnStream, RelayError> {
        let cancel = CancellationToken::new();
        let agent_rx = self.agent.spawn(request, cancel.clone()).await?;

        let (tx, rx) = mpsc::channel(constants::agent::EVENT_CHANNEL_CAPACITY);
        if let Some(event) = first {
            // Fresh channel with spare capacity
            let _ = tx.try_send(event);
        }

        let turn = Turn::new(
            Arc::clone(&self.store),
            plan_id.clone(),
            tx,
            cancel,
            session_recorded,
            self.turn_timeout,
        );
        tokio::spawn(turn.run(agent_rx));

        Ok(TurnStream {
            plan_id,
            events: rx,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::agent::ScriptedAgent;
    use crate::events::{ErrorKind, InitData, Question, QuestionSet, ResultData};
    use crate::storage::SqliteStore;

    fn setup(events: Vec<AgentEvent>) -> (PlanController, SqliteStore, ScriptedAgent, TempDir) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteStore::open(&temp.path().join("test.db")).expect("Failed to open store");
        let agent = ScriptedAgent::new(events);
        let controller = PlanController::new(Arc::new(store.clone()), Arc::new(agent.clone()));
        (controller, store, agent, temp)
    }

    fn init(session: &str) -> AgentEvent {
        AgentEvent::Init(InitData {
            session_id: session.into(),
            model: None,
            cwd: None,
        })
    }

    fn result(content: &str) -> AgentEvent {
        AgentEvent::Result(ResultData {
            content: content.into(),
            plan_id: None,
            session_id: None,
            duration_ms: None,
            cost_usd: None,
        })
    }

    fn question(id: &str) -> AgentEvent {
        AgentEvent::Question(QuestionSet {
            tool_use_id: id.into(),
            questions: vec![Question {
                text: "Which?".into(),
                header: None,
                options: vec![],
                multi_select: false,
            }],
        })
    }

    #[tokio::test]
    async fn test_start_commits_one_assistant_entry() {
        let (controller, store, _agent, _temp) =
            setup(vec![AgentEvent::text("Hi"), result("Done"), AgentEvent::done()]);

        let stream = controller.start(StartRequest::new("Hello")).await.unwrap();
        let plan_id = stream.plan_id().to_string();
        let events = stream.collect().await;

        assert!(matches!(&events[0], AgentEvent::PlanCreated(c) if c.plan_id == plan_id && c.name == "Hello"));
        assert_eq!(events.last(), Some(&AgentEvent::done()));
        let AgentEvent::Result(stamped) = &events[2] else {
            panic!("expected result, got {:?}", events[2]);
        };
        assert_eq!(stamped.plan_id.as_deref(), Some(plan_id.as_str()));

        let entries = store.conversation(&plan_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, EntryRole::User);
        assert_eq!(entries[0].content, "Hello");
        assert_eq!(entries[1].role, EntryRole::Assistant);
        assert_eq!(entries[1].content, "HiDone");
    }

    #[tokio::test]
    async fn test_start_requires_prompt() {
        let (controller, _store, agent, _temp) = setup(vec![]);
        let err = controller
            .start(StartRequest {
                prompt: Some("   ".into()),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.code.as_deref(), Some(MISSING_PROMPT));
        assert!(agent.requests().is_empty());
    }

    #[tokio::test]
    async fn test_long_prompt_is_truncated_for_name() {
        let (controller, store, _agent, _temp) = setup(vec![AgentEvent::done()]);
        let prompt = "p".repeat(70);
        let stream = controller.start(StartRequest::new(prompt)).await.unwrap();
        let plan_id = stream.plan_id().to_string();
        stream.collect().await;

        let plan = store.get_plan(&plan_id).await.unwrap().unwrap();
        assert_eq!(plan.name, format!("{}...", "p".repeat(50)));
        assert_eq!(plan.description, plan.name);
    }

    #[tokio::test]
    async fn test_resume_requires_session_id() {
        let (controller, _store, agent, _temp) = setup(vec![]);
        let err = controller
            .resume(ContinueRequest {
                answer: Some("yes".into()),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.code.as_deref(), Some(MISSING_SESSION_ID));
        assert!(agent.requests().is_empty());
    }

    #[tokio::test]
    async fn test_resume_requires_answer() {
        let (controller, _store, _agent, _temp) = setup(vec![]);
        let err = controller
            .resume(ContinueRequest {
                session_id: Some("s1".into()),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert_eq!(err.code.as_deref(), Some(MISSING_ANSWER));
    }

    #[tokio::test]
    async fn test_resume_unknown_session_is_plan_not_found() {
        let (controller, _store, agent, _temp) = setup(vec![]);
        let err = controller
            .resume(ContinueRequest {
                answer: Some("yes".into()),
                session_id: Some("nope".into()),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Session);
        assert_eq!(err.code.as_deref(), Some(PLAN_NOT_FOUND));
        assert!(agent.requests().is_empty());
    }

    #[tokio::test]
    async fn test_resume_rejects_plan_of_other_session() {
        let (controller, store, agent, _temp) =
            setup(vec![init("sess-1"), question("q1"), AgentEvent::done()]);
        let stream = controller.start(StartRequest::new("Plan it")).await.unwrap();
        let plan_id = stream.plan_id().to_string();
        stream.collect().await;

        let err = controller
            .resume(ContinueRequest {
                answer: Some("yes".into()),
                session_id: Some("sess-2".into()),
                plan_id: Some(plan_id.clone()),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Session);
        assert_eq!(err.code.as_deref(), Some(SESSION_MISMATCH));
        assert_eq!(agent.requests().len(), 1);

        // Nothing was recorded against the plan
        let plan = store.get_plan(&plan_id).await.unwrap().unwrap();
        assert_eq!(plan.pending_question.unwrap().tool_use_id, "q1");
        assert_eq!(store.conversation(&plan_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_question_then_resume_cycle() {
        let (controller, store, agent, _temp) = setup(vec![
            init("sess-1"),
            AgentEvent::text("Let me ask."),
            question("q1"),
            question("q2"),
            AgentEvent::done(),
        ]);

        let stream = controller.start(StartRequest::new("Plan it")).await.unwrap();
        let plan_id = stream.plan_id().to_string();
        let events = stream.collect().await;

        let questions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Question(set) => Some(set.tool_use_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(questions, vec!["q1"]);

        let plan = store.get_plan(&plan_id).await.unwrap().unwrap();
        assert_eq!(plan.session_id.as_deref(), Some("sess-1"));
        assert_eq!(plan.pending_question.unwrap().tool_use_id, "q1");
        let entries = store.conversation(&plan_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].content, "Let me ask.");

        // Resume resolves the plan by session
        let stream = controller
            .resume(ContinueRequest {
                answer: Some("Postgres".into()),
                session_id: Some("sess-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stream.plan_id(), plan_id);
        stream.collect().await;

        let requests = agent.requests();
        assert_eq!(requests[1].prompt, "Postgres");
        assert_eq!(requests[1].resume_session_id.as_deref(), Some("sess-1"));

        let entries = store.conversation(&plan_id).await.unwrap();
        assert_eq!(entries[2].role, EntryRole::User);
        assert_eq!(entries[2].content, "Postgres");
    }

    #[tokio::test]
    async fn test_synthetic_done_when_agent_closes() {
        let (controller, store, _agent, _temp) = setup(vec![AgentEvent::text("partial")]);
        let stream = controller.start(StartRequest::new("x")).await.unwrap();
        let plan_id = stream.plan_id().to_string();
        let events = stream.collect().await;

        let dones = events.iter().filter(|e| matches!(e, AgentEvent::Done(_))).count();
        assert_eq!(dones, 1);
        assert_eq!(events.last(), Some(&AgentEvent::done()));

        let entries = store.conversation(&plan_id).await.unwrap();
        assert_eq!(entries.last().unwrap().content, "partial");
    }

    #[tokio::test]
    async fn test_agent_spawn_failure_is_synchronous() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp.path().join("test.db")).unwrap();
        let agent = ScriptedAgent::failing(RelayError::process("no agent"));
        let controller = PlanController::new(Arc::new(store), Arc::new(agent));

        let err = controller.start(StartRequest::new("x")).await.err().unwrap();
        assert_eq!(err.kind, ErrorKind::Process);
    }

    #[tokio::test]
    async fn test_turn_timeout_emits_timeout_error() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp.path().join("test.db")).unwrap();
        let agent = ScriptedAgent::new(vec![AgentEvent::text("slow"), AgentEvent::done()])
            .with_delay(Duration::from_secs(5));
        let controller = PlanController::new(Arc::new(store), Arc::new(agent))
            .with_turn_timeout(Duration::from_millis(50));

        let events = controller
            .start(StartRequest::new("x"))
            .await
            .unwrap()
            .collect()
            .await;

        assert!(events.iter().any(
            |e| matches!(e, AgentEvent::Error(data) if data.error_type == ErrorKind::Timeout)
        ));
        assert_eq!(events.last(), Some(&AgentEvent::done()));
    }
}
