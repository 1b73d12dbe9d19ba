//! Question/answer gate
//!
//! Client-side turn state machine:
//!
//! ```text
//! Idle ──prompt──▶ Processing ──question──▶ WaitingForAnswer ──answer──▶ Processing
//!                     │                                                     │
//!                     ├──stream end──▶ Completed                            │
//!                     └──error──────▶ Failed ◀──────────────────────────────┘
//! ```
//!
//! Only the first `question` of a stream is honored, and it stays pending if
//! the stream then fails. Input is accepted only outside `Processing`.

mod answers;

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::controller::ContinueRequest;
use crate::events::{AgentEvent, QuestionSet, RelayError};

pub use answers::{AnswerSheet, Selection};

/// Where the current turn stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Idle,
    Processing,
    WaitingForAnswer,
    Completed,
    Failed,
}

impl TurnPhase {
    /// A new prompt may start from here
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::WaitingForAnswer => "waiting for answer",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        phase: TurnPhase,
        action: &'static str,
    },

    #[error("unanswered questions: {0:?}")]
    Incomplete(Vec<usize>),

    /// Answering is impossible without the agent session; not retried
    #[error("no session id is known for this conversation")]
    MissingSessionId,

    #[error("no question at index {0}")]
    UnknownQuestion(usize),

    #[error("question {0} does not take this kind of answer")]
    SelectionKind(usize),
}

impl GateError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingSessionId)
    }
}

/// What to do with an observed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Forward,
    Drop,
}

#[derive(Debug, Default)]
pub struct TurnGate {
    phase: TurnPhase,
    session_id: Option<String>,
    plan_id: Option<String>,
    pending: Option<QuestionSet>,
    /// A question was already honored in the current stream
    question_seen: bool,
    last_error: Option<RelayError>,
}

impl TurnGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.plan_id.as_deref()
    }

    pub fn pending_question(&self) -> Option<&QuestionSet> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&RelayError> {
        self.last_error.as_ref()
    }

    /// Whether the user may type (a prompt or an answer)
    pub fn accepts_input(&self) -> bool {
        self.phase != TurnPhase::Processing
    }

    /// Start a fresh turn from a resting state
    pub fn begin_prompt(&mut self) -> Result<(), GateError> {
        if !self.phase.is_resting() {
            return Err(GateError::InvalidTransition {
                phase: self.phase,
                action: "start a new prompt",
            });
        }
        self.pending = None;
        self.enter_processing();
        Ok(())
    }

    /// Submit answers to the pending question set
    ///
    /// Returns the continue request to send. A missing session id fails the
    /// turn outright.
    pub fn begin_answer(&mut self, sheet: &AnswerSheet) -> Result<ContinueRequest, GateError> {
        if self.phase != TurnPhase::WaitingForAnswer {
            return Err(GateError::InvalidTransition {
                phase: self.phase,
                action: "submit an answer",
            });
        }

        let answer = sheet.serialize()?;

        let Some(session_id) = self.session_id.clone() else {
            warn!("Answer submitted without a known session id");
            self.phase = TurnPhase::Failed;
            return Err(GateError::MissingSessionId);
        };

        self.pending = None;
        self.enter_processing();

        Ok(ContinueRequest {
            answer: Some(answer),
            session_id: Some(session_id),
            plan_id: self.plan_id.clone(),
            ..Default::default()
        })
    }

    /// Feed one event of the current stream
    pub fn observe(&mut self, event: &AgentEvent) -> GateDecision {
        if let Some(session_id) = event.session_id() {
            if self.session_id.is_none() {
                self.session_id = Some(session_id.to_string());
            }
        }

        match event {
            AgentEvent::PlanCreated(created) => {
                self.plan_id = Some(created.plan_id.clone());
            }
            AgentEvent::Result(result) => {
                if let Some(plan_id) = &result.plan_id {
                    self.plan_id = Some(plan_id.clone());
                }
            }
            AgentEvent::Question(set) => {
                if self.phase != TurnPhase::Processing || self.question_seen {
                    debug!(tool_use_id = %set.tool_use_id, "Dropping extra question");
                    return GateDecision::Drop;
                }
                self.question_seen = true;
                self.pending = Some(set.clone());
                self.phase = TurnPhase::WaitingForAnswer;
            }
            AgentEvent::Error(data) => {
                self.last_error = Some(RelayError::from(data));
                // A question already honored stays answerable
                if self.phase == TurnPhase::WaitingForAnswer {
                    warn!("Error after question, keeping it pending: {}", data.message);
                } else {
                    self.phase = TurnPhase::Failed;
                }
            }
            _ => {}
        }
        GateDecision::Forward
    }

    /// The stream closed; settle the phase
    pub fn end_stream(&mut self) -> TurnPhase {
        if self.phase == TurnPhase::Processing {
            self.phase = TurnPhase::Completed;
            self.pending = None;
        }
        self.phase
    }

    /// The stream failed at the transport level
    ///
    /// A pending question survives the failure.
    pub fn fail(&mut self, error: RelayError) {
        self.last_error = Some(error);
        if self.phase != TurnPhase::WaitingForAnswer {
            self.phase = TurnPhase::Failed;
        }
    }

    /// Rebuild the waiting state from a persisted pending question
    pub fn restore(
        &mut self,
        pending: QuestionSet,
        session_id: Option<String>,
        plan_id: Option<String>,
    ) -> Result<(), GateError> {
        if !self.phase.is_resting() {
            return Err(GateError::InvalidTransition {
                phase: self.phase,
                action: "restore a pending question",
            });
        }
        self.pending = Some(pending);
        self.session_id = session_id;
        self.plan_id = plan_id;
        self.question_seen = true;
        self.phase = TurnPhase::WaitingForAnswer;
        Ok(())
    }

    fn enter_processing(&mut self) {
        self.phase = TurnPhase::Processing;
        self.question_seen = false;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        ErrorKind, InitData, PlanCreatedData, Question, QuestionOption, ResultData,
    };

    fn question_set(id: &str, labels: &[&str], multi: bool) -> QuestionSet {
        QuestionSet {
            tool_use_id: id.to_string(),
            questions: vec![Question {
                text: "Pick".into(),
                header: None,
                options: labels
                    .iter()
                    .map(|l| QuestionOption {
                        label: l.to_string(),
                        description: None,
                    })
                    .collect(),
                multi_select: multi,
            }],
        }
    }

    fn init(session: &str) -> AgentEvent {
        AgentEvent::Init(InitData {
            session_id: session.into(),
            model: None,
            cwd: None,
        })
    }

    #[test]
    fn test_prompt_then_stream_end_completes() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        assert!(!gate.accepts_input());

        gate.observe(&init("s1"));
        gate.observe(&AgentEvent::text("hi"));
        gate.observe(&AgentEvent::done());
        assert_eq!(gate.end_stream(), TurnPhase::Completed);
        assert!(gate.accepts_input());
        assert_eq!(gate.session_id(), Some("s1"));
    }

    #[test]
    fn test_only_first_question_is_honored() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();

        let first = AgentEvent::Question(question_set("q1", &["A"], false));
        let second = AgentEvent::Question(question_set("q2", &["B"], false));
        assert_eq!(gate.observe(&first), GateDecision::Forward);
        assert_eq!(gate.observe(&second), GateDecision::Drop);

        assert_eq!(gate.end_stream(), TurnPhase::WaitingForAnswer);
        assert_eq!(gate.pending_question().unwrap().tool_use_id, "q1");
    }

    #[test]
    fn test_error_after_question_keeps_it_answerable() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        gate.observe(&init("s1"));
        gate.observe(&AgentEvent::Question(question_set("q1", &["A", "B"], false)));
        gate.observe(&AgentEvent::error(ErrorKind::Process, None, "agent crashed"));
        gate.fail(RelayError::unknown("connection reset"));

        assert_eq!(gate.end_stream(), TurnPhase::WaitingForAnswer);
        assert_eq!(gate.last_error().unwrap().message, "connection reset");

        let mut sheet = AnswerSheet::new(gate.pending_question().unwrap());
        sheet.select(0, "B").unwrap();
        let request = gate.begin_answer(&sheet).unwrap();
        assert_eq!(request.answer.as_deref(), Some("B"));
        assert_eq!(gate.phase(), TurnPhase::Processing);
        assert!(gate.last_error().is_none());
    }

    #[test]
    fn test_answer_round_trip() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        gate.observe(&AgentEvent::PlanCreated(PlanCreatedData {
            plan_id: "p1".into(),
            name: "x".into(),
        }));
        gate.observe(&init("s1"));
        let set = question_set("q1", &["A", "B", "C"], true);
        gate.observe(&AgentEvent::Question(set.clone()));
        gate.end_stream();

        let mut sheet = AnswerSheet::new(&set);
        sheet.toggle(0, "C").unwrap();
        sheet.toggle(0, "A").unwrap();

        let request = gate.begin_answer(&sheet).unwrap();
        assert_eq!(request.answer.as_deref(), Some("A, C"));
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.plan_id.as_deref(), Some("p1"));
        assert_eq!(gate.phase(), TurnPhase::Processing);
        assert!(gate.pending_question().is_none());

        // A fresh stream may raise a new question
        let next = AgentEvent::Question(question_set("q2", &["D"], false));
        assert_eq!(gate.observe(&next), GateDecision::Forward);
    }

    #[test]
    fn test_incomplete_answer_is_rejected() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        gate.observe(&init("s1"));
        let set = question_set("q1", &["A"], true);
        gate.observe(&AgentEvent::Question(set.clone()));
        gate.end_stream();

        let sheet = AnswerSheet::new(&set);
        assert!(matches!(gate.begin_answer(&sheet), Err(GateError::Incomplete(_))));
        assert_eq!(gate.phase(), TurnPhase::WaitingForAnswer);
    }

    #[test]
    fn test_missing_session_is_fatal() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        let set = question_set("q1", &[], false);
        gate.observe(&AgentEvent::Question(set.clone()));

        let mut sheet = AnswerSheet::new(&set);
        sheet.set_text(0, "yes").unwrap();
        let err = gate.begin_answer(&sheet).unwrap_err();
        assert_eq!(err, GateError::MissingSessionId);
        assert!(err.is_fatal());
        assert_eq!(gate.phase(), TurnPhase::Failed);
    }

    #[test]
    fn test_answer_while_processing_is_invalid() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        let sheet = AnswerSheet::new(&question_set("q1", &[], false));
        assert!(matches!(
            gate.begin_answer(&sheet),
            Err(GateError::InvalidTransition { phase: TurnPhase::Processing, .. })
        ));
        assert!(gate.begin_prompt().is_err());
    }

    #[test]
    fn test_error_moves_to_failed_resting_state() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        gate.observe(&AgentEvent::error(ErrorKind::Process, None, "crashed"));
        gate.observe(&AgentEvent::done());
        assert_eq!(gate.end_stream(), TurnPhase::Failed);
        assert_eq!(gate.last_error().unwrap().kind, ErrorKind::Process);

        gate.begin_prompt().unwrap();
        assert!(gate.last_error().is_none());
    }

    #[test]
    fn test_session_learned_from_result() {
        let mut gate = TurnGate::new();
        gate.begin_prompt().unwrap();
        gate.observe(&AgentEvent::Result(ResultData {
            content: "done".into(),
            plan_id: Some("p9".into()),
            session_id: Some("s9".into()),
            duration_ms: None,
            cost_usd: None,
        }));
        assert_eq!(gate.session_id(), Some("s9"));
        assert_eq!(gate.plan_id(), Some("p9"));
    }

    #[test]
    fn test_restore_rebuilds_waiting_state() {
        let mut gate = TurnGate::new();
        let set = question_set("q1", &["A"], false);
        gate.restore(set.clone(), Some("s1".into()), Some("p1".into()))
            .unwrap();
        assert_eq!(gate.phase(), TurnPhase::WaitingForAnswer);

        let mut sheet = AnswerSheet::new(&set);
        sheet.select(0, "A").unwrap();
        let request = gate.begin_answer(&sheet).unwrap();
        assert_eq!(request.answer.as_deref(), Some("A"));
    }
}
