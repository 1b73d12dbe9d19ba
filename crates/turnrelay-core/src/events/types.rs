//! Event vocabulary shared by the agent, the controller and every consumer
//!
//! On the wire each event is `{"type": "...", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ErrorKind;

/// One event emitted during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Agent session is up
    Init(InitData),
    /// Assistant text fragment
    Text(TextData),
    /// Tool invocation by the agent
    Tool(ToolData),
    /// Agent needs answers before it can continue
    Question(QuestionSet),
    /// Final result of the turn
    Result(ResultData),
    /// Agent-level or relay-level failure
    Error(ErrorData),
    /// Stream is complete
    Done(DoneData),
    /// Repository was synchronized
    GitSync(GitSyncData),
    /// A plan was created for this turn
    PlanCreated(PlanCreatedData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitData {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// A set of questions raised by one tool use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSet {
    pub tool_use_id: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "question", alias = "text")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub multi_select: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Question {
    /// Label used when presenting or serializing an answer
    pub fn title(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.text)
    }

    /// Position of an option label, if it is one of the offered options
    pub fn option_index(&self, label: &str) -> Option<usize> {
        self.options.iter().position(|o| o.label == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    #[serde(default)]
    pub error_type: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitSyncData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default)]
    pub pushed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCreatedData {
    pub plan_id: String,
    pub name: String,
}

impl AgentEvent {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(TextData {
            content: content.into(),
        })
    }

    pub fn done() -> Self {
        Self::Done(DoneData::default())
    }

    pub fn error(kind: ErrorKind, code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Error(ErrorData {
            error_type: kind,
            code: code.map(str::to_string),
            message: message.into(),
        })
    }

    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Text(_) => "text",
            Self::Tool(_) => "tool",
            Self::Question(_) => "question",
            Self::Result(_) => "result",
            Self::Error(_) => "error",
            Self::Done(_) => "done",
            Self::GitSync(_) => "git_sync",
            Self::PlanCreated(_) => "plan_created",
        }
    }

    /// Session id carried by this event, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Init(init) => Some(&init.session_id),
            Self::Result(result) => result.session_id.as_deref(),
            Self::Done(done) => done.session_id.as_deref(),
            _ => None,
        }
    }

    /// Parse an event from JSON, tolerating a missing `data` field
    ///
    /// Agents commonly write `{"type":"done"}` without a payload.
    pub fn from_value(mut value: Value) -> serde_json::Result<Self> {
        if let Value::Object(map) = &mut value {
            map.entry("data")
                .or_insert_with(|| Value::Object(Default::default()));
        }
        serde_json::from_value(value)
    }

    /// Parse an event from a JSON string
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_event_wire_shape() {
        let value = serde_json::to_value(AgentEvent::text("Hi")).unwrap();
        assert_eq!(value, json!({"type": "text", "data": {"content": "Hi"}}));
    }

    #[test]
    fn test_done_serializes_empty_payload() {
        let value = serde_json::to_value(AgentEvent::done()).unwrap();
        assert_eq!(value, json!({"type": "done", "data": {}}));
    }

    #[test]
    fn test_snake_case_variant_names() {
        let event = AgentEvent::PlanCreated(PlanCreatedData {
            plan_id: "p1".into(),
            name: "Hello".into(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "plan_created");
        assert_eq!(value["data"]["planId"], "p1");

        let sync = AgentEvent::from_json(r#"{"type":"git_sync","data":{"pushed":true}}"#).unwrap();
        assert_eq!(sync.kind(), "git_sync");
    }

    #[test]
    fn test_question_parses_camel_case() {
        let event = AgentEvent::from_json(
            r#"{"type":"question","data":{"toolUseId":"tu_1","questions":[
                {"question":"Which db?","header":"Storage","options":[{"label":"A"},{"label":"B"}],"multiSelect":true},
                {"question":"Name?"}
            ]}}"#,
        )
        .unwrap();

        let AgentEvent::Question(set) = event else {
            panic!("expected question");
        };
        assert_eq!(set.tool_use_id, "tu_1");
        assert_eq!(set.questions.len(), 2);
        assert!(set.questions[0].multi_select);
        assert_eq!(set.questions[0].title(), "Storage");
        assert_eq!(set.questions[0].option_index("B"), Some(1));
        assert!(!set.questions[1].multi_select);
        assert_eq!(set.questions[1].title(), "Name?");
    }

    #[test]
    fn test_missing_data_is_tolerated() {
        assert_eq!(AgentEvent::from_json(r#"{"type":"done"}"#).unwrap(), AgentEvent::done());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(AgentEvent::from_json(r#"{"type":"telemetry","data":{}}"#).is_err());
    }

    #[test]
    fn test_error_event_kind_names() {
        let event = AgentEvent::error(ErrorKind::Validation, Some("MISSING_PROMPT"), "prompt is required");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["errorType"], "validation_error");
        assert_eq!(value["data"]["code"], "MISSING_PROMPT");
    }

    #[test]
    fn test_session_id_accessor() {
        let init = AgentEvent::Init(InitData {
            session_id: "s1".into(),
            model: None,
            cwd: None,
        });
        assert_eq!(init.session_id(), Some("s1"));
        assert_eq!(AgentEvent::text("x").session_id(), None);
    }
}
