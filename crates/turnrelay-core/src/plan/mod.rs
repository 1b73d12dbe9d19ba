//! Plan model
//!
//! A plan is the persisted unit of one planning conversation:
//! - Owns an append-only transcript of conversation entries
//! - Holds at most one pending question set
//! - Links to the agent session once the agent reports one

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::events::QuestionSet;

/// Plan lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Parse a stored status, falling back to draft
    pub fn parse(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

/// Who wrote a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Assistant,
}

impl EntryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A persisted plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub description: String,
    pub status: PlanStatus,
    pub session_id: Option<String>,
    pub pending_question: Option<QuestionSet>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One committed transcript message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub role: EntryRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Partial plan update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanUpdate {
    /// Only applied when the plan has no session yet
    pub session_id: Option<String>,
    pub status: Option<PlanStatus>,
}

impl PlanUpdate {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            status: None,
        }
    }

    pub fn status(status: PlanStatus) -> Self {
        Self {
            session_id: None,
            status: Some(status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.status.is_none()
    }
}

/// Derive a plan name from the prompt that started it
///
/// Prompts longer than the limit are cut at a character boundary and
/// suffixed with an ellipsis.
pub fn auto_name(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.chars().count() > constants::plan::NAME_MAX_CHARS {
        let cut: String = prompt
            .chars()
            .take(constants::plan::NAME_MAX_CHARS)
            .collect();
        format!("{}{}", cut, constants::plan::NAME_ELLIPSIS)
    } else {
        prompt.to_string()
    }
}
