//! Relay error taxonomy
//!
//! Every failure a consumer can observe is classified into one [`ErrorKind`],
//! whether it came from an HTTP status, an embedded `error` frame or the
//! agent itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{AgentEvent, ErrorData};

/// Error code for a backend that is still initializing
pub const SESSION_NOT_READY: &str = "SESSION_NOT_READY";
pub const MISSING_PROMPT: &str = "MISSING_PROMPT";
pub const MISSING_ANSWER: &str = "MISSING_ANSWER";
pub const MISSING_SESSION_ID: &str = "MISSING_SESSION_ID";
pub const PLAN_NOT_FOUND: &str = "PLAN_NOT_FOUND";
/// The plan is linked to a different agent session than the request names
pub const SESSION_MISMATCH: &str = "SESSION_MISMATCH";
pub const INVALID_BODY: &str = "INVALID_BODY";

/// Classified error kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input, the user must resubmit
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "auth_error")]
    Auth,
    /// Session missing or not ready, often recoverable via resume
    #[serde(rename = "session_error")]
    Session,
    /// Agent process crashed
    #[serde(rename = "process_error")]
    Process,
    #[serde(rename = "timeout_error")]
    Timeout,
    #[default]
    #[serde(rename = "unknown_error")]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Auth => "auth_error",
            Self::Session => "session_error",
            Self::Process => "process_error",
            Self::Timeout => "timeout_error",
            Self::Unknown => "unknown_error",
        }
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            401 | 403 => Self::Auth,
            404 | 409 | 410 | 503 => Self::Session,
            408 | 504 => Self::Timeout,
            500 | 502 => Self::Process,
            _ => Self::Unknown,
        }
    }

    /// HTTP status used when this kind is returned by the server
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Auth => 401,
            Self::Session => 404,
            Self::Process => 500,
            Self::Timeout => 504,
            Self::Unknown => 500,
        }
    }

    /// Whether retrying or resuming may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Session | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified relay failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct RelayError {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub message: String,
    /// HTTP status, when the error came from a response
    pub status: Option<u16>,
}

impl RelayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message).with_code(code)
    }

    pub fn session(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Session, message).with_code(code)
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Process, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Backend is still initializing; callers retry once after a short delay
    pub fn is_not_ready(&self) -> bool {
        self.code.as_deref() == Some(SESSION_NOT_READY) || self.status == Some(503)
    }

    /// Classify a failed HTTP response
    ///
    /// An `error` event embedded in the body wins over the status code.
    pub fn from_response(status: u16, body: &str) -> Self {
        match find_error_payload(status, body) {
            Some(data) => Self::from(data).with_status(status),
            None => {
                let message = if body.trim().is_empty() {
                    format!("request failed with status {}", status)
                } else {
                    body.trim().to_string()
                };
                Self::new(ErrorKind::from_status(status), message).with_status(status)
            }
        }
    }

    /// The `error` event carrying this failure
    pub fn to_event(&self) -> AgentEvent {
        AgentEvent::Error(ErrorData {
            error_type: self.kind,
            code: self.code.clone(),
            message: self.message.clone(),
        })
    }
}

impl From<ErrorData> for RelayError {
    fn from(data: ErrorData) -> Self {
        Self {
            kind: data.error_type,
            code: data.code,
            message: data.message,
            status: None,
        }
    }
}

impl From<&ErrorData> for RelayError {
    fn from(data: &ErrorData) -> Self {
        Self::from(data.clone())
    }
}

/// Look for an `error` payload in a response body
///
/// Accepts an SSE body (`data: {...}` frames), a bare event object, or a
/// `{"error": ...}` envelope. A plain string envelope is classified by status.
fn find_error_payload(status: u16, body: &str) -> Option<ErrorData> {
    let from_frames = body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| AgentEvent::from_json(data.trim()).ok())
        .find_map(|event| match event {
            AgentEvent::Error(data) => Some(data),
            _ => None,
        });
    if from_frames.is_some() {
        return from_frames;
    }

    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    if let Ok(AgentEvent::Error(data)) = AgentEvent::from_value(value.clone()) {
        return Some(data);
    }
    match value.get("error")? {
        serde_json::Value::String(message) => Some(ErrorData {
            error_type: ErrorKind::from_status(status),
            code: None,
            message: message.clone(),
        }),
        other => serde_json::from_value(other.clone()).ok(),
    }
}
