//! Agent runner
//!
//! One agent process runs per turn. The runner turns its output into a
//! channel of [`AgentEvent`]s that closes when the agent is finished.

mod process;
mod scripted;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{AgentEvent, RelayError};

pub use process::ProcessAgent;
pub use scripted::ScriptedAgent;

/// Input for one agent turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRequest {
    pub prompt: String,
    /// Agent session to resume; `None` starts a fresh session
    pub resume_session_id: Option<String>,
    /// Working directory for the agent
    pub project_path: Option<PathBuf>,
    pub image_paths: Vec<PathBuf>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(session_id.into());
        self
    }
}

/// Starts agent turns
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Start a turn
    ///
    /// Events arrive on the returned receiver in emission order. The channel
    /// closes when the agent exits. Cancelling `cancel` stops the agent.
    async fn spawn(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<AgentEvent>, RelayError>;
}
