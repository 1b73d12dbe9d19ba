//! Chat sink
//!
//! A chat surface where a message can be posted once and then edited in
//! place. Edits may fail on stale or foreign messages; callers fall back to
//! posting.

mod memory;
mod slack;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::{MemorySink, SinkCall};
pub use slack::HttpChatSink;

/// Identifier of a posted chat message
pub type MessageId = String;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered but rejected the call
    #[error("chat API error: {0}")]
    Api(String),

    #[error("chat token is not configured")]
    MissingToken,
}

#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Post a new message, optionally in a thread
    async fn post(
        &self,
        channel: &str,
        thread: Option<&str>,
        text: &str,
    ) -> Result<MessageId, ChatError>;

    /// Replace the text of a message
    async fn update(&self, channel: &str, message_id: &str, text: &str) -> Result<(), ChatError>;
}
