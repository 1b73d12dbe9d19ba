//! In-memory sink that records every call

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChatError, ChatSink, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Post {
        channel: String,
        thread: Option<String>,
        text: String,
        id: MessageId,
    },
    Update {
        channel: String,
        id: MessageId,
        text: String,
    },
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<SinkCall>,
    next_id: usize,
    fail_updates: bool,
    fail_posts: usize,
}

/// Records posts and edits; cloning shares the record
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every edit fail, as with stale messages
    pub fn fail_updates(&self, fail: bool) {
        self.state.lock().fail_updates = fail;
    }

    /// Make the next `count` posts fail
    pub fn fail_next_posts(&self, count: usize) {
        self.state.lock().fail_posts = count;
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().calls.clone()
    }

    pub fn posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Post { text, .. } => Some(text),
                SinkCall::Update { .. } => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Update { text, .. } => Some(text),
                SinkCall::Post { .. } => None,
            })
            .collect()
    }

    /// Text most recently written anywhere
    pub fn last_text(&self) -> Option<String> {
        self.calls().last().map(|call| match call {
            SinkCall::Post { text, .. } | SinkCall::Update { text, .. } => text.clone(),
        })
    }
}

#[async_trait]
impl ChatSink for MemorySink {
    async fn post(
        &self,
        channel: &str,
        thread: Option<&str>,
        text: &str,
    ) -> Result<MessageId, ChatError> {
        let mut state = self.state.lock();
        if state.fail_posts > 0 {
            state.fail_posts -= 1;
            return Err(ChatError::Api("post rejected".to_string()));
        }
        state.next_id += 1;
        let id = format!("m{}", state.next_id);
        state.calls.push(SinkCall::Post {
            channel: channel.to_string(),
            thread: thread.map(str::to_string),
            text: text.to_string(),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn update(&self, channel: &str, message_id: &str, text: &str) -> Result<(), ChatError> {
        let mut state = self.state.lock();
        if state.fail_updates {
            return Err(ChatError::Api("message_not_found".to_string()));
        }
        state.calls.push(SinkCall::Update {
            channel: channel.to_string(),
            id: message_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
