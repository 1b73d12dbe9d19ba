//! Streaming aggregator
//!
//! Turns an irregular stream of text fragments into a few mutations of one
//! chat message: posted on the first flush, edited in place afterwards, and
//! re-posted if an edit fails.
//!
//! Flush triggers:
//! - a fragment ending in a newline
//! - every `fragment_threshold` fragments otherwise
//! - questions, results and errors

mod projection;
mod worker;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chat::{ChatSink, MessageId};
use crate::config::RelayConfig;
use crate::constants;
use crate::events::{AgentEvent, ErrorData, Question, QuestionSet, ResultData};

pub use projection::{completion_notice, link_markup, plan_url, ProjectionLimits};
pub use worker::AggregatorHandle;

/// Tunables for one turn's aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    pub fragment_threshold: usize,
    pub limits: ProjectionLimits,
    /// Base URL for plan links
    pub link_base_url: String,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            fragment_threshold: constants::aggregator::FLUSH_FRAGMENT_THRESHOLD,
            limits: ProjectionLimits {
                cap: constants::aggregator::DISPLAY_CAP,
                newline_retain_ratio: constants::aggregator::NEWLINE_RETAIN_RATIO,
            },
            link_base_url: constants::http::DEFAULT_PUBLIC_URL.to_string(),
        }
    }
}

impl AggregatorSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            fragment_threshold: config.aggregator.flush_fragment_threshold.max(1),
            limits: ProjectionLimits {
                cap: config.aggregator.display_cap,
                newline_retain_ratio: config.aggregator.newline_retain_ratio,
            },
            link_base_url: config.link_base_url().to_string(),
        }
    }
}

/// Counters reported when a turn's relay finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnSummary {
    /// Streamed messages posted (including edit fallbacks)
    pub messages_created: usize,
    pub edits: usize,
    /// Edits that failed and were replaced by a new post
    pub edit_fallbacks: usize,
    /// Question, error and completion notices
    pub notices: usize,
    /// Characters accumulated over the turn
    pub chars: usize,
}

/// Per-turn aggregation state
pub struct TurnAggregator {
    sink: Arc<dyn ChatSink>,
    channel: String,
    thread: Option<String>,
    settings: AggregatorSettings,
    accumulated: String,
    pending_fragments: usize,
    active_message: Option<MessageId>,
    /// Last text written to the active message
    rendered: Option<String>,
    plan_id: Option<String>,
    finished: bool,
    summary: TurnSummary,
}

impl TurnAggregator {
    pub fn new(
        sink: Arc<dyn ChatSink>,
        channel: impl Into<String>,
        thread: Option<String>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            sink,
            channel: channel.into(),
            thread,
            settings,
            accumulated: String::new(),
            pending_fragments: 0,
            active_message: None,
            rendered: None,
            plan_id: None,
            finished: false,
            summary: TurnSummary::default(),
        }
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn pending_fragments(&self) -> usize {
        self.pending_fragments
    }

    pub fn active_message(&self) -> Option<&str> {
        self.active_message.as_deref()
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.plan_id.as_deref()
    }

    /// Dispatch one stream event
    pub async fn handle(&mut self, event: &AgentEvent) {
        if self.finished {
            debug!("Ignoring {} event after done", event.kind());
            return;
        }
        match event {
            AgentEvent::Text(text) => self.on_text(&text.content).await,
            AgentEvent::Question(set) => self.on_question(set).await,
            AgentEvent::Result(result) => self.on_result(result).await,
            AgentEvent::Error(error) => self.on_error(error).await,
            AgentEvent::Done(_) => self.on_done().await,
            AgentEvent::PlanCreated(created) => self.record_plan(&created.plan_id),
            AgentEvent::Init(_) | AgentEvent::Tool(_) | AgentEvent::GitSync(_) => {}
        }
    }

    pub async fn on_text(&mut self, fragment: &str) {
        self.accumulated.push_str(fragment);
        self.pending_fragments += 1;

        if fragment.ends_with('\n') || self.pending_fragments >= self.settings.fragment_threshold {
            self.flush().await;
        }
    }

    /// Push the current display projection to the chat
    ///
    /// The fragment counter resets after every attempt.
    pub async fn flush(&mut self) {
        if self.accumulated.is_empty() {
            return;
        }

        let text = self.settings.limits.display(&self.accumulated);
        self.write(text).await;
        self.pending_fragments = 0;
    }

    pub async fn on_question(&mut self, set: &QuestionSet) {
        self.flush().await;
        for question in &set.questions {
            self.notify(&format_question(question)).await;
        }
    }

    pub async fn on_result(&mut self, result: &ResultData) {
        if let Some(plan_id) = &result.plan_id {
            self.record_plan(plan_id);
        }
        self.accumulated.push_str(&result.content);
        self.flush().await;
    }

    pub async fn on_error(&mut self, error: &ErrorData) {
        self.flush().await;
        self.notify(&format!(":warning: {}", error.message)).await;
    }

    /// Write the final rendering with a link to the full output
    pub async fn on_done(&mut self) {
        self.finished = true;
        let url = self
            .plan_id
            .as_deref()
            .map(|id| plan_url(&self.settings.link_base_url, id));

        if !self.accumulated.is_empty() {
            let text = self
                .settings
                .limits
                .final_text(&self.accumulated, url.as_deref());
            self.write(text).await;
        } else if let Some(url) = url {
            self.notify(&completion_notice(&url)).await;
        }
        self.pending_fragments = 0;
    }

    pub fn summary(&self) -> TurnSummary {
        TurnSummary {
            chars: self.accumulated.chars().count(),
            ..self.summary
        }
    }

    fn record_plan(&mut self, plan_id: &str) {
        if self.plan_id.as_deref() != Some(plan_id) {
            debug!(plan_id = %plan_id, "Aggregator linked to plan");
            self.plan_id = Some(plan_id.to_string());
        }
    }

    /// Edit the active message in place, posting a new one if there is none
    /// or the edit fails
    async fn write(&mut self, text: String) {
        if self.rendered.as_deref() == Some(text.as_str()) {
            return;
        }

        if let Some(message_id) = self.active_message.clone() {
            match self.sink.update(&self.channel, &message_id, &text).await {
                Ok(()) => {
                    self.summary.edits += 1;
                    self.rendered = Some(text);
                    return;
                }
                Err(e) => {
                    warn!(message_id = %message_id, "Chat edit failed, posting new message: {}", e);
                    self.summary.edit_fallbacks += 1;
                }
            }
        }

        match self
            .sink
            .post(&self.channel, self.thread.as_deref(), &text)
            .await
        {
            Ok(message_id) => {
                info!(message_id = %message_id, "Posted turn message");
                self.summary.messages_created += 1;
                self.active_message = Some(message_id);
                self.rendered = Some(text);
            }
            Err(e) => {
                warn!("Failed to post turn message: {}", e);
            }
        }
    }

    /// Post a standalone notice in the thread
    async fn notify(&mut self, text: &str) {
        match self
            .sink
            .post(&self.channel, self.thread.as_deref(), text)
            .await
        {
            Ok(_) => self.summary.notices += 1,
            Err(e) => warn!("Failed to post notice: {}", e),
        }
    }
}

/// Chat rendering of one question with its options
fn format_question(question: &Question) -> String {
    let mut text = match &question.header {
        Some(header) => format!(":question: *{}*\n{}", header, question.text),
        None => format!(":question: {}", question.text),
    };
    for option in &question.options {
        text.push_str("\n• ");
        text.push_str(&option.label);
        if let Some(description) = &option.description {
            text.push_str(" - ");
            text.push_str(description);
        }
    }
    if question.multi_select {
        text.push_str("\n_(select all that apply)_");
    }
    text
}
