//! SSE (Server-Sent Events) codec
//!
//! Each event travels as one frame: `data: <json>\n\n`. The decoder handles
//! partial lines across chunks, skips comments and drops malformed frames.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::error::RelayError;
use super::types::AgentEvent;

/// Encode one event as a wire frame
pub fn encode_frame(event: &AgentEvent) -> serde_json::Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Accumulated partial line from previous chunks
    partial_line: String,
    /// Frames decoded so far
    frames: usize,
    /// Frames dropped because they did not parse
    dropped: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete event it finishes
    pub fn push(&mut self, bytes: &[u8]) -> Vec<AgentEvent> {
        let text = String::from_utf8_lossy(bytes);

        let combined = if self.partial_line.is_empty() {
            text.into_owned()
        } else {
            let mut combined = std::mem::take(&mut self.partial_line);
            combined.push_str(&text);
            combined
        };

        let has_trailing_newline = combined.ends_with('\n');
        let mut events = Vec::new();
        let mut lines_iter = combined.lines().peekable();

        while let Some(line) = lines_iter.next() {
            // Last line without a trailing newline is partial
            if lines_iter.peek().is_none() && !has_trailing_newline {
                self.partial_line = line.to_string();
                break;
            }
            if let Some(event) = self.decode_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Flush a trailing line left when the transport closed
    pub fn finish(&mut self) -> Option<AgentEvent> {
        let line = std::mem::take(&mut self.partial_line);
        self.decode_line(&line)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn decode_line(&mut self, line: &str) -> Option<AgentEvent> {
        let line = line.trim_end_matches('\r');

        // Skip blank separators and comments (keep-alives)
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim_start();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }

        match AgentEvent::from_json(data) {
            Ok(event) => {
                self.frames += 1;
                Some(event)
            }
            Err(e) => {
                self.dropped += 1;
                warn!("Dropping malformed SSE frame ({}): {}", e, data);
                None
            }
        }
    }
}

/// How a stream ended
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// Transport closed without an `error` event
    Completed,
    /// An `error` event or transport failure ended the operation
    Failed(RelayError),
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn into_result(self) -> Result<(), RelayError> {
        match self {
            Self::Completed => Ok(()),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Lazily decoded, single-use event sequence over a byte stream
///
/// Incremental consumers call [`EventStream::next_event`]; consumers that only
/// care about completion call [`EventStream::collect`]. An `error` event is
/// yielded once as an event and reported once as [`StreamOutcome::Failed`].
pub struct EventStream {
    body: BoxStream<'static, Result<Bytes, RelayError>>,
    decoder: SseDecoder,
    queued: VecDeque<AgentEvent>,
    terminal: Option<RelayError>,
    closed: bool,
    started: Instant,
    bytes_received: usize,
}

impl EventStream {
    pub fn new<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, RelayError>> + Send + 'static,
    {
        Self {
            body: body.boxed(),
            decoder: SseDecoder::new(),
            queued: VecDeque::new(),
            terminal: None,
            closed: false,
            started: Instant::now(),
            bytes_received: 0,
        }
    }

    /// Next decoded event, or `None` once the transport has closed
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                if let AgentEvent::Error(data) = &event {
                    if self.terminal.is_none() {
                        self.terminal = Some(RelayError::from(data));
                    }
                }
                return Some(event);
            }

            if self.closed {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.bytes_received += chunk.len();
                    self.queued.extend(self.decoder.push(&chunk));
                }
                Some(Err(err)) => {
                    warn!("Event stream transport failed: {}", err);
                    self.closed = true;
                    self.queued.extend(self.decoder.finish());
                    if self.terminal.is_none() {
                        self.terminal = Some(err);
                    }
                }
                None => {
                    self.closed = true;
                    self.queued.extend(self.decoder.finish());
                    info!(
                        "Event stream closed after {:?}: {} frames, {} dropped, {} bytes",
                        self.started.elapsed(),
                        self.decoder.frames(),
                        self.decoder.dropped(),
                        self.bytes_received
                    );
                }
            }
        }
    }

    /// Terminal outcome so far
    ///
    /// Meaningful once [`EventStream::next_event`] has returned `None`.
    pub fn outcome(&self) -> StreamOutcome {
        match &self.terminal {
            Some(err) => StreamOutcome::Failed(err.clone()),
            None => StreamOutcome::Completed,
        }
    }

    /// Drain the stream, returning every event and the terminal outcome
    pub async fn collect(mut self) -> (Vec<AgentEvent>, StreamOutcome) {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        debug!("Collected {} events", events.len());
        let outcome = self.outcome();
        (events, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::error::ErrorKind;

    fn chunks(parts: &[&str]) -> EventStream {
        let items: Vec<Result<Bytes, RelayError>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        EventStream::new(futures::stream::iter(items))
    }

    #[test]
    fn test_encode_frame_shape() {
        let frame = encode_frame(&AgentEvent::text("Hi")).unwrap();
        assert_eq!(frame, "data: {\"type\":\"text\",\"data\":{\"content\":\"Hi\"}}\n\n");
    }

    #[test]
    fn test_decoder_joins_split_lines() {
        let frame = encode_frame(&AgentEvent::text("hello world")).unwrap();
        let (a, b) = frame.split_at(17);

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(a.as_bytes()).is_empty());
        assert_eq!(decoder.push(b.as_bytes()), vec![AgentEvent::text("hello world")]);
        assert_eq!(decoder.frames(), 1);
    }

    #[test]
    fn test_decoder_skips_comments_and_done_marker() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\n\ndata: [DONE]\n\nevent: ping\n\n");
        assert!(events.is_empty());
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn test_decoder_drops_malformed_frames() {
        let mut decoder = SseDecoder::new();
        let input = format!(
            "data: {{not json}}\n\n{}",
            encode_frame(&AgentEvent::done()).unwrap()
        );
        let events = decoder.push(input.as_bytes());
        assert_eq!(events, vec![AgentEvent::done()]);
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_decoder_accepts_data_without_space_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data:{\"type\":\"done\"}\r\n\r\n");
        assert_eq!(events, vec![AgentEvent::done()]);
    }

    #[test]
    fn test_finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\",\"data\":{}}").is_empty());
        assert_eq!(decoder.finish(), Some(AgentEvent::done()));
    }

    #[tokio::test]
    async fn test_stream_completes_without_error() {
        let text = encode_frame(&AgentEvent::text("a")).unwrap();
        let done = encode_frame(&AgentEvent::done()).unwrap();
        let (events, outcome) = chunks(&[&text, &done]).collect().await;
        assert_eq!(events, vec![AgentEvent::text("a"), AgentEvent::done()]);
        assert_eq!(outcome, StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn test_error_is_reported_once_per_channel() {
        let text = encode_frame(&AgentEvent::text("partial")).unwrap();
        let error = encode_frame(&AgentEvent::error(ErrorKind::Process, None, "agent crashed")).unwrap();
        let done = encode_frame(&AgentEvent::done()).unwrap();

        let mut stream = chunks(&[&text, &error, &done]);
        let mut seen = Vec::new();
        while let Some(event) = stream.next_event().await {
            seen.push(event);
        }

        let errors = seen.iter().filter(|e| matches!(e, AgentEvent::Error(_))).count();
        assert_eq!(errors, 1);
        assert_eq!(seen.len(), 3);
        match stream.outcome() {
            StreamOutcome::Failed(err) => {
                assert_eq!(err.kind, ErrorKind::Process);
                assert_eq!(err.message, "agent crashed");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_delivered_events() {
        let text = encode_frame(&AgentEvent::text("kept")).unwrap();
        let items: Vec<Result<Bytes, RelayError>> = vec![
            Ok(Bytes::from(text)),
            Err(RelayError::timeout("connection reset")),
        ];
        let (events, outcome) = EventStream::new(futures::stream::iter(items)).collect().await;
        assert_eq!(events, vec![AgentEvent::text("kept")]);
        assert!(matches!(outcome, StreamOutcome::Failed(ref e) if e.kind == ErrorKind::Timeout));
    }
}
