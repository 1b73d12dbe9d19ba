//! Event taxonomy and wire codec
//!
//! - `types` - the tagged event vocabulary
//! - `sse` - `data: <json>\n\n` framing, incremental decoding, terminal outcomes
//! - `error` - error kinds and HTTP failure classification

pub mod error;
pub mod sse;
pub mod types;

pub use error::{ErrorKind, RelayError};
pub use sse::{encode_frame, EventStream, SseDecoder, StreamOutcome};
pub use types::{
    AgentEvent, DoneData, ErrorData, GitSyncData, InitData, PlanCreatedData, Question,
    QuestionOption, QuestionSet, ResultData, TextData, ToolData,
};
