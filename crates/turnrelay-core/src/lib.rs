//! turnrelay core - relays long-running agent turns to their consumers
//!
//! This crate provides:
//! - The agent event vocabulary and its SSE wire codec
//! - The plan controller that runs agent turns and persists their effects
//! - The chat aggregator that turns fragment bursts into a few message edits
//! - The question/answer gate that pauses and resumes a session
//! - SQLite plan storage, the HTTP API and a client for it

pub mod agent;
pub mod aggregator;
pub mod api;
pub mod chat;
pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod events;
pub mod gate;
pub mod plan;
pub mod storage;

// Re-exports for convenience
pub use agent::{AgentRequest, AgentRunner, ProcessAgent, ScriptedAgent};
pub use aggregator::{AggregatorHandle, AggregatorSettings, TurnAggregator, TurnSummary};
pub use chat::{ChatSink, HttpChatSink};
pub use client::RelayClient;
pub use config::RelayConfig;
pub use controller::{ContinueRequest, PlanController, StartRequest, TurnStream};
pub use events::{AgentEvent, ErrorKind, EventStream, RelayError, StreamOutcome};
pub use gate::{AnswerSheet, TurnGate, TurnPhase};
pub use storage::{ConversationStore, Database, SqliteStore};
