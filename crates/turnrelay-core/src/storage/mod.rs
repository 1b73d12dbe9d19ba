//! Persistence layer
//!
//! SQLite-based storage for:
//! - Plans with session linkage and a pending question
//! - Append-only conversation transcripts

mod database;
mod messages;
mod plans;
mod store;


pub use database::Database;
pub use messages::MessageStore;
pub use plans::PlanStore;
pub use store::{ConversationStore, SqliteStore};
