//! Conversation transcript storage
//!
//! Entries are append-only and ordered by insertion.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use super::database::Database;
use super::plans::parse_timestamp;
use crate::plan::{ConversationEntry, EntryRole};

/// Transcript persistence store
pub struct MessageStore<'a> {
    db: &'a Database,
}

impl<'a> MessageStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append an entry to a plan's transcript
    pub fn append(&self, plan_id: &str, role: EntryRole, content: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.db
            .conn()
            .execute(
                "INSERT INTO conversation_entries (plan_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![plan_id, role.as_str(), content, now],
            )
            .with_context(|| format!("Failed to append entry to plan {}", plan_id))?;

        // Update plan timestamp
        self.db.conn().execute(
            "UPDATE plans SET updated_at = ?1 WHERE id = ?2",
            params![now, plan_id],
        )?;

        Ok(())
    }

    /// Record a user answer and clear the pending question in one transaction
    pub fn record_answer(&self, plan_id: &str, answer: &str) -> Result<()> {
        let conn = self.db.conn();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        let affected = tx.execute(
            "UPDATE plans SET pending_question = NULL, updated_at = ?1 WHERE id = ?2",
            params![now, plan_id],
        )?;
        if affected == 0 {
            anyhow::bail!("Plan not found: {}", plan_id);
        }

        tx.execute(
            "INSERT INTO conversation_entries (plan_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![plan_id, EntryRole::User.as_str(), answer, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Load a plan's transcript in creation order
    pub fn load(&self, plan_id: &str) -> Result<Vec<ConversationEntry>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT role, content, created_at FROM conversation_entries
             WHERE plan_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map([plan_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (role, content, created_at) = row?;
            let Some(role) = EntryRole::parse(&role) else {
                tracing::warn!("Skipping transcript entry with role {:?}", role);
                continue;
            };
            entries.push(ConversationEntry {
                role,
                content,
                created_at: parse_timestamp(&created_at),
            });
        }
        Ok(entries)
    }

    pub fn count(&self, plan_id: &str) -> Result<usize> {
        let count: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM conversation_entries WHERE plan_id = ?1",
            [plan_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
