//! Async conversation store
//!
//! The controller talks to persistence through [`ConversationStore`].
//! [`SqliteStore`] serializes access to one connection and runs each call on
//! the blocking pool.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::database::Database;
use super::messages::MessageStore;
use super::plans::PlanStore;
use crate::events::QuestionSet;
use crate::plan::{ConversationEntry, EntryRole, Plan, PlanUpdate};

/// Persistence used by the plan controller
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_plan(
        &self,
        project_id: Option<&str>,
        name: &str,
        description: &str,
    ) -> Result<Plan>;

    /// Partial update; an existing session id is never replaced
    async fn update_plan(&self, plan_id: &str, update: PlanUpdate) -> Result<()>;

    async fn append(&self, plan_id: &str, role: EntryRole, content: &str) -> Result<()>;

    async fn set_pending_question(&self, plan_id: &str, question: Option<&QuestionSet>)
        -> Result<()>;

    /// Append the user's answer and clear the pending question atomically
    async fn record_answer(&self, plan_id: &str, answer: &str) -> Result<()>;

    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>>;

    async fn find_plan_by_session(&self, session_id: &str) -> Result<Option<Plan>>;

    async fn conversation(&self, plan_id: &str) -> Result<Vec<ConversationEntry>>;
}

/// SQLite-backed [`ConversationStore`]
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::new(path)?))
    }

    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db.lock();
            f(&guard)
        })
        .await
        .context("Storage task panicked")?
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_plan(
        &self,
        project_id: Option<&str>,
        name: &str,
        description: &str,
    ) -> Result<Plan> {
        let project_id = project_id.map(str::to_string);
        let name = name.to_string();
        let description = description.to_string();
        self.with_db(move |db| PlanStore::new(db).create(project_id.as_deref(), &name, &description))
            .await
    }

    async fn update_plan(&self, plan_id: &str, update: PlanUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let plan_id = plan_id.to_string();
        self.with_db(move |db| PlanStore::new(db).update(&plan_id, &update))
            .await
    }

    async fn append(&self, plan_id: &str, role: EntryRole, content: &str) -> Result<()> {
        let plan_id = plan_id.to_string();
        let content = content.to_string();
        self.with_db(move |db| MessageStore::new(db).append(&plan_id, role, &content))
            .await
    }

    async fn set_pending_question(
        &self,
        plan_id: &str,
        question: Option<&QuestionSet>,
    ) -> Result<()> {
        let plan_id = plan_id.to_string();
        let question = question.cloned();
        self.with_db(move |db| {
            PlanStore::new(db).set_pending_question(&plan_id, question.as_ref())
        })
        .await
    }

    async fn record_answer(&self, plan_id: &str, answer: &str) -> Result<()> {
        let plan_id = plan_id.to_string();
        let answer = answer.to_string();
        self.with_db(move |db| MessageStore::new(db).record_answer(&plan_id, &answer))
            .await
    }

    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        let plan_id = plan_id.to_string();
        self.with_db(move |db| PlanStore::new(db).get(&plan_id)).await
    }

    async fn find_plan_by_session(&self, session_id: &str) -> Result<Option<Plan>> {
        let session_id = session_id.to_string();
        self.with_db(move |db| PlanStore::new(db).find_by_session(&session_id))
            .await
    }

    async fn conversation(&self, plan_id: &str) -> Result<Vec<ConversationEntry>> {
        let plan_id = plan_id.to_string();
        self.with_db(move |db| MessageStore::new(db).load(&plan_id))
            .await
    }
}
