//! Plan CRUD operations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::database::Database;
use crate::events::QuestionSet;
use crate::plan::{Plan, PlanStatus, PlanUpdate};

const PLAN_COLUMNS: &str = "id, project_id, name, description, status, session_id,
    pending_question, created_at, updated_at";

/// Plan persistence store
pub struct PlanStore<'a> {
    db: &'a Database,
}

impl<'a> PlanStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a draft plan
    pub fn create(&self, project_id: Option<&str>, name: &str, description: &str) -> Result<Plan> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        self.db
            .conn()
            .execute(
                "INSERT INTO plans (id, project_id, name, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id,
                    project_id,
                    name,
                    description,
                    PlanStatus::Draft.as_str(),
                    now_str
                ],
            )
            .context("Failed to create plan")?;

        Ok(Plan {
            id,
            project_id: project_id.map(str::to_string),
            name: name.to_string(),
            description: description.to_string(),
            status: PlanStatus::Draft,
            session_id: None,
            pending_question: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, plan_id: &str) -> Result<Option<Plan>> {
        let sql = format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLUMNS);
        self.db
            .conn()
            .query_row(&sql, [plan_id], row_to_plan)
            .optional()
            .context("Failed to load plan")
    }

    /// Most recently updated plan linked to an agent session
    pub fn find_by_session(&self, session_id: &str) -> Result<Option<Plan>> {
        let sql = format!(
            "SELECT {} FROM plans WHERE session_id = ?1 ORDER BY updated_at DESC LIMIT 1",
            PLAN_COLUMNS
        );
        self.db
            .conn()
            .query_row(&sql, [session_id], row_to_plan)
            .optional()
            .context("Failed to find plan by session")
    }

    /// Apply a partial update
    ///
    /// A session id is only written when the plan has none, so it stays
    /// stable across resume cycles.
    pub fn update(&self, plan_id: &str, update: &PlanUpdate) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = self.db.conn().execute(
            "UPDATE plans
             SET session_id = COALESCE(session_id, ?1),
                 status = COALESCE(?2, status),
                 updated_at = ?3
             WHERE id = ?4",
            params![
                update.session_id,
                update.status.map(|s| s.as_str()),
                now,
                plan_id
            ],
        )?;

        if affected == 0 {
            anyhow::bail!("Plan not found: {}", plan_id);
        }
        Ok(())
    }

    /// Replace (or clear) the pending question
    pub fn set_pending_question(&self, plan_id: &str, question: Option<&QuestionSet>) -> Result<()> {
        let json = question.map(serde_json::to_string).transpose()?;
        let now = Utc::now().to_rfc3339();
        let affected = self.db.conn().execute(
            "UPDATE plans SET pending_question = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, now, plan_id],
        )?;

        if affected == 0 {
            anyhow::bail!("Plan not found: {}", plan_id);
        }
        Ok(())
    }
}

fn row_to_plan(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
    let status: String = row.get(4)?;
    let pending_json: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Plan {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status: PlanStatus::parse(&status),
        session_id: row.get(5)?,
        pending_question: pending_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::events::Question;

    fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::new(&temp_dir.path().join("test.db")).expect("Failed to create database");
        (db, temp_dir)
    }

    fn question_set() -> QuestionSet {
        QuestionSet {
            tool_use_id: "tu_1".into(),
            questions: vec![Question {
                text: "Which database?".into(),
                header: None,
                options: vec![],
                multi_select: false,
            }],
        }
    }

    #[test]
    fn test_create_and_get() {
        let (db, _temp) = create_test_db();
        let store = PlanStore::new(&db);

        let plan = store.create(Some("proj-1"), "Hello", "Hello").unwrap();
        let loaded = store.get(&plan.id).unwrap().expect("plan should exist");

        assert_eq!(loaded.name, "Hello");
        assert_eq!(loaded.project_id.as_deref(), Some("proj-1"));
        assert_eq!(loaded.status, PlanStatus::Draft);
        assert!(loaded.session_id.is_none());
        assert!(loaded.pending_question.is_none());
    }

    #[test]
    fn test_get_missing_plan() {
        let (db, _temp) = create_test_db();
        assert!(PlanStore::new(&db).get("nope").unwrap().is_none());
    }

    #[test]
    fn test_session_id_is_stable() {
        let (db, _temp) = create_test_db();
        let store = PlanStore::new(&db);
        let plan = store.create(None, "p", "p").unwrap();

        store.update(&plan.id, &PlanUpdate::session("first")).unwrap();
        store.update(&plan.id, &PlanUpdate::session("second")).unwrap();

        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.session_id.as_deref(), Some("first"));
        assert_eq!(
            store.find_by_session("first").unwrap().map(|p| p.id),
            Some(plan.id.clone())
        );
        assert!(store.find_by_session("second").unwrap().is_none());
    }

    #[test]
    fn test_status_update_keeps_session() {
        let (db, _temp) = create_test_db();
        let store = PlanStore::new(&db);
        let plan = store.create(None, "p", "p").unwrap();
        store.update(&plan.id, &PlanUpdate::session("s")).unwrap();
        store
            .update(&plan.id, &PlanUpdate::status(PlanStatus::Published))
            .unwrap();

        let loaded = store.get(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.status, PlanStatus::Published);
        assert_eq!(loaded.session_id.as_deref(), Some("s"));
    }

    #[test]
    fn test_update_unknown_plan_fails() {
        let (db, _temp) = create_test_db();
        assert!(PlanStore::new(&db)
            .update("missing", &PlanUpdate::session("s"))
            .is_err());
    }

    #[test]
    fn test_pending_question_set_and_clear() {
        let (db, _temp) = create_test_db();
        let store = PlanStore::new(&db);
        let plan = store.create(None, "p", "p").unwrap();

        store
            .set_pending_question(&plan.id, Some(&question_set()))
            .unwrap();
        assert_eq!(
            store.get(&plan.id).unwrap().unwrap().pending_question,
            Some(question_set())
        );

        store.set_pending_question(&plan.id, None).unwrap();
        assert!(store.get(&plan.id).unwrap().unwrap().pending_question.is_none());
    }
}
