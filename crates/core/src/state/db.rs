//! # Task History Store
//!
//! SQLite record of finished tasks: the terminal report, its stage records,
//! change records and agent session ids. Continuations are resolved from here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::task_state::{
    ChangeRecord, PreviousTaskContext, SessionIds, StageRecord, TaskReport,
};
use crate::swarm::pipeline::{PipelineMode, Stage, TaskStatus};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// One row of `conveyor history`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub task_id: String,
    pub prompt: String,
    pub mode: PipelineMode,
    pub status: TaskStatus,
    pub previous_task_id: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Task history database
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    /// Open or create the database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open task history at {:?}", path.as_ref()))?;
        Self::with_connection(conn)
    }

    /// Fresh in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                prompt TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                previous_task_id TEXT,
                tests_json TEXT NOT NULL DEFAULT '[]',
                commit_json TEXT,
                failure_json TEXT,
                finished_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stage_records (
                task_id TEXT NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                stage TEXT NOT NULL,
                success INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                error TEXT,
                started_at TEXT NOT NULL,
                PRIMARY KEY (task_id, seq)
            );

            CREATE TABLE IF NOT EXISTS changes (
                task_id TEXT NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                file TEXT NOT NULL,
                action TEXT NOT NULL,
                summary TEXT NOT NULL,
                PRIMARY KEY (task_id, seq)
            );

            CREATE TABLE IF NOT EXISTS sessions (
                task_id TEXT NOT NULL REFERENCES tasks(task_id) ON DELETE CASCADE,
                stage TEXT NOT NULL,
                session_id TEXT NOT NULL,
                PRIMARY KEY (task_id, stage)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_finished_at ON tasks(finished_at);
            "#,
        )?;
        Ok(())
    }

    /// Persist a terminal report, replacing any earlier copy
    pub fn save_report(&self, report: &TaskReport) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction()?;

        for table in ["stage_records", "changes", "sessions", "tasks"] {
            tx.execute(
                &format!("DELETE FROM {} WHERE task_id = ?1", table),
                params![report.task_id],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO tasks (task_id, prompt, mode, status, previous_task_id,
                               tests_json, commit_json, failure_json, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                report.task_id,
                report.prompt,
                report.mode.as_str(),
                status_str(report.status),
                report.previous_task_id,
                serde_json::to_string(&report.tests)?,
                report.commit.as_ref().map(serde_json::to_string).transpose()?,
                report.failure.as_ref().map(serde_json::to_string).transpose()?,
                report.finished_at.to_rfc3339(),
            ],
        )?;

        for (seq, record) in report.stages.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO stage_records (task_id, seq, stage, success, duration_ms, error, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    report.task_id,
                    seq as i64,
                    record.stage.as_str(),
                    record.success,
                    record.duration_ms as i64,
                    record.error,
                    record.started_at.to_rfc3339(),
                ],
            )?;
        }

        for (seq, change) in report.changes.iter().enumerate() {
            tx.execute(
                "INSERT INTO changes (task_id, seq, file, action, summary) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    report.task_id,
                    seq as i64,
                    change.file,
                    change.action.as_str(),
                    change.summary
                ],
            )?;
        }

        for (stage, session_id) in report.sessions.entries() {
            tx.execute(
                "INSERT INTO sessions (task_id, stage, session_id) VALUES (?1, ?2, ?3)",
                params![report.task_id, stage.as_str(), session_id],
            )?;
        }

        tx.commit()?;
        tracing::debug!(task_id = %report.task_id, "Saved task report");
        Ok(())
    }

    /// Load a report by task id
    pub fn load_report(&self, task_id: &str) -> Result<Option<TaskReport>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let row = conn
            .query_row(
                r#"
                SELECT prompt, mode, status, previous_task_id, tests_json,
                       commit_json, failure_json, finished_at
                FROM tasks WHERE task_id = ?1
                "#,
                params![task_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((prompt, mode, status, previous_task_id, tests, commit, failure, finished_at)) =
            row
        else {
            return Ok(None);
        };

        let stages = Self::load_stage_records(&conn, task_id)?;
        let changes = Self::load_changes(&conn, task_id)?;
        let sessions = Self::load_sessions(&conn, task_id)?;

        Ok(Some(TaskReport {
            task_id: task_id.to_string(),
            prompt,
            mode: mode.parse().map_err(|e: String| anyhow::anyhow!(e))?,
            status: parse_status(&status)?,
            stages,
            changes,
            tests: serde_json::from_str(&tests).context("Corrupt tests_json")?,
            commit: commit
                .map(|c| serde_json::from_str(&c))
                .transpose()
                .context("Corrupt commit_json")?,
            sessions,
            previous_task_id,
            failure: failure
                .map(|f| serde_json::from_str(&f))
                .transpose()
                .context("Corrupt failure_json")?,
            finished_at: parse_time(&finished_at)?,
        }))
    }

    /// Continuation context for a finished task
    pub fn load_previous_context(&self, task_id: &str) -> Result<Option<PreviousTaskContext>> {
        Ok(self
            .load_report(task_id)?
            .map(|report| report.to_previous_context()))
    }

    /// Most recently finished tasks first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<TaskSummary>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT task_id, prompt, mode, status, previous_task_id, finished_at
            FROM tasks ORDER BY finished_at DESC, rowid DESC LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (task_id, prompt, mode, status, previous_task_id, finished_at) = row?;
            summaries.push(TaskSummary {
                task_id,
                prompt,
                mode: mode.parse().map_err(|e: String| anyhow::anyhow!(e))?,
                status: parse_status(&status)?,
                previous_task_id,
                finished_at: parse_time(&finished_at)?,
            });
        }
        Ok(summaries)
    }

    fn load_stage_records(conn: &Connection, task_id: &str) -> Result<Vec<StageRecord>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT stage, success, duration_ms, error, started_at
            FROM stage_records WHERE task_id = ?1 ORDER BY seq
            "#,
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (stage, success, duration_ms, error, started_at) = row?;
            records.push(StageRecord {
                stage: stage.parse::<Stage>().map_err(|e| anyhow::anyhow!(e))?,
                success,
                duration_ms: duration_ms.max(0) as u64,
                error,
                started_at: parse_time(&started_at)?,
            });
        }
        Ok(records)
    }

    fn load_changes(conn: &Connection, task_id: &str) -> Result<Vec<ChangeRecord>> {
        let mut stmt = conn
            .prepare("SELECT file, action, summary FROM changes WHERE task_id = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut changes = Vec::new();
        for row in rows {
            let (file, action, summary) = row?;
            let action = action.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            changes.push(ChangeRecord::new(file, action, summary));
        }
        Ok(changes)
    }

    fn load_sessions(conn: &Connection, task_id: &str) -> Result<SessionIds> {
        let mut stmt = conn.prepare("SELECT stage, session_id FROM sessions WHERE task_id = ?1")?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut sessions = SessionIds::default();
        for row in rows {
            let (stage, session_id) = row?;
            let stage: Stage = stage.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            sessions.set(stage, session_id);
        }
        Ok(sessions)
    }
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Queued => "queued",
        TaskStatus::Running(_) => "running",
        TaskStatus::Succeeded => "succeeded",
        TaskStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    match s {
        "succeeded" => Ok(TaskStatus::Succeeded),
        "failed" => Ok(TaskStatus::Failed),
        "queued" => Ok(TaskStatus::Queued),
        other => anyhow::bail!("Unexpected stored task status '{}'", other),
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp '{}'", s))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentModel;
    use crate::state::{ChangeAction, CommitRecord, PipelineState, TaskFailure, TestRecord};
    use std::time::Duration;

    fn report(task_id: &str, status: TaskStatus) -> TaskReport {
        let mut state =
            PipelineState::new(task_id, "add greet", ".", AgentModel::Sonnet, PipelineMode::Full);
        state.record(StageRecord::succeeded(
            Stage::Implementing,
            Utc::now(),
            Duration::from_millis(120),
        ));
        state.record(StageRecord::failed(
            Stage::Verifying,
            Utc::now(),
            Duration::from_millis(40),
            "boom",
        ));
        state
            .changes
            .push(ChangeRecord::new("src/lib.rs", ChangeAction::Modified, "add greet"));
        state.tests.push(TestRecord::failed("tests/a.rs", "greets", "boom"));
        state.sessions.set(Stage::Implementing, "impl-1");
        state.commit = Some(CommitRecord {
            committed: false,
            message: String::new(),
            sha: None,
        });
        let failure = (status == TaskStatus::Failed).then(|| TaskFailure {
            stage: Some(Stage::Verifying),
            kind: "agent_invocation".to_string(),
            error: "boom".to_string(),
            failing_tests: vec![],
        });
        TaskReport::from_state(state, status, failure)
    }

    #[test]
    fn test_open_creates_tables() {
        let store = TaskStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["tasks", "stage_records", "changes", "sessions", "schema_version"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_report_round_trip() {
        let store = TaskStore::open_in_memory().unwrap();
        let saved = report("task-1", TaskStatus::Failed);
        store.save_report(&saved).unwrap();

        let loaded = store.load_report("task-1").unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
        assert_eq!(loaded.stages, saved.stages);
        assert_eq!(loaded.changes, saved.changes);
        assert_eq!(loaded.tests, saved.tests);
        assert_eq!(loaded.commit, saved.commit);
        assert_eq!(loaded.sessions, saved.sessions);
        assert_eq!(loaded.failure, saved.failure);
    }

    #[test]
    fn test_save_replaces_previous_copy() {
        let store = TaskStore::open_in_memory().unwrap();
        store.save_report(&report("task-1", TaskStatus::Failed)).unwrap();
        store
            .save_report(&report("task-1", TaskStatus::Succeeded))
            .unwrap();

        let loaded = store.load_report("task-1").unwrap().unwrap();
        assert!(loaded.succeeded());
        assert_eq!(loaded.stages.len(), 2);
        assert_eq!(store.list_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_task() {
        let store = TaskStore::open_in_memory().unwrap();
        assert!(store.load_report("missing").unwrap().is_none());
        assert!(store.load_previous_context("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_recent_limit() {
        let store = TaskStore::open_in_memory().unwrap();
        for id in ["a", "b", "c"] {
            store.save_report(&report(id, TaskStatus::Succeeded)).unwrap();
        }
        let recent = store.list_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].prompt, "add greet");
    }

    #[test]
    fn test_schema_version_tracking() {
        let path = std::env::temp_dir().join(format!("conveyor-{}.db", uuid::Uuid::new_v4()));
        drop(TaskStore::open_at(&path).unwrap());

        let store = TaskStore::open_at(&path).unwrap();
        let conn = store.conn.lock().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        drop(conn);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_open_reports_unusable_parent() {
        // A regular file where the parent directory should be
        let blocker = std::env::temp_dir().join(format!("conveyor-blocker-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = TaskStore::open_at(blocker.join("history").join("conveyor.db"))
            .err()
            .expect("opening under a file must fail");
        assert!(err.to_string().contains("Failed to create directory"), "got: {err:#}");

        let _ = std::fs::remove_file(blocker);
    }
}
