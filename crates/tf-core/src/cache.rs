use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{StoreError, TaskStore};
use crate::types::{Task, TaskStatus};

/// Async SQLite-backed task store.
pub struct SqliteStore {
    conn: Connection,
}

const TASK_COLUMNS: &str = "id, title, description, task_type, status, priority, progress,
    parent_task_id, assignee, due_date, metadata, result, created_at, updated_at,
    started_at, completed_at";

// ---------------------------------------------------------------------------
// helpers – enum <-> SQLite string
// ---------------------------------------------------------------------------

fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    serde_json::to_value(val)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn enum_from_sql<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|e| conversion_error(idx, e))
}

fn json_from_sql<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e))
}

fn uuid_from_sql(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(idx, e))
}

fn date_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn map_err(err: tokio_rusqlite::Error) -> StoreError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::FromSqlConversionFailure(
            idx,
            _,
            inner,
        )) => {
            warn!(column = idx, error = %inner, "unreadable task row");
            StoreError::Corrupt(format!("column {idx}: {inner}"))
        }
        other => StoreError::Backend(other.to_string()),
    }
}

impl SqliteStore {
    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).await.map_err(map_err)?;
        let db = Self { conn };
        db.init_schema().await?;
        debug!(path = %path.display(), "task store opened");
        Ok(db)
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(map_err)?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS tasks (
                        id             TEXT PRIMARY KEY,
                        title          TEXT NOT NULL,
                        description    TEXT,
                        task_type      TEXT NOT NULL,
                        status         TEXT NOT NULL,
                        priority       TEXT NOT NULL,
                        progress       INTEGER NOT NULL DEFAULT 0,
                        parent_task_id TEXT REFERENCES tasks(id) ON DELETE CASCADE,
                        assignee       TEXT,
                        due_date       TEXT,
                        metadata       TEXT NOT NULL DEFAULT '{}',
                        result         TEXT,
                        created_at     TEXT NOT NULL,
                        updated_at     TEXT NOT NULL,
                        started_at     TEXT,
                        completed_at   TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
                    CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id);
                    ",
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    async fn query_tasks(
        &self,
        filter: &'static str,
        param: Option<String>,
    ) -> Result<Vec<Task>, StoreError> {
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {TASK_COLUMNS} FROM tasks {filter} ORDER BY created_at ASC, id ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = match &param {
                    Some(p) => stmt.query(rusqlite::params![p])?,
                    None => stmt.query([])?,
                };
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_task(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(map_err)
    }

    /// Delete a task. Owned sub-tasks are removed by the foreign-key cascade.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id_str])?;
                Ok(n > 0)
            })
            .await
            .map_err(map_err)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn load(&self, id: Uuid) -> Result<Task, StoreError> {
        let id_str = id.to_string();
        let found = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_task(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(map_err)?;
        found.ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let id = task.id.to_string();
        let title = task.title.clone();
        let description = task.description.clone();
        let task_type = enum_to_sql(&task.task_type);
        let status = task.status.as_str().to_string();
        let priority = enum_to_sql(&task.priority);
        let progress = i64::from(task.progress);
        let parent_task_id = task.parent_task_id.map(|u| u.to_string());
        let assignee = task
            .assignee
            .as_ref()
            .and_then(|a| serde_json::to_string(a).ok());
        let due_date = task.due_date.map(|d| d.to_rfc3339());
        let metadata = serde_json::Value::Object(task.metadata.clone()).to_string();
        let result = task.result.as_ref().map(|v| v.to_string());
        let created_at = task.created_at.to_rfc3339();
        let updated_at = task.updated_at.to_rfc3339();
        let started_at = task.started_at.map(|d| d.to_rfc3339());
        let completed_at = task.completed_at.map(|d| d.to_rfc3339());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, title, description, task_type, status, priority,
                        progress, parent_task_id, assignee, due_date, metadata, result,
                        created_at, updated_at, started_at, completed_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                     ON CONFLICT(id) DO UPDATE SET
                        title=excluded.title, description=excluded.description,
                        task_type=excluded.task_type, status=excluded.status,
                        priority=excluded.priority, progress=excluded.progress,
                        parent_task_id=excluded.parent_task_id, assignee=excluded.assignee,
                        due_date=excluded.due_date, metadata=excluded.metadata,
                        result=excluded.result, updated_at=excluded.updated_at,
                        started_at=excluded.started_at, completed_at=excluded.completed_at",
                    rusqlite::params![
                        id, title, description, task_type, status, priority, progress,
                        parent_task_id, assignee, due_date, metadata, result, created_at,
                        updated_at, started_at, completed_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_err)
    }

    async fn children(&self, parent_id: Uuid) -> Result<Vec<Task>, StoreError> {
        self.query_tasks("WHERE parent_task_id = ?1", Some(parent_id.to_string()))
            .await
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        self.query_tasks("WHERE status = ?1", Some(status.as_str().to_string()))
            .await
    }

    async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        self.query_tasks("", None).await
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id_str: String = row.get(0)?;
    let task_type_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let priority_str: String = row.get(5)?;
    let progress: i64 = row.get(6)?;
    let parent_str: Option<String> = row.get(7)?;
    let assignee_str: Option<String> = row.get(8)?;
    let due_str: Option<String> = row.get(9)?;
    let metadata_str: String = row.get(10)?;
    let result_str: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(12)?;
    let updated_at_str: String = row.get(13)?;
    let started_at_str: Option<String> = row.get(14)?;
    let completed_at_str: Option<String> = row.get(15)?;

    Ok(Task {
        id: uuid_from_sql(0, &id_str)?,
        title: row.get(1)?,
        description: row.get(2)?,
        task_type: enum_from_sql(3, &task_type_str)?,
        status: status_str
            .parse::<TaskStatus>()
            .map_err(|e| conversion_error(4, e))?,
        priority: enum_from_sql(5, &priority_str)?,
        progress: progress.clamp(0, 100) as u8,
        parent_task_id: parent_str.map(|s| uuid_from_sql(7, &s)).transpose()?,
        assignee: assignee_str.map(|s| json_from_sql(8, &s)).transpose()?,
        due_date: due_str.map(|s| date_from_sql(9, &s)).transpose()?,
        metadata: json_from_sql(10, &metadata_str)?,
        result: result_str.map(|s| json_from_sql(11, &s)).transpose()?,
        created_at: date_from_sql(12, &created_at_str)?,
        updated_at: date_from_sql(13, &updated_at_str)?,
        started_at: started_at_str.map(|s| date_from_sql(14, &s)).transpose()?,
        completed_at: completed_at_str.map(|s| date_from_sql(15, &s)).transpose()?,
    })
}
