//! SQLite-backed task store.
//!
//! One `tasks` table keyed by id. The trimmed name carries a `UNIQUE`
//! constraint, so create and rename are conditional writes: two writers
//! racing on the same name cannot both succeed, even across processes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use cronflow_core::error::{CronflowError, Result};
use rusqlite::Error::FromSqlConversionFailure;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::tasks::{Task, ValidPatch, ValidTask};

const TASK_COLUMNS: &str =
    "id, name, repo, workflow, git_ref, cron, description, enabled, created_at, updated_at";

/// Persistent CRUD over task definitions.
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open or create the task database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CronflowError::Storage(format!("DB open: {e}")))?;

        // WAL for concurrent readers (e.g. a CLI listing while `serve` runs)
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        Self::with_connection(conn)
    }

    /// Volatile store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CronflowError::Storage(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,      -- stored trimmed
                repo TEXT NOT NULL,
                workflow TEXT NOT NULL,
                git_ref TEXT NOT NULL DEFAULT 'main',
                cron TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            ",
            )
            .map_err(|e| CronflowError::Storage(format!("Migration: {e}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CronflowError::Storage(format!("Lock: {e}")))
    }

    // ─── Reads ──────────────────────────────────────────────

    /// All tasks, oldest first. Best effort: storage failures yield an empty list.
    pub fn list(&self) -> Vec<Task> {
        match self.try_list() {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!("⚠️ Failed to list tasks: {e}");
                Vec::new()
            }
        }
    }

    fn try_list(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at, id"
            ))
            .map_err(|e| CronflowError::Storage(format!("List tasks: {e}")))?;

        let rows = stmt
            .query_map([], row_to_task)
            .map_err(|e| CronflowError::Storage(format!("List tasks: {e}")))?;

        Ok(rows
            .filter_map(|row| match row {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping unreadable task row: {e}");
                    None
                }
            })
            .collect())
    }

    /// Fetch one task.
    pub fn get(&self, id: &str) -> Result<Task> {
        let conn = self.lock()?;
        Self::fetch(&conn, id)?.ok_or_else(|| CronflowError::task_not_found(id))
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Task>> {
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            row_to_task,
        )
        .optional()
        .map_err(|e| CronflowError::Storage(format!("Get task: {e}")))
    }

    /// Whether any task other than `exclude_id` already uses this (trimmed) name.
    pub fn check_name_exists(&self, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let conn = self.lock()?;
        Self::name_taken(&conn, name, exclude_id)
    }

    fn name_taken(conn: &Connection, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM tasks WHERE name = ?1 AND (?2 IS NULL OR id != ?2) LIMIT 1",
                params![name.trim(), exclude_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CronflowError::Storage(format!("Name check: {e}")))?;
        Ok(found.is_some())
    }

    // ─── Writes ─────────────────────────────────────────────

    /// Persist a validated task. Returns the new id.
    pub fn create(&self, data: ValidTask) -> Result<String> {
        let conn = self.lock()?;
        if Self::name_taken(&conn, data.name(), None)? {
            return Err(CronflowError::Conflict(data.name().to_string()));
        }

        let task = data.into_task(uuid::Uuid::new_v4().to_string(), Utc::now());
        conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                task.id,
                task.name,
                task.repo,
                task.workflow,
                task.git_ref,
                task.cron,
                task.description,
                task.enabled as i32,
                task.created_at.to_rfc3339(),
                task.updated_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| write_error(e, &task.name))?;

        tracing::info!("📅 Task created: '{}' ({})", task.name, task.id);
        Ok(task.id)
    }

    /// Merge a validated patch over an existing task. Returns the updated record.
    pub fn update(&self, id: &str, patch: &ValidPatch) -> Result<Task> {
        let conn = self.lock()?;
        let mut task = Self::fetch(&conn, id)?.ok_or_else(|| CronflowError::task_not_found(id))?;

        if let Some(name) = patch.name() {
            if Self::name_taken(&conn, name, Some(id))? {
                return Err(CronflowError::Conflict(name.to_string()));
            }
        }

        task.apply(patch, Utc::now());
        conn.execute(
            "UPDATE tasks SET name = ?2, repo = ?3, workflow = ?4, git_ref = ?5, cron = ?6,
                 description = ?7, enabled = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                task.id,
                task.name,
                task.repo,
                task.workflow,
                task.git_ref,
                task.cron,
                task.description,
                task.enabled as i32,
                task.updated_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| write_error(e, &task.name))?;

        tracing::info!("✏️ Task updated: '{}' ({})", task.name, task.id);
        Ok(task)
    }

    /// Remove a task. Absent ids are not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        let removed = self
            .lock()?
            .execute("DELETE FROM tasks WHERE id = ?1", [id])
            .map_err(|e| CronflowError::Storage(format!("Delete task: {e}")))?;
        if removed > 0 {
            tracing::info!("🗑️ Task deleted: {}", id);
        }
        Ok(())
    }
}

/// UNIQUE(name) violations are name conflicts; everything else is storage trouble.
fn write_error(e: rusqlite::Error, name: &str) -> CronflowError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CronflowError::Conflict(name.to_string())
        }
        _ => CronflowError::Storage(format!("Write task: {e}")),
    }
}

/// Stored timestamps are RFC 3339; anything else makes the row unreadable.
fn parse_time(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let created_at_str: String = row.get(8)?;
    let updated_at_str: Option<String> = row.get(9)?;

    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        repo: row.get(2)?,
        workflow: row.get(3)?,
        git_ref: row.get(4)?,
        cron: row.get(5)?,
        description: row.get(6)?,
        enabled: row.get::<_, i32>(7)? != 0,
        created_at: parse_time(8, &created_at_str)?,
        updated_at: updated_at_str
            .as_deref()
            .map(|raw| parse_time(9, raw))
            .transpose()?,
    })
}
