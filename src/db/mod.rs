mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

use crate::error::{Error, Result};
use crate::models::*;

/// Durable store for tasks, skills, and session records.
///
/// One connection behind a writer lock: mutating calls serialize on the
/// mutex, and every mutation is committed before the call returns. Clones
/// share the same connection.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(schema::run_migrations(&conn)?)
    }

    /// Flush the WAL into the main database file.
    ///
    /// Holding the writer lock here means a caller archiving the durable
    /// file observes a consistent snapshot: no write can land mid-copy.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    // ============================================================
    // Task operations
    // ============================================================

    pub fn create_task(&self, input: CreateTaskInput) -> Result<Task> {
        if input.title.trim().is_empty() {
            return Err(Error::Validation("task title must not be empty".into()));
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let status = input.status.unwrap_or(TaskStatus::Todo);
        let priority = input.priority.unwrap_or(DEFAULT_PRIORITY);

        conn.execute(
            "INSERT INTO tasks (title, status, priority, due_at, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                &input.title,
                status.as_str(),
                priority,
                input.due_at.map(|d| d.to_rfc3339()),
                &input.metadata,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;
        let id = conn.last_insert_rowid();

        Ok(Task {
            id,
            title: input.title,
            status,
            priority,
            due_at: input.due_at,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        })
    }

    /// All tasks in storage order. No pagination: the store is personal-scale.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, status, priority, due_at, metadata, created_at, updated_at
             FROM tasks ORDER BY id",
        )?;

        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, status, priority, due_at, metadata, created_at, updated_at
             FROM tasks WHERE id = ?",
        )?;

        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(task_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Flip `done` back to `todo`, or complete any other status to `done`.
    pub fn toggle_task_status(&self, id: i64) -> Result<Task> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let current: Option<String> = conn
            .query_row("SELECT status FROM tasks WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(current) = current else {
            return Err(Error::NotFound(format!("task {} does not exist", id)));
        };

        let status = TaskStatus::from_str(&current)
            .unwrap_or(TaskStatus::Todo)
            .toggled();
        let now = Utc::now();

        conn.execute(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?",
            (status.as_str(), now.to_rfc3339(), id),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, title, status, priority, due_at, metadata, created_at, updated_at
             FROM tasks WHERE id = ?",
        )?;
        let task = stmt.query_row([id], task_from_row)?;
        Ok(task)
    }

    /// Tasks mutated at or after `cutoff`, most recent first. Used by the
    /// continuity policy's partial restore.
    pub fn tasks_updated_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, status, priority, due_at, metadata, created_at, updated_at
             FROM tasks WHERE updated_at >= ? ORDER BY updated_at DESC",
        )?;

        let tasks = stmt
            .query_map([cutoff.to_rfc3339()], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Most recently touched tasks, for a full restore read-back.
    pub fn recent_tasks(&self, limit: u32) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, status, priority, due_at, metadata, created_at, updated_at
             FROM tasks ORDER BY updated_at DESC LIMIT ?",
        )?;

        let tasks = stmt
            .query_map([limit], task_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    // ============================================================
    // Skill operations
    // ============================================================

    /// Create a skill, or replace the fields of the existing skill with the
    /// same name. The name is the lookup key for automation callers, so
    /// replacement is last-write-wins at the name level; id and `created_at`
    /// of the existing row are preserved.
    pub fn upsert_skill(&self, input: CreateSkillInput) -> Result<Skill> {
        if input.name.trim().is_empty() {
            return Err(Error::Validation("skill name must not be empty".into()));
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();

        conn.execute(
            "INSERT INTO skills (name, command, description, prompt, code, tags, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                 command = excluded.command,
                 description = excluded.description,
                 prompt = excluded.prompt,
                 code = excluded.code,
                 tags = excluded.tags,
                 updated_at = excluded.updated_at",
            (
                &input.name,
                &input.command,
                &input.description,
                &input.prompt,
                &input.code,
                &input.tags,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, name, command, description, prompt, code, tags, created_at, updated_at
             FROM skills WHERE name = ?",
        )?;
        let skill = stmt.query_row([&input.name], skill_from_row)?;
        Ok(skill)
    }

    pub fn list_skills(&self) -> Result<Vec<Skill>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, command, description, prompt, code, tags, created_at, updated_at
             FROM skills ORDER BY id",
        )?;

        let skills = stmt
            .query_map([], skill_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(skills)
    }

    // ============================================================
    // Session records
    // ============================================================

    pub fn record_session(
        &self,
        summary: Option<String>,
        backup_ref: Option<String>,
    ) -> Result<SessionRecord> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sessions (started_at, summary, backup_ref) VALUES (?, ?, ?)",
            (now.to_rfc3339(), &summary, &backup_ref),
        )?;
        let id = conn.last_insert_rowid();

        Ok(SessionRecord {
            id,
            started_at: now,
            summary,
            backup_ref,
        })
    }

    /// Latest by timestamp, not by insertion order: a replayed record may be
    /// older than rows inserted after it.
    pub fn latest_session(&self) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, started_at, summary, backup_ref
             FROM sessions ORDER BY started_at DESC, id DESC LIMIT 1",
        )?;

        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(SessionRecord {
                id: row.get(0)?,
                started_at: parse_datetime(row.get::<_, String>(1)?),
                summary: row.get(2)?,
                backup_ref: row.get(3)?,
            })),
            None => Ok(None),
        }
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        status: TaskStatus::from_str(&row.get::<_, String>(2)?).unwrap_or(TaskStatus::Todo),
        priority: row.get(3)?,
        due_at: row.get::<_, Option<String>>(4)?.map(parse_datetime),
        metadata: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn skill_from_row(row: &Row) -> rusqlite::Result<Skill> {
    Ok(Skill {
        id: row.get(0)?,
        name: row.get(1)?,
        command: row.get(2)?,
        description: row.get(3)?,
        prompt: row.get(4)?,
        code: row.get(5)?,
        tags: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
        updated_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
