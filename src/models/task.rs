use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work.
///
/// Identifiers are assigned by the store, unique, and monotonically
/// increasing; once assigned they never change. Tasks are never physically
/// deleted — `dropped` is a status, not a removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub due_at: Option<DateTime<Utc>>,
    /// Free-form structured text, e.g. a serialized key/value map.
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
}

/// Task lifecycle status. Any status is reachable from any other; toggling
/// without an explicit target cycles `done` ↔ `todo`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
    Blocked,
    Dropped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Dropped => "dropped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "doing" => Some(Self::Doing),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }

    /// The status a toggle lands on: `done` flips back to `todo`, anything
    /// else completes to `done`.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Done => Self::Todo,
            _ => Self::Done,
        }
    }
}

/// Input for creating a task. Title is required and must be non-empty;
/// everything else has a serviceable default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Mid-range default when the caller does not rank the task.
pub const DEFAULT_PRIORITY: i32 = 3;
