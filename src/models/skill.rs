use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, reusable procedure or prompt template.
///
/// The name is the source of truth for automation callers, so it is unique
/// across all skills and lookups key on it rather than on the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    /// Command alias automation can invoke the skill by.
    pub command: Option<String>,
    pub description: Option<String>,
    /// Long-form prompt or procedure body.
    pub prompt: Option<String>,
    /// Executable payload, if the skill carries one.
    pub code: Option<String>,
    /// Comma-separated tag list.
    pub tags: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating — or, when the name already exists, replacing — a
/// skill. Replacement is last-write-wins at the name level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSkillInput {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}
