use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One project's isolation record, exclusively owned by the project hub.
///
/// `port` and `namespace` are derived deterministically from the project
/// path and never change after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRegistration {
    pub name: String,
    /// Absolute path of the project's store directory.
    pub path: String,
    /// Declared project type, folded into the namespace prefix.
    pub kind: String,
    pub port: u16,
    pub namespace: String,
    pub status: ProjectStatus,
    pub last_active: Option<DateTime<Utc>>,
}

/// Liveness of a registered project's service instance, refreshed from the
/// port probe rather than trusted from disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Inactive,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}
