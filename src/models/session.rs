use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An append-only marker that the operator was active.
///
/// "Latest" is always the maximum by `started_at`, not by insertion order —
/// a restored or replayed record can be older than rows inserted after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    /// Human-readable summary, present when the continuity policy
    /// synthesized one.
    pub summary: Option<String>,
    /// File name of the most recent backup archive at the time of recording.
    pub backup_ref: Option<String>,
}
