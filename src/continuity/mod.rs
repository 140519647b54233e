//! Session-gap detection and the restore policy.
//!
//! The policy classifies the elapsed gap since the last recorded session
//! into bands and picks a restore strategy per band. Whatever the outcome of
//! the restore action, the "last seen" bookkeeping is updated and the
//! session counter incremented — bookkeeping is independent of restore
//! success.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backup;
use crate::config::StorePaths;
use crate::db::Database;
use crate::error::Result;

/// How many days of backups a long-gap report surfaces.
const RECENT_BACKUP_DAYS: i64 = 7;
/// How many store entries a full restore reads back.
const FULL_RESTORE_LIMIT: u32 = 50;

/// Classification of the gap since the last session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapClass {
    FirstSession,
    LongGap,
    MediumGap,
    Continuous,
    /// Bookkeeping could not be read; nothing can be assumed about the gap.
    Error,
}

impl GapClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstSession => "first_session",
            Self::LongGap => "long_gap",
            Self::MediumGap => "medium_gap",
            Self::Continuous => "continuous",
            Self::Error => "error",
        }
    }

    pub fn action(&self) -> RestoreAction {
        match self {
            Self::FirstSession => RestoreAction::Full,
            Self::LongGap => RestoreAction::FullWithSummary,
            Self::MediumGap => RestoreAction::Partial,
            Self::Continuous => RestoreAction::Minimal,
            Self::Error => RestoreAction::Safe,
        }
    }
}

/// The restore strategy chosen for a gap band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreAction {
    Full,
    FullWithSummary,
    Partial,
    Minimal,
    Safe,
}

impl RestoreAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full_restore",
            Self::FullWithSummary => "full_restore_with_summary",
            Self::Partial => "partial_restore",
            Self::Minimal => "minimal_restore",
            Self::Safe => "safe_restore",
        }
    }
}

/// Pure classification of an elapsed gap. `None` means no prior session was
/// ever recorded.
pub fn classify(gap: Option<Duration>) -> GapClass {
    match gap {
        None => GapClass::FirstSession,
        Some(gap) if gap > Duration::hours(8) => GapClass::LongGap,
        Some(gap) if gap > Duration::hours(2) => GapClass::MediumGap,
        Some(_) => GapClass::Continuous,
    }
}

/// What one `resume` invocation did.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub class: GapClass,
    pub action: RestoreAction,
    pub gap_hours: Option<f64>,
    pub message: String,
    /// Store entries read back (full/partial restore).
    pub restored_tasks: usize,
    /// Freeform log lines inside the gap window (partial restore).
    pub log_lines: usize,
    /// Backup archives from the recent window (long gap only).
    pub recent_backups: Vec<String>,
    /// Narrative summary synthesized from the session notes (long gap only).
    pub summary: Option<String>,
    /// Session counter after the unconditional bookkeeping update.
    pub session_count: u64,
    /// Set when the chosen restore action itself failed.
    pub failure: Option<String>,
}

/// Bookkeeping persisted in `session_log.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionLog {
    last_session: Option<String>,
    #[serde(default)]
    session_count: u64,
}

/// Runs the continuity policy against one project's store.
pub struct SessionTracker {
    paths: StorePaths,
    db: Database,
}

impl SessionTracker {
    pub fn new(paths: StorePaths, db: Database) -> Self {
        Self { paths, db }
    }

    /// Detect the gap, perform the banded restore action, and update the
    /// bookkeeping. The bookkeeping update happens even when the restore
    /// action fails; a failure is captured in the report instead of
    /// propagating.
    pub fn resume(&self, now: DateTime<Utc>) -> RestoreReport {
        let mut report = match self.last_session_time() {
            Ok(last) => {
                let gap = last.map(|l| now - l);
                let class = classify(gap);
                let mut report = RestoreReport {
                    class,
                    action: class.action(),
                    gap_hours: gap.map(|g| g.num_minutes() as f64 / 60.0),
                    message: gap_message(class, gap),
                    restored_tasks: 0,
                    log_lines: 0,
                    recent_backups: Vec::new(),
                    summary: None,
                    session_count: 0,
                    failure: None,
                };
                if let Err(e) = self.perform(&mut report, now, gap) {
                    tracing::warn!("restore action failed: {}", e);
                    report.failure = Some(e.to_string());
                }
                report
            }
            Err(e) => RestoreReport {
                class: GapClass::Error,
                action: RestoreAction::Safe,
                gap_hours: None,
                message: format!("session bookkeeping unreadable: {}", e),
                restored_tasks: 0,
                log_lines: 0,
                recent_backups: Vec::new(),
                summary: None,
                session_count: 0,
                failure: None,
            },
        };

        // Unconditional side effect: last-seen timestamp and counter move
        // forward regardless of what the restore action did.
        match self.bump_session(now) {
            Ok(count) => report.session_count = count,
            Err(e) => tracing::warn!("failed to update session bookkeeping: {}", e),
        }

        report
    }

    fn perform(
        &self,
        report: &mut RestoreReport,
        now: DateTime<Utc>,
        gap: Option<Duration>,
    ) -> Result<()> {
        match report.action {
            RestoreAction::Full => {
                report.restored_tasks = self.db.recent_tasks(FULL_RESTORE_LIMIT)?.len();
                self.db.record_session(None, self.latest_backup_name()?)?;
            }
            RestoreAction::FullWithSummary => {
                report.restored_tasks = self.db.recent_tasks(FULL_RESTORE_LIMIT)?.len();
                report.recent_backups = backup::recent_backups(&self.paths, RECENT_BACKUP_DAYS)?
                    .into_iter()
                    .map(|m| m.file_name)
                    .collect();
                let summary = self.notes_summary();
                self.db
                    .record_session(Some(summary.clone()), self.latest_backup_name()?)?;
                report.summary = Some(summary);
            }
            RestoreAction::Partial => {
                // Only entries from inside the gap window
                let cutoff = now - gap.unwrap_or_else(Duration::zero);
                report.restored_tasks = self.db.tasks_updated_since(cutoff)?.len();
                report.log_lines = self.log_lines_since(cutoff)?;
            }
            RestoreAction::Minimal | RestoreAction::Safe => {}
        }
        Ok(())
    }

    fn last_session_time(&self) -> Result<Option<DateTime<Utc>>> {
        let log = self.read_log()?;
        match log.last_session {
            Some(ref raw) => {
                let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                    crate::Error::Validation(format!("bad last_session timestamp: {}", e))
                })?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }

    fn read_log(&self) -> Result<SessionLog> {
        let path = self.paths.session_log_file();
        if !path.exists() {
            return Ok(SessionLog::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Rewrite the bookkeeping with the current timestamp and an incremented
    /// counter; returns the new counter value.
    fn bump_session(&self, now: DateTime<Utc>) -> Result<u64> {
        // A corrupt log must not block bookkeeping: restart the counter.
        let count = self.read_log().map(|l| l.session_count).unwrap_or(0) + 1;
        let log = SessionLog {
            last_session: Some(now.to_rfc3339()),
            session_count: count,
        };
        self.paths.ensure_dirs()?;
        std::fs::write(
            self.paths.session_log_file(),
            serde_json::to_string_pretty(&log)?,
        )?;
        Ok(count)
    }

    fn latest_backup_name(&self) -> Result<Option<String>> {
        Ok(backup::list_backups(&self.paths, 1)?
            .pop()
            .map(|m| m.file_name))
    }

    /// Narrative summary from the tail of the session notes: the last few
    /// non-empty lines of the final stretch of the file.
    fn notes_summary(&self) -> String {
        let Ok(content) = std::fs::read_to_string(self.paths.notes_file()) else {
            return "No session notes yet".to_string();
        };
        let recent: Vec<&str> = content
            .lines()
            .rev()
            .take(20)
            .filter(|l| !l.trim().is_empty())
            .take(3)
            .collect();
        if recent.is_empty() {
            return "No session notes yet".to_string();
        }
        let ordered: Vec<&str> = recent.into_iter().rev().collect();
        format!("Recent activity: {}", ordered.join(" | "))
    }

    /// Count freeform log lines whose leading `[YYYY-MM-DD HH:MM:SS]` stamp
    /// falls inside the window. Unstampable lines are skipped.
    fn log_lines_since(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let path = self.paths.auto_log_file();
        if !path.exists() {
            return Ok(0);
        }
        let content = std::fs::read_to_string(path)?;
        let count = content
            .lines()
            .filter_map(parse_log_stamp)
            .filter(|ts| *ts >= cutoff)
            .count();
        Ok(count)
    }
}

fn parse_log_stamp(line: &str) -> Option<DateTime<Utc>> {
    let stamp = line.strip_prefix('[')?.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(naive.and_utc())
}

fn gap_message(class: GapClass, gap: Option<Duration>) -> String {
    match class {
        GapClass::FirstSession => "first session, nothing to restore from".to_string(),
        GapClass::Continuous => "continuous session".to_string(),
        GapClass::Error => "session bookkeeping unreadable".to_string(),
        _ => {
            let gap = gap.unwrap_or_else(Duration::zero);
            let days = gap.num_days();
            let hours = gap.num_hours() - days * 24;
            if days > 0 {
                format!("resuming after {} days {} hours away", days, hours)
            } else {
                format!("resuming after {} hours away", hours)
            }
        }
    }
}
