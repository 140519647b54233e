//! On-disk layout for one project's store directory.
//!
//! Every durable artifact the service owns lives under a single directory:
//! the SQLite file, the session notes, the freeform log, continuity
//! bookkeeping, snapshot archives, and the PID marker of a running instance.
//! Resolution order for the directory is explicit flag, then the
//! `TETHER_DIR` environment variable, then the platform data directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Error, Result};

/// File name of the durable relational store.
pub const DB_FILE: &str = "memory.sqlite";
/// Append-only operator notes artifact.
pub const NOTES_FILE: &str = "session-notes.md";
/// Optional auxiliary task-list file, bundled into backups when present.
pub const TASKS_FILE: &str = "tasks.md";
/// Append-only freeform log fed by `POST /auto`.
pub const AUTO_LOG_FILE: &str = "auto_summary.log";
/// Continuity bookkeeping (last session timestamp + counter).
pub const SESSION_LOG_FILE: &str = "session_log.json";
/// PID marker while a server instance owns this store.
pub const PID_FILE: &str = "tether.pid";
/// Optional sub-directory bundled recursively into backups.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Platform data directory for this tool, falling back to a dot directory
/// in the operator's home.
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "tether")
        .map(|d| d.data_dir().to_path_buf())
        .or_else(|| dirs::home_dir().map(|h| h.join(".tether")))
        .ok_or_else(|| Error::Io(std::io::Error::other("could not determine data directory")))
}

#[derive(Debug, Clone)]
pub struct StorePaths {
    store_dir: PathBuf,
}

impl StorePaths {
    /// Resolve the store directory: explicit override, `TETHER_DIR`, or the
    /// platform data directory.
    pub fn resolve(dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = dir {
            return Ok(Self { store_dir: dir });
        }
        if let Ok(dir) = std::env::var("TETHER_DIR") {
            return Ok(Self {
                store_dir: PathBuf::from(dir),
            });
        }
        Ok(Self {
            store_dir: default_data_dir()?,
        })
    }

    pub fn at(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn db_file(&self) -> PathBuf {
        self.store_dir.join(DB_FILE)
    }

    pub fn notes_file(&self) -> PathBuf {
        self.store_dir.join(NOTES_FILE)
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.store_dir.join(TASKS_FILE)
    }

    pub fn auto_log_file(&self) -> PathBuf {
        self.store_dir.join(AUTO_LOG_FILE)
    }

    pub fn session_log_file(&self) -> PathBuf {
        self.store_dir.join(SESSION_LOG_FILE)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.store_dir.join(PID_FILE)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.store_dir.join(ATTACHMENTS_DIR)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.store_dir)?;
        Ok(())
    }

    /// Append a timestamped line to the freeform log and return the number
    /// of characters logged.
    pub fn append_auto_log(&self, text: &str) -> Result<usize> {
        self.ensure_dirs()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.auto_log_file())?;
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] {}", stamp, text)?;
        Ok(text.chars().count())
    }

    // ------------------------------------------------------------
    // PID marker
    // ------------------------------------------------------------

    /// Record this process as the instance owning the store.
    pub fn write_pid(&self) -> Result<()> {
        self.ensure_dirs()?;
        std::fs::write(self.pid_file(), std::process::id().to_string())?;
        Ok(())
    }

    /// Read the recorded PID. Absence means "not running" and is not an error.
    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn remove_pid(&self) -> Result<()> {
        let pid_file = self.pid_file();
        if pid_file.exists() {
            std::fs::remove_file(pid_file)?;
        }
        Ok(())
    }

    /// Check whether the process recorded in the PID marker is still alive.
    #[cfg(unix)]
    pub fn instance_running(&self) -> bool {
        match self.read_pid() {
            // Signal 0 probes for existence without delivering anything
            Some(pid) => unsafe { libc::kill(pid as i32, 0) == 0 },
            None => false,
        }
    }

    #[cfg(not(unix))]
    pub fn instance_running(&self) -> bool {
        self.read_pid().is_some()
    }
}
