//! Point-in-time snapshot archives of the store.
//!
//! An archive bundles the durable store file and the session-notes artifact
//! (plus the auxiliary task-list file and the attachments sub-directory when
//! present) into a single `backup_<YYYYMMDD_HHMMSS>.zip`. The zero-padded
//! name sorts lexicographically by recency, so "most recent N" never needs
//! to parse dates. Archives are immutable once written; retention is left to
//! the operator.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::config::{StorePaths, DB_FILE, NOTES_FILE, TASKS_FILE};
use crate::db::Database;
use crate::error::{Error, Result};

const ARCHIVE_PREFIX: &str = "backup_";
const ARCHIVE_SUFFIX: &str = ".zip";
const STAGING_DIR: &str = ".restore-staging";

/// What `list_backups` reports for one archive.
#[derive(Debug, Clone)]
pub struct ArchiveMeta {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    /// Human age bucket: "n minutes" / "n hours" / "n days".
    pub age: String,
}

/// Create a snapshot archive and return its path.
///
/// The store is WAL-checkpointed first; that acquires the writer lock, so
/// the copied database file is a consistent snapshot even with the service
/// running.
pub fn create_backup(paths: &StorePaths, db: &Database) -> Result<PathBuf> {
    paths.ensure_dirs()?;
    db.checkpoint()?;

    let name = format!(
        "{}{}{}",
        ARCHIVE_PREFIX,
        Utc::now().format("%Y%m%d_%H%M%S"),
        ARCHIVE_SUFFIX
    );
    let archive_path = paths.store_dir().join(&name);

    let file = File::create(&archive_path)?;
    let mut zip = ZipWriter::new(file);

    for entry_name in [DB_FILE, NOTES_FILE, TASKS_FILE] {
        let source = paths.store_dir().join(entry_name);
        if source.exists() {
            add_file(&mut zip, &source, entry_name)?;
        }
    }

    let attachments = paths.attachments_dir();
    if attachments.is_dir() {
        for entry in WalkDir::new(&attachments) {
            let entry = entry.map_err(|e| Error::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(paths.store_dir())
                .expect("walked path is under the store dir");
            add_file(&mut zip, entry.path(), &relative.to_string_lossy())?;
        }
    }

    zip.finish()?;
    tracing::info!("created backup {}", name);
    Ok(archive_path)
}

fn add_file(zip: &mut ZipWriter<File>, source: &Path, entry_name: &str) -> Result<()> {
    zip.start_file(entry_name, SimpleFileOptions::default())?;
    let mut reader = File::open(source)?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    zip.write_all(&buf)?;
    Ok(())
}

/// List archives newest-first. Sorting is by file name, which the naming
/// scheme makes equivalent to sorting by creation time.
pub fn list_backups(paths: &StorePaths, limit: usize) -> Result<Vec<ArchiveMeta>> {
    let mut names: Vec<String> = Vec::new();
    let dir = match std::fs::read_dir(paths.store_dir()) {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    for entry in dir {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX) {
            names.push(name);
        }
    }
    names.sort();
    names.reverse();
    names.truncate(limit);

    let now = Utc::now();
    let mut backups = Vec::with_capacity(names.len());
    for name in names {
        let path = paths.store_dir().join(&name);
        let meta = std::fs::metadata(&path)?;
        let modified: DateTime<Utc> = meta.modified()?.into();
        backups.push(ArchiveMeta {
            age: age_label(now - modified),
            file_name: name,
            size_bytes: meta.len(),
            modified,
            path,
        });
    }
    Ok(backups)
}

/// Archives modified within the last `days`, newest-first. The continuity
/// policy reports these after a long gap.
pub fn recent_backups(paths: &StorePaths, days: i64) -> Result<Vec<ArchiveMeta>> {
    let cutoff = Utc::now() - Duration::days(days);
    let backups = list_backups(paths, usize::MAX)?;
    Ok(backups.into_iter().filter(|b| b.modified > cutoff).collect())
}

fn age_label(age: Duration) -> String {
    if age.num_hours() < 1 {
        format!("{} minutes", age.num_minutes().max(0))
    } else if age.num_days() < 1 {
        format!("{} hours", age.num_hours())
    } else {
        format!("{} days", age.num_days())
    }
}

/// Restore an archive into the live store directory, overwriting current
/// files. With no archive named, the most recent one is used.
///
/// Extraction is staged: the archive is unpacked next to the live files,
/// validated, and only then swapped in. A missing or corrupt archive leaves
/// the live files untouched. Any instance serving this store must be
/// stopped before calling.
pub fn restore_backup(paths: &StorePaths, archive: Option<&Path>) -> Result<PathBuf> {
    let archive_path = match archive {
        Some(p) if p.exists() => p.to_path_buf(),
        Some(p) => {
            // Bare archive names resolve against the store directory
            let in_store = paths.store_dir().join(p);
            if !in_store.exists() {
                return Err(Error::RestoreFailed(format!(
                    "archive {} does not exist",
                    p.display()
                )));
            }
            in_store
        }
        None => list_backups(paths, 1)?
            .pop()
            .map(|m| m.path)
            .ok_or_else(|| Error::RestoreFailed("no backup archives found".into()))?,
    };

    let staging = paths.store_dir().join(STAGING_DIR);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let result = extract_and_validate(&archive_path, &staging);
    if let Err(e) = result {
        // Live files have not been touched yet; just drop the staging area.
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    // Validation passed: swap staged files over the live ones.
    swap_in(&staging, paths.store_dir())?;
    std::fs::remove_dir_all(&staging)?;

    tracing::info!("restored {}", archive_path.display());
    Ok(archive_path)
}

fn extract_and_validate(archive_path: &Path, staging: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| Error::RestoreFailed(format!("cannot open archive: {}", e)))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| Error::RestoreFailed(format!("cannot read archive: {}", e)))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::RestoreFailed(format!("corrupt archive entry: {}", e)))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::RestoreFailed(format!(
                "archive entry {} escapes the extraction directory",
                entry.name()
            )));
        };
        let target = staging.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| Error::RestoreFailed(format!("extraction failed: {}", e)))?;
    }

    if !staging.join(DB_FILE).exists() {
        return Err(Error::RestoreFailed(format!(
            "archive does not contain {}",
            DB_FILE
        )));
    }

    Ok(())
}

fn swap_in(staging: &Path, live: &Path) -> Result<()> {
    for entry in WalkDir::new(staging) {
        let entry = entry.map_err(|e| Error::Io(io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(staging)
            .expect("walked path is under staging");
        let target = live.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Stale WAL/SHM sidecars must not outlive a replaced database file
        if relative == Path::new(DB_FILE) {
            for suffix in ["-wal", "-shm"] {
                let _ = std::fs::remove_file(live.join(format!("{}{}", DB_FILE, suffix)));
            }
        }
        std::fs::rename(entry.path(), &target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_label_buckets() {
        assert_eq!(age_label(Duration::minutes(5)), "5 minutes");
        assert_eq!(age_label(Duration::minutes(59)), "59 minutes");
        assert_eq!(age_label(Duration::hours(3)), "3 hours");
        assert_eq!(age_label(Duration::hours(23)), "23 hours");
        assert_eq!(age_label(Duration::days(2)), "2 days");
    }

    #[test]
    fn archive_names_sort_by_recency() {
        let mut names = vec![
            "backup_20251103_031440.zip".to_string(),
            "backup_20251231_235959.zip".to_string(),
            "backup_20251103_031439.zip".to_string(),
        ];
        names.sort();
        names.reverse();
        assert_eq!(names[0], "backup_20251231_235959.zip");
        assert_eq!(names[2], "backup_20251103_031439.zip");
    }
}
