use thiserror::Error;

/// Domain errors surfaced by the store, backup, and project components.
///
/// The API layer maps these onto HTTP status classes; the CLI prints them.
/// I/O and database failures are surfaced unchanged rather than retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing caller input. Never persisted.
    #[error("validation error: {0}")]
    Validation(String),

    /// An identifier or archive that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key or port collision the caller must resolve.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An archive could not be read or extracted. Live files are untouched.
    #[error("restore failed: {0}")]
    RestoreFailed(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
