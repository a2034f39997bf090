// Strongbox — Store error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The supplied key could not decrypt the file.
    #[error("authentication failed")]
    BadKey,

    #[error("Database is not open")]
    NotOpen,

    #[error("Statement has already been freed")]
    StatementFreed,

    #[error("Refusing to overwrite existing file: {}", .0.display())]
    TargetExists(PathBuf),

    #[error("Integrity check failed: {0}")]
    IntegrityCheck(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
