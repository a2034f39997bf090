// Strongbox — Migration error types

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Why verification rejected the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    RowCount {
        table: String,
        source_rows: i64,
        target_rows: i64,
    },
    Integrity(String),
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationFailure::RowCount {
                table,
                source_rows,
                target_rows,
            } => write!(
                f,
                "table {} has {} rows in source but {} in target",
                table, source_rows, target_rows
            ),
            VerificationFailure::Integrity(verdict) => {
                write!(f, "integrity check reported: {}", verdict)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Verification failed: {0}")]
    VerificationFailed(VerificationFailure),

    #[error("Superseded file already exists: {}", .0.display())]
    SupersededExists(PathBuf),

    #[error("Migration already completed, rollback is no longer possible")]
    RollbackUnavailable,
}

impl From<rusqlite::Error> for MigrationError {
    fn from(e: rusqlite::Error) -> Self {
        MigrationError::Store(StoreError::Database(e))
    }
}
