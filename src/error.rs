// Strongbox — Top-level error types
//
// Aggregates errors from the keys, store, and migrate modules into a single
// error enum for the adapter and CLI boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Strongbox operations.
#[derive(Debug, Error)]
pub enum StrongboxError {
    #[error("Key error: {0}")]
    Key(#[from] crate::keys::KeyError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// The original plaintext file is intact; `backup` names the copy taken
    /// before the run, for manual recovery.
    #[error("migration failed, original data preserved (backup: {})", backup_display(.backup))]
    Migration {
        backup: Option<PathBuf>,
        #[source]
        source: crate::migrate::MigrationError,
    },

    /// The old password did not open the store during a password change.
    #[error("authentication failed")]
    WrongPassword,

    #[error("The open storage engine does not support rekeying")]
    RekeyUnsupported,

    #[error("Encrypted store exists but its key metadata is missing: {}", .0.display())]
    MissingKeyMetadata(PathBuf),

    #[error("Found a partially migrated store, remove {} and retry", .0.display())]
    PartialMigration(PathBuf),

    #[error("Store is not initialized")]
    NotReady,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn backup_display(backup: &Option<PathBuf>) -> String {
    match backup {
        Some(path) => path.display().to_string(),
        None => "none".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, StrongboxError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyError;
    use crate::migrate::MigrationError;
    use crate::store::StoreError;

    #[test]
    fn test_auth_failures_are_generic() {
        assert_eq!(StrongboxError::WrongPassword.to_string(), "authentication failed");
        assert!(StrongboxError::from(StoreError::BadKey)
            .to_string()
            .ends_with("authentication failed"));
        assert!(StrongboxError::from(KeyError::TokenAuthFailed)
            .to_string()
            .ends_with("authentication failed"));
    }

    #[test]
    fn test_migration_error_names_backup() {
        let err = StrongboxError::Migration {
            backup: Some(PathBuf::from("/data/app.db.backup.1")),
            source: MigrationError::RollbackUnavailable,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("migration failed, original data preserved"));
        assert!(msg.contains("/data/app.db.backup.1"));
    }
}
