// Strongbox — Storage Engine Abstraction
//
// One statement-based interface, two variants: `PlaintextEngine` and
// `EncryptedEngine`. Callers hold a `Box<dyn StorageEngine>` and never need
// to know which one they got. Only the encrypted variant can rekey, exposed
// through `as_rekeyable()` instead of a downcast.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use super::statement::Statement;
use super::StoreError;
use crate::keys::DatabaseKey;

/// Which variant an engine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Plaintext,
    Encrypted,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Plaintext => f.write_str("plaintext"),
            EngineKind::Encrypted => f.write_str("encrypted"),
        }
    }
}

/// Uniform storage interface over an owned database handle.
pub trait StorageEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Path of the underlying data file.
    fn path(&self) -> &Path;

    /// Open (or create) the file. Calling this on an open engine is a no-op.
    fn open(&mut self) -> Result<(), StoreError>;

    fn is_open(&self) -> bool;

    /// Borrow the live connection. Fails with `NotOpen` before `open()`.
    fn connection(&self) -> Result<&Connection, StoreError>;

    /// Flush and release the handle. Calling this on a closed engine is a no-op.
    fn close(&mut self) -> Result<(), StoreError>;

    /// Compile a parameterized statement.
    fn prepare(&self, sql: &str) -> Result<Statement<'_>, StoreError> {
        Statement::new(self.connection()?, sql)
    }

    /// Run one or more statements with no parameters and no results.
    fn exec(&self, sql: &str) -> Result<(), StoreError> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    /// `PRAGMA integrity_check`, mapped to an error unless the answer is `ok`.
    fn integrity_check(&self) -> Result<(), StoreError> {
        let verdict: String =
            self.connection()?
                .query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
        if verdict.trim() == "ok" {
            Ok(())
        } else {
            Err(StoreError::IntegrityCheck(verdict))
        }
    }

    /// Rekey capability, if this variant has one.
    fn as_rekeyable(&mut self) -> Option<&mut dyn Rekeyable> {
        None
    }
}

/// Encrypted-variant-only operations.
pub trait Rekeyable {
    /// Re-encrypt the file in place under `new_key`.
    fn rekey(&mut self, new_key: &DatabaseKey) -> Result<(), StoreError>;

    /// Write a decrypted copy of the database to `target`. `target` must not exist.
    fn remove_encryption(&self, target: &Path) -> Result<(), StoreError>;
}

// ─── Shared connection handling ──────────────────────────────────────────────

/// Open a raw connection. Writable opens create missing parent directories;
/// read-only opens never create anything.
pub(crate) fn open_connection(path: &Path, read_only: bool) -> Result<Connection, StoreError> {
    let flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenFlags::default()
    };

    Connection::open_with_flags(path, flags).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Close a connection, surfacing any error SQLite reports while flushing.
pub(crate) fn close_connection(conn: Connection) -> Result<(), StoreError> {
    conn.close().map_err(|(_, e)| StoreError::Database(e))
}
