// Strongbox — Plaintext Engine

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::engine::{close_connection, open_connection, EngineKind, StorageEngine};
use super::StoreError;

/// Unencrypted SQLite file.
pub struct PlaintextEngine {
    path: PathBuf,
    read_only: bool,
    conn: Option<Connection>,
}

impl PlaintextEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_mode(path, false)
    }

    /// Open without write access. The migrator reads its source this way.
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self::with_mode(path, true)
    }

    fn with_mode(path: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            path: path.into(),
            read_only,
            conn: None,
        }
    }
}

impl StorageEngine for PlaintextEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Plaintext
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = open_connection(&self.path, self.read_only)?;
        tracing::debug!(path = %self.path.display(), read_only = self.read_only, "Opened plaintext database");
        self.conn = Some(conn);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::NotOpen)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        match self.conn.take() {
            Some(conn) => {
                close_connection(conn)?;
                tracing::debug!(path = %self.path.display(), "Closed plaintext database");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for PlaintextEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
