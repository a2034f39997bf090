// Strongbox — Encrypted Engine
//
// SQLCipher-backed file. Every open applies the key as a raw 32-byte hex
// key, pins the cipher settings, and probes `sqlite_master`. A failed probe
// means the key is wrong (or the file is not encrypted with it), and the
// connection is dropped rather than kept half-open.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use zeroize::Zeroizing;

use super::engine::{close_connection, open_connection, EngineKind, Rekeyable, StorageEngine};
use super::StoreError;
use crate::keys::DatabaseKey;

/// Cipher settings applied after the key on every open. Fixed so files
/// written by one build can be read by another.
const CIPHER_SETTINGS: &str = "
    PRAGMA cipher_page_size = 4096;
    PRAGMA kdf_iter = 256000;
    PRAGMA cipher_hmac_algorithm = HMAC_SHA512;
    PRAGMA cipher_kdf_algorithm = PBKDF2_HMAC_SHA512;
";

/// Alias used while exporting a decrypted copy.
const EXPORT_SCHEMA: &str = "plaintext";

pub struct EncryptedEngine {
    path: PathBuf,
    key: DatabaseKey,
    read_only: bool,
    conn: Option<Connection>,
}

impl EncryptedEngine {
    pub fn new(path: impl Into<PathBuf>, key: DatabaseKey) -> Self {
        Self::with_mode(path, key, false)
    }

    pub fn read_only(path: impl Into<PathBuf>, key: DatabaseKey) -> Self {
        Self::with_mode(path, key, true)
    }

    fn with_mode(path: impl Into<PathBuf>, key: DatabaseKey, read_only: bool) -> Self {
        Self {
            path: path.into(),
            key,
            read_only,
            conn: None,
        }
    }
}

/// Key the connection, pin the cipher settings, then probe the catalog.
fn apply_key(conn: &Connection, key: &DatabaseKey) -> Result<(), StoreError> {
    let key_hex = key.to_hex();
    let pragma = Zeroizing::new(format!("PRAGMA key = \"x'{}'\";", key_hex.as_str()));
    conn.execute_batch(&pragma)?;
    conn.execute_batch(CIPHER_SETTINGS)?;

    conn.query_row("SELECT count(*) FROM sqlite_master;", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|_| StoreError::BadKey)?;
    Ok(())
}

impl StorageEngine for EncryptedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Encrypted
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<(), StoreError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn = open_connection(&self.path, self.read_only)?;
        if let Err(e) = apply_key(&conn, &self.key) {
            tracing::warn!(path = %self.path.display(), "Encrypted database rejected the key");
            drop(conn);
            return Err(e);
        }

        tracing::debug!(path = %self.path.display(), read_only = self.read_only, "Opened encrypted database");
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
                tracing::debug!(path = %self.path.display(), "Closed encrypted database");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn as_rekeyable(&mut self) -> Option<&mut dyn Rekeyable> {
        Some(self)
    }
}

impl Rekeyable for EncryptedEngine {
    fn rekey(&mut self, new_key: &DatabaseKey) -> Result<(), StoreError> {
        let conn = self.conn.as_ref().ok_or(StoreError::NotOpen)?;
        let key_hex = new_key.to_hex();
        let pragma = Zeroizing::new(format!("PRAGMA rekey = \"x'{}'\";", key_hex.as_str()));
        conn.execute_batch(&pragma)?;

        self.key = new_key.clone();
        tracing::info!(path = %self.path.display(), "Encrypted database rekeyed");
        Ok(())
    }

    fn remove_encryption(&self, target: &Path) -> Result<(), StoreError> {
        let conn = self.conn.as_ref().ok_or(StoreError::NotOpen)?;
        if target.exists() {
            return Err(StoreError::TargetExists(target.to_path_buf()));
        }

        let target_str = target.to_string_lossy();
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {} KEY '';", EXPORT_SCHEMA),
            [&*target_str],
        )?;

        let exported = conn.query_row(
            &format!("SELECT sqlcipher_export('{}');", EXPORT_SCHEMA),
            [],
            |_| Ok(()),
        );
        let detached = conn.execute_batch(&format!("DETACH DATABASE {};", EXPORT_SCHEMA));

        if let Err(e) = exported.and(detached) {
            let _ = std::fs::remove_file(target);
            return Err(e.into());
        }

        tracing::info!(
            source = %self.path.display(),
            target = %target.display(),
            "Exported decrypted copy"
        );
        Ok(())
    }
}

impl Drop for EncryptedEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlaintextEngine;

    fn key(byte: u8) -> DatabaseKey {
        DatabaseKey::from_bytes([byte; 32])
    }

    fn seed(path: &Path, k: DatabaseKey) {
        let mut engine = EncryptedEngine::new(path, k);
        engine.open().unwrap();
        engine
            .exec("CREATE TABLE t (id INTEGER PRIMARY KEY, value TEXT); INSERT INTO t VALUES (1, 'hello');")
            .unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn test_roundtrip_with_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        seed(&path, key(7));

        let mut engine = EncryptedEngine::new(&path, key(7));
        engine.open().unwrap();
        let row = engine
            .prepare("SELECT value FROM t WHERE id = ?1")
            .unwrap()
            .get(&[1i64.into()])
            .unwrap()
            .expect("row should exist");
        assert_eq!(row.get_str("value"), Some("hello"));
    }

    #[test]
    fn test_wrong_key_is_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        seed(&path, key(7));

        let mut engine = EncryptedEngine::new(&path, key(8));
        assert!(matches!(engine.open(), Err(StoreError::BadKey)));
        assert!(!engine.is_open(), "A rejected key must not leave a half-open handle");
    }

    #[test]
    fn test_read_only_reads_but_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        seed(&path, key(7));

        let mut reader = EncryptedEngine::read_only(&path, key(7));
        reader.open().unwrap();
        let rows = reader.prepare("SELECT value FROM t").unwrap().all(&[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(reader.exec("INSERT INTO t VALUES (2, 'nope');").is_err());

        let mut wrong = EncryptedEngine::read_only(&path, key(8));
        assert!(matches!(wrong.open(), Err(StoreError::BadKey)));
    }

    #[test]
    fn test_plaintext_file_with_key_is_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let mut plain = PlaintextEngine::new(&path);
            plain.open().unwrap();
            plain.exec("CREATE TABLE t (id INTEGER);").unwrap();
        }

        let mut engine = EncryptedEngine::new(&path, key(1));
        assert!(matches!(engine.open(), Err(StoreError::BadKey)));
    }

    #[test]
    fn test_file_on_disk_is_not_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        seed(&path, key(3));

        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.starts_with(b"SQLite format 3"));
        assert!(!bytes.windows(5).any(|w| w == b"hello"));
    }

    #[test]
    fn test_rekey_switches_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        seed(&path, key(1));

        {
            let mut engine = EncryptedEngine::new(&path, key(1));
            engine.open().unwrap();
            engine.as_rekeyable().unwrap().rekey(&key(2)).unwrap();
            engine.close().unwrap();
        }

        assert!(matches!(
            EncryptedEngine::new(&path, key(1)).open(),
            Err(StoreError::BadKey)
        ));
        let mut engine = EncryptedEngine::new(&path, key(2));
        engine.open().unwrap();
        assert_eq!(engine.prepare("SELECT * FROM t").unwrap().all(&[]).unwrap().len(), 1);
    }

    #[test]
    fn test_rekey_requires_open_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = EncryptedEngine::new(dir.path().join("x.db"), key(1));
        let rekey = engine.as_rekeyable().unwrap();
        assert!(matches!(rekey.rekey(&key(2)), Err(StoreError::NotOpen)));
    }

    #[test]
    fn test_remove_encryption_exports_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        let target = dir.path().join("export.db");
        seed(&path, key(5));

        let mut engine = EncryptedEngine::new(&path, key(5));
        engine.open().unwrap();
        engine.as_rekeyable().unwrap().remove_encryption(&target).unwrap();

        let mut plain = PlaintextEngine::read_only(&target);
        plain.open().unwrap();
        let rows = plain.prepare("SELECT value FROM t").unwrap().all(&[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("value"), Some("hello"));
    }

    #[test]
    fn test_remove_encryption_refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.encrypted.db");
        let target = dir.path().join("export.db");
        seed(&path, key(5));
        std::fs::write(&target, b"keep me").unwrap();

        let mut engine = EncryptedEngine::new(&path, key(5));
        engine.open().unwrap();
        let err = engine.as_rekeyable().unwrap().remove_encryption(&target).unwrap_err();
        assert!(matches!(err, StoreError::TargetExists(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"keep me");
    }
}
