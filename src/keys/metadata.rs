// Strongbox — Key Metadata Store
//
// Persists the non-secret parameters needed to re-derive the database key
// on a later run: derivation method, salt, KDF, and the enablement flag.
// The salt is meaningless without the password, so it is stored in
// cleartext; the derived key itself never appears in this record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::derivation::KdfAlgorithm;
use super::material::Salt;
use crate::config::{read_json, write_json_atomic};

/// Version of the metadata record layout.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// How the database key is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DerivationMethod {
    Password,
    HardwareToken,
}

impl std::fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DerivationMethod::Password => f.write_str("password"),
            DerivationMethod::HardwareToken => f.write_str("hardwareToken"),
        }
    }
}

/// The sidecar record. `salt` is hex-encoded on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    pub derivation_method: DerivationMethod,
    pub salt: String,
    pub encryption_enabled: bool,
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub kdf: KdfAlgorithm,
}

impl KeyMetadata {
    /// Record for a password-derived key.
    pub fn for_password(salt: &Salt, kdf: KdfAlgorithm) -> Self {
        Self {
            derivation_method: DerivationMethod::Password,
            salt: salt.to_hex(),
            encryption_enabled: true,
            schema_version: METADATA_SCHEMA_VERSION,
            timestamp: Utc::now(),
            kdf,
        }
    }

    /// Record for a token-derived key. No salt is involved.
    pub fn for_hardware_token() -> Self {
        Self {
            derivation_method: DerivationMethod::HardwareToken,
            salt: String::new(),
            encryption_enabled: true,
            schema_version: METADATA_SCHEMA_VERSION,
            timestamp: Utc::now(),
            kdf: KdfAlgorithm::default(),
        }
    }

    /// Decode the stored salt. `None` for token records.
    pub fn salt(&self) -> Result<Option<Salt>, super::KeyError> {
        if self.salt.is_empty() {
            return Ok(None);
        }
        Salt::from_hex(&self.salt).map(Some)
    }
}

/// Reads and writes `key-metadata.json`.
#[derive(Debug, Clone)]
pub struct KeyMetadataStore {
    path: PathBuf,
}

impl KeyMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the record, replacing any previous one (password rotation).
    pub fn save(&self, metadata: &KeyMetadata) -> std::io::Result<()> {
        write_json_atomic(&self.path, metadata)?;
        tracing::info!(
            path = %self.path.display(),
            method = %metadata.derivation_method,
            "Key metadata saved"
        );
        Ok(())
    }

    /// Load the record. Absence is the normal first-run state and yields
    /// `None`; an unreadable or unparsable file also yields `None`.
    pub fn load(&self) -> Option<KeyMetadata> {
        match read_json::<KeyMetadata>(&self.path) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Key metadata unreadable, treating as absent"
                );
                None
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyMetadataStore::new(dir.path().join("key-metadata.json"));
        assert!(store.load().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyMetadataStore::new(dir.path().join("cfg").join("key-metadata.json"));
        let salt = Salt::from_bytes(vec![0xaa; 32]);
        let record = KeyMetadata::for_password(&salt, KdfAlgorithm::Pbkdf2Sha256);

        store.save(&record).unwrap();
        let loaded = store.load().expect("record should load");

        assert_eq!(loaded, record);
        assert_eq!(loaded.salt().unwrap(), Some(salt));
    }

    #[test]
    fn test_save_overwrites_for_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyMetadataStore::new(dir.path().join("key-metadata.json"));

        store
            .save(&KeyMetadata::for_password(&Salt::from_bytes(vec![1; 32]), KdfAlgorithm::default()))
            .unwrap();
        let rotated = Salt::from_bytes(vec![2; 32]);
        store
            .save(&KeyMetadata::for_password(&rotated, KdfAlgorithm::default()))
            .unwrap();

        assert_eq!(store.load().unwrap().salt().unwrap(), Some(rotated));
    }

    #[test]
    fn test_corrupt_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key-metadata.json");
        std::fs::write(&path, "not json at all").unwrap();

        assert!(KeyMetadataStore::new(&path).load().is_none());
    }

    #[test]
    fn test_record_shape_on_disk() {
        let record = KeyMetadata::for_password(&Salt::from_bytes(vec![0x0f; 2]), KdfAlgorithm::default());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["derivationMethod"], "password");
        assert_eq!(json["salt"], "0f0f");
        assert_eq!(json["encryptionEnabled"], true);
        assert_eq!(json["schemaVersion"], 1);
        assert!(json.get("timestamp").is_some());
        assert!(json.get("key").is_none(), "The derived key must never be persisted");
    }

    #[test]
    fn test_token_record_has_no_salt() {
        let record = KeyMetadata::for_hardware_token();
        assert_eq!(record.salt().unwrap(), None);
        assert_eq!(record.derivation_method, DerivationMethod::HardwareToken);
    }
}
