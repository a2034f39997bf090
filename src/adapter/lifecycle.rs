// Strongbox — Adapter Lifecycle
//
// Owns the single storage engine handle for one logical store and drives it
// through
//
//   Unselected → EngineDetected → [Migrating → Migrated] → Ready → Closed
//
// The adapter is an ordinary value: the application constructs one at
// startup, lends `engine()` to its callers, and calls `close()` on shutdown.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::selector::{detect_engine, Selection, SelectorInput};
use crate::config::{EncryptionConfig, StorePaths};
use crate::error::{Result, StrongboxError};
use crate::keys::{
    derive_from_password, derive_with_metadata, CredentialSource, DerivationMethod, DerivedKey,
    HardwareToken, KdfAlgorithm, KdfParams, KeyError, KeyManager, KeyMetadata, KeyMetadataStore,
    KeyRequest,
};
use crate::migrate::{MigrationReport, Migrator};
use crate::store::{
    EncryptedEngine, EngineKind, PlaintextEngine, StorageEngine, StoreError,
};

/// Password used in development mode when the caller supplies none and an
/// encrypted store already exists.
pub const DEVELOPMENT_PASSWORD: &str = "strongbox-development-only";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AdapterState {
    Unselected,
    EngineDetected,
    Migrating,
    Migrated,
    Ready,
    Closed,
}

/// Non-secret summary of the key metadata record. The salt is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSummary {
    pub derivation_method: DerivationMethod,
    pub kdf: KdfAlgorithm,
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
}

impl From<&KeyMetadata> for MetadataSummary {
    fn from(m: &KeyMetadata) -> Self {
        Self {
            derivation_method: m.derivation_method,
            kdf: m.kdf,
            schema_version: m.schema_version,
            timestamp: m.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub state: AdapterState,
    pub engine: Option<EngineKind>,
    pub selection: Option<Selection>,
    pub plaintext_exists: bool,
    pub encrypted_exists: bool,
    pub superseded_exists: bool,
    pub encryption_enabled: bool,
    pub development_mode: bool,
    pub metadata: Option<MetadataSummary>,
}

pub struct Adapter {
    paths: StorePaths,
    config: EncryptionConfig,
    keys: KeyManager,
    metadata: KeyMetadataStore,
    force_password: bool,
    state: AdapterState,
    selection: Option<Selection>,
    engine: Option<Box<dyn StorageEngine>>,
    key_record: Option<KeyMetadata>,
    last_migration: Option<MigrationReport>,
}

impl Adapter {
    pub fn new(paths: StorePaths, config: EncryptionConfig, token: Box<dyn HardwareToken>) -> Self {
        let keys = KeyManager::new(token, KdfParams::new(config.kdf));
        let metadata = KeyMetadataStore::new(paths.metadata_file());
        Self {
            paths,
            config,
            keys,
            metadata,
            force_password: false,
            state: AdapterState::Unselected,
            selection: None,
            engine: None,
            key_record: None,
            last_migration: None,
        }
    }

    /// Build an adapter from the config file under `paths`, with
    /// environment overrides applied.
    pub fn load(paths: StorePaths, token: Box<dyn HardwareToken>) -> Result<Self> {
        let config = EncryptionConfig::load(&paths.config_file())?.with_env_overrides();
        Ok(Self::new(paths, config, token))
    }

    /// Skip the hardware token even when one is present.
    pub fn with_force_password(mut self, force: bool) -> Self {
        self.force_password = force;
        self
    }

    /// Override `developmentMode` for this process only; nothing is saved.
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.config.development_mode = enabled;
        self
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn config(&self) -> &EncryptionConfig {
        &self.config
    }

    pub fn last_migration(&self) -> Option<&MigrationReport> {
        self.last_migration.as_ref()
    }

    /// The open engine. Only available once the adapter is `Ready`.
    pub fn engine(&self) -> Result<&dyn StorageEngine> {
        match (&self.engine, self.state) {
            (Some(engine), AdapterState::Ready) => Ok(engine.as_ref()),
            _ => Err(StrongboxError::NotReady),
        }
    }

    pub fn engine_mut(&mut self) -> Result<&mut dyn StorageEngine> {
        match (&mut self.engine, self.state) {
            (Some(engine), AdapterState::Ready) => Ok(engine.as_mut()),
            _ => Err(StrongboxError::NotReady),
        }
    }

    fn transition(&mut self, next: AdapterState) {
        tracing::debug!(from = ?self.state, to = ?next, "Adapter state change");
        self.state = next;
    }

    // ─── Initialization ──────────────────────────────────────────────────────

    /// Select an engine, acquire the key, migrate if owed, and open.
    /// Calling this on a `Ready` adapter is a no-op.
    pub fn initialize(&mut self, credential: CredentialSource) -> Result<()> {
        if self.state == AdapterState::Ready {
            return Ok(());
        }
        self.transition(AdapterState::Unselected);

        let encrypted_path = self.paths.encrypted_db();
        let selection = detect_engine(&SelectorInput {
            encrypted_exists: encrypted_path.exists(),
            development_mode: self.config.development_mode,
            credential_supplied: !credential.is_none(),
            encryption_enabled: self.config.enabled,
        });
        self.selection = Some(selection);
        self.transition(AdapterState::EngineDetected);

        let result = match selection.kind {
            EngineKind::Plaintext => self.open_plaintext(),
            EngineKind::Encrypted => self.open_encrypted(credential),
        };

        match result {
            Ok(engine) => {
                tracing::info!(
                    engine = %engine.kind(),
                    path = %engine.path().display(),
                    "Store ready"
                );
                self.engine = Some(engine);
                self.transition(AdapterState::Ready);
                Ok(())
            }
            Err(e) => {
                self.keys.clear();
                self.transition(AdapterState::Unselected);
                Err(e)
            }
        }
    }

    fn open_plaintext(&mut self) -> Result<Box<dyn StorageEngine>> {
        let mut engine = PlaintextEngine::new(self.paths.plaintext_db());
        engine.open()?;
        Ok(Box::new(engine))
    }

    fn open_encrypted(&mut self, credential: CredentialSource) -> Result<Box<dyn StorageEngine>> {
        let plaintext_path = self.paths.plaintext_db();
        let encrypted_path = self.paths.encrypted_db();
        let store_exists = encrypted_path.exists();

        if store_exists && plaintext_path.exists() {
            return Err(StrongboxError::PartialMigration(encrypted_path));
        }

        let credential = if credential.is_none() && self.config.development_mode {
            tracing::warn!("Development mode: using the built-in development password");
            CredentialSource::password(DEVELOPMENT_PASSWORD)
        } else {
            credential
        };

        let existing = if store_exists { self.metadata.load() } else { None };
        if store_exists && existing.is_none() && credential.is_password() {
            return Err(StrongboxError::MissingKeyMetadata(self.metadata.path().to_path_buf()));
        }

        let derived = self.keys.get_or_create_key(&KeyRequest {
            credential: &credential,
            existing: existing.as_ref(),
            store_exists,
            force_password: self.force_password,
        })?;

        // A new store gets its metadata before the file is created, so a crash
        // after creation never leaves an encrypted file with no salt on record.
        let record = match existing {
            Some(record) => record,
            None => {
                let record = derived.metadata();
                self.metadata.save(&record)?;
                record
            }
        };

        match self.migrate_and_open(&derived) {
            Ok(engine) => {
                self.key_record = Some(record);
                self.finish_first_time_setup(derived.method);
                Ok(engine)
            }
            Err(e) => {
                if !store_exists && !encrypted_path.exists() {
                    if let Err(cleanup) = std::fs::remove_file(self.metadata.path()) {
                        tracing::warn!(error = %cleanup, "Could not remove unused key metadata");
                    }
                }
                Err(e)
            }
        }
    }

    fn migrate_and_open(&mut self, derived: &DerivedKey) -> Result<Box<dyn StorageEngine>> {
        let plaintext_path = self.paths.plaintext_db();
        let encrypted_path = self.paths.encrypted_db();

        let mut migrator = Migrator::new(&plaintext_path, &encrypted_path, &derived.key);
        if migrator.needs_migration() {
            self.transition(AdapterState::Migrating);
            let outcome = migrator.run().map_err(|source| StrongboxError::Migration {
                backup: migrator.record().backup_path.clone(),
                source,
            })?;
            self.last_migration = outcome.report().cloned();
            self.transition(AdapterState::Migrated);
        }

        let mut engine = EncryptedEngine::new(&encrypted_path, derived.key.clone());
        engine.open()?;
        Ok(Box::new(engine))
    }

    fn finish_first_time_setup(&mut self, method: DerivationMethod) {
        if !self.config.first_time_setup && self.config.method == method {
            return;
        }
        self.config.first_time_setup = false;
        self.config.method = method;
        if let Err(e) = self.config.save(&self.paths.config_file()) {
            tracing::warn!(error = %e, "Could not persist encryption config");
        }
    }

    // ─── Password rotation ───────────────────────────────────────────────────

    /// Verify `old_password`, rekey the live store under `new_password`, and
    /// persist the new metadata. Either everything changes or nothing does.
    pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        let encrypted_path = {
            let engine = self.engine()?;
            if engine.kind() != EngineKind::Encrypted {
                return Err(StrongboxError::RekeyUnsupported);
            }
            engine.path().to_path_buf()
        };

        let record = self
            .key_record
            .clone()
            .ok_or_else(|| StrongboxError::MissingKeyMetadata(self.metadata.path().to_path_buf()))?;
        if record.derivation_method != DerivationMethod::Password {
            return Err(KeyError::InvalidInput(
                "store is sealed with a hardware token, not a password".to_string(),
            )
            .into());
        }

        let old_key = derive_with_metadata(old_password, &record, self.keys.params())?;
        let mut probe = EncryptedEngine::read_only(&encrypted_path, old_key.clone());
        match probe.open() {
            Ok(()) => probe.close()?,
            Err(StoreError::BadKey) => {
                tracing::warn!("Password change rejected: old password is wrong");
                return Err(StrongboxError::WrongPassword);
            }
            Err(e) => return Err(e.into()),
        }

        let params = *self.keys.params();
        let fresh = derive_from_password(new_password, None, &params)?;
        let new_record = KeyMetadata::for_password(&fresh.salt, params.algorithm);

        let engine = self.engine.as_mut().ok_or(StrongboxError::NotReady)?;
        let rekeyable = engine
            .as_rekeyable()
            .ok_or(StrongboxError::RekeyUnsupported)?;
        rekeyable.rekey(&fresh.key)?;

        if let Err(e) = self.metadata.save(&new_record) {
            tracing::error!(error = %e, "Saving key metadata failed, reverting rekey");
            if let Err(revert) = rekeyable.rekey(&old_key) {
                tracing::error!(error = %revert, "Reverting rekey failed");
            }
            return Err(e.into());
        }

        self.keys.replace_cached(DerivedKey {
            key: fresh.key,
            method: DerivationMethod::Password,
            salt: Some(fresh.salt),
            kdf: params.algorithm,
        });
        self.key_record = Some(new_record);
        tracing::info!("Database password changed");
        Ok(())
    }

    // ─── Other operations ────────────────────────────────────────────────────

    /// Write a decrypted copy of the open encrypted store to `target`.
    pub fn export_plaintext(&mut self, target: &std::path::Path) -> Result<()> {
        let engine = self.engine_mut()?;
        let rekeyable = engine
            .as_rekeyable()
            .ok_or(StrongboxError::RekeyUnsupported)?;
        rekeyable.remove_encryption(target)?;
        Ok(())
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            state: self.state,
            engine: self.engine.as_ref().map(|e| e.kind()),
            selection: self.selection,
            plaintext_exists: self.paths.plaintext_db().exists(),
            encrypted_exists: self.paths.encrypted_db().exists(),
            superseded_exists: self.paths.superseded_db().exists(),
            encryption_enabled: self.config.enabled,
            development_mode: self.config.development_mode,
            metadata: self
                .key_record
                .clone()
                .or_else(|| self.metadata.load())
                .as_ref()
                .map(MetadataSummary::from),
        }
    }

    /// Close the engine and drop the cached key. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut engine) = self.engine.take() {
            engine.close()?;
        }
        self.keys.clear();
        self.key_record = None;
        if self.state != AdapterState::Closed {
            self.transition(AdapterState::Closed);
            tracing::info!(name = %self.paths.name(), "Store closed");
        }
        Ok(())
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
