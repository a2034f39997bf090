// Strongbox — Encryption feature flags
//
// Contents of `encryption-config.json`. Nothing in here is secret; the
// password and the derived key never touch this file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::fs::{read_json, write_json_atomic};
use crate::keys::{DerivationMethod, KdfAlgorithm};

/// Environment variable that overrides `developmentMode`.
pub const DEVELOPMENT_ENV_VAR: &str = "STRONGBOX_DEVELOPMENT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    pub enabled: bool,
    pub method: DerivationMethod,
    pub first_time_setup: bool,
    pub development_mode: bool,
    #[serde(default)]
    pub kdf: KdfAlgorithm,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: DerivationMethod::Password,
            first_time_setup: true,
            development_mode: false,
            kdf: KdfAlgorithm::default(),
        }
    }
}

impl EncryptionConfig {
    /// Load the config, falling back to defaults when the file is missing.
    /// A malformed file is an error: silently resetting `enabled` to a
    /// default could change which engine is selected.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match read_json::<Self>(path)? {
            Some(config) => Ok(config),
            None => {
                tracing::debug!(path = %path.display(), "No encryption config, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        write_json_atomic(path, self)
    }

    /// Apply `STRONGBOX_DEVELOPMENT` if it is set to a recognised value.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(DEVELOPMENT_ENV_VAR) {
            match parse_flag(&raw) {
                Some(flag) => self.development_mode = flag,
                None => tracing::warn!(
                    value = %raw,
                    "Ignoring unrecognised {} value",
                    DEVELOPMENT_ENV_VAR
                ),
            }
        }
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
