// Strongbox — Configuration Module
//
// Filesystem layout of a store, the non-secret feature flags in
// `encryption-config.json`, and the atomic JSON sidecar helpers both the
// config and key-metadata files are written with.

mod fs;
mod paths;
mod settings;

pub use fs::{read_json, write_json_atomic};
pub use paths::{StorePaths, ENCRYPTED_INFIX};
pub use settings::{EncryptionConfig, DEVELOPMENT_ENV_VAR};
