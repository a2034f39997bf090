// Strongbox — Key Derivation Service
//
// Everything that produces, holds, or describes the database key:
//   - `material`:   the zeroizing key and salt types
//   - `derivation`: password (PBKDF2 / Argon2id) and hardware-token KDFs
//   - `token`:      the hardware token contract plus a software stand-in
//   - `manager`:    cache-then-token-then-password key acquisition
//   - `metadata`:   the `key-metadata.json` sidecar

pub mod derivation;
pub mod error;
pub mod manager;
pub mod material;
pub mod metadata;
pub mod token;

pub use derivation::{
    derive_from_hardware_token, derive_from_password, derive_from_password_async, KdfAlgorithm,
    KdfParams, PasswordKey, PBKDF2_ITERATIONS,
};
pub use error::KeyError;
pub use manager::{derive_with_metadata, CredentialSource, DerivedKey, KeyManager, KeyRequest};
pub use material::{DatabaseKey, Salt, KEY_LEN, SALT_LEN};
pub use metadata::{DerivationMethod, KeyMetadata, KeyMetadataStore, METADATA_SCHEMA_VERSION};
pub use token::{HardwareToken, NoHardwareToken, SoftwareToken};
