// Strongbox — Key Derivation
//
// Turns a password or a hardware-token secret into a 32-byte database key.
// Both paths are deterministic: the same password and salt (or the same
// token and PIN) always produce the same key, which is what lets an
// encrypted store be reopened without ever persisting the key.
//
// Password path: PBKDF2-HMAC-SHA256 (default) or Argon2id, salted.
// Token path:    SHA-256(token.encrypt(domain-separation document)).

use argon2::{Algorithm, Argon2, Params, Version};
use hmac::Hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::material::{DatabaseKey, Salt, KEY_LEN};
use super::token::HardwareToken;
use super::KeyError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default PBKDF2 iteration count. Also the minimum `KdfParams` accepts.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

// Argon2id parameters, same shape as the interactive desktop profile:
// m=65536 (64 MiB), t=3, p=1.
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 1;

/// Fixed purpose string fed through the hardware token.
pub const TOKEN_PURPOSE: &str = "database-encryption";

/// Version of the token domain-separation document.
pub const TOKEN_DOMAIN_VERSION: u32 = 1;

// ─── Parameters ──────────────────────────────────────────────────────────────

/// Password key-derivation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    #[default]
    Pbkdf2Sha256,
    Argon2id,
}

impl std::fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KdfAlgorithm::Pbkdf2Sha256 => f.write_str("pbkdf2-sha256"),
            KdfAlgorithm::Argon2id => f.write_str("argon2id"),
        }
    }
}

/// Tuning for the password path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    pub pbkdf2_iterations: u32,
}

impl KdfParams {
    pub fn new(algorithm: KdfAlgorithm) -> Self {
        Self {
            algorithm,
            pbkdf2_iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Override the PBKDF2 iteration count. Values below the floor are rejected.
    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Result<Self, KeyError> {
        if iterations < PBKDF2_ITERATIONS {
            return Err(KeyError::InvalidInput(format!(
                "PBKDF2 iterations must be at least {}",
                PBKDF2_ITERATIONS
            )));
        }
        self.pbkdf2_iterations = iterations;
        Ok(self)
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(KdfAlgorithm::default())
    }
}

/// Result of a password derivation: the key plus the salt it was derived with.
#[derive(Debug, Clone)]
pub struct PasswordKey {
    pub key: DatabaseKey,
    pub salt: Salt,
}

/// The JSON document the token signs. Field order is fixed by the struct.
#[derive(Serialize)]
struct TokenDomain<'a> {
    purpose: &'a str,
    version: u32,
}

// ─── Password path ───────────────────────────────────────────────────────────

/// Derive a database key from a password.
///
/// When `salt` is `None` a fresh random 32-byte salt is generated; pass the
/// stored salt to re-derive the key of an existing store.
pub fn derive_from_password(
    password: &str,
    salt: Option<&Salt>,
    params: &KdfParams,
) -> Result<PasswordKey, KeyError> {
    if password.is_empty() {
        return Err(KeyError::InvalidInput("password must not be empty".to_string()));
    }

    let salt = match salt {
        Some(s) if s.is_empty() => {
            return Err(KeyError::InvalidInput("salt must not be empty".to_string()))
        }
        Some(s) => s.clone(),
        None => Salt::generate(),
    };

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    match params.algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => {
            pbkdf2::pbkdf2::<Hmac<Sha256>>(
                password.as_bytes(),
                salt.as_bytes(),
                params.pbkdf2_iterations,
                &mut output[..],
            )
            .map_err(|e| KeyError::Derivation(format!("PBKDF2-HMAC-SHA256 failed: {}", e)))?;
        }
        KdfAlgorithm::Argon2id => {
            let argon_params =
                Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
                    .map_err(|e| KeyError::Derivation(format!("invalid Argon2 params: {}", e)))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params)
                .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut output[..])
                .map_err(|e| KeyError::Derivation(format!("Argon2id hash failed: {}", e)))?;
        }
    }

    tracing::debug!(kdf = %params.algorithm, "Derived database key from password");

    Ok(PasswordKey {
        key: DatabaseKey::from_bytes(*output),
        salt,
    })
}

/// Same as [`derive_from_password`], run on the blocking thread pool so an
/// async caller is not stalled for the duration of the KDF.
pub async fn derive_from_password_async(
    password: Zeroizing<String>,
    salt: Option<Salt>,
    params: KdfParams,
) -> Result<PasswordKey, KeyError> {
    tokio::task::spawn_blocking(move || derive_from_password(&password, salt.as_ref(), &params))
        .await
        .map_err(|e| KeyError::Task(e.to_string()))?
}

// ─── Hardware token path ─────────────────────────────────────────────────────

/// Derive a database key through a hardware token.
///
/// Unlocks the token with `pin`, feeds the fixed domain-separation document
/// through its encrypt/sign primitive, and hashes the output with SHA-256.
pub fn derive_from_hardware_token(
    token: &dyn HardwareToken,
    pin: &str,
) -> Result<DatabaseKey, KeyError> {
    if !token.is_present() {
        return Err(KeyError::TokenUnavailable);
    }
    if pin.is_empty() {
        return Err(KeyError::InvalidInput("PIN must not be empty".to_string()));
    }

    token.unlock(pin)?;

    let domain = serde_json::to_vec(&TokenDomain {
        purpose: TOKEN_PURPOSE,
        version: TOKEN_DOMAIN_VERSION,
    })
    .map_err(|e| KeyError::Derivation(format!("domain document: {}", e)))?;

    let signed = Zeroizing::new(token.encrypt(&domain)?);
    let digest = Sha256::digest(signed.as_slice());

    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    bytes.copy_from_slice(&digest);

    tracing::debug!("Derived database key from hardware token");
    Ok(DatabaseKey::from_bytes(*bytes))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
