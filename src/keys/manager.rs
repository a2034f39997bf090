// Strongbox — Key Manager
//
// Orchestrates key acquisition for the adapter. Priority order:
//   1. a key already cached in memory for this store
//   2. the hardware token, unless `force_password` is set or no token is present
//   3. the password, with the stored salt when reopening, a fresh one on creation
//
// The cached key is dropped (and zeroized) by `clear()` or when the manager
// itself is dropped.

use std::fmt;

use zeroize::Zeroizing;

use super::derivation::{derive_from_hardware_token, derive_from_password, KdfAlgorithm, KdfParams};
use super::material::{DatabaseKey, Salt};
use super::metadata::{DerivationMethod, KeyMetadata};
use super::token::HardwareToken;
use super::KeyError;

/// The credential a caller supplies at initialization time.
pub enum CredentialSource {
    Password(Zeroizing<String>),
    HardwareToken { pin: Zeroizing<String> },
    None,
}

impl CredentialSource {
    pub fn password(value: &str) -> Self {
        CredentialSource::Password(Zeroizing::new(value.to_string()))
    }

    pub fn hardware_token(pin: &str) -> Self {
        CredentialSource::HardwareToken {
            pin: Zeroizing::new(pin.to_string()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CredentialSource::None)
    }

    pub fn is_password(&self) -> bool {
        matches!(self, CredentialSource::Password(_))
    }
}

/// Never prints the secret itself.
impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Password(_) => f.write_str("Password([REDACTED])"),
            CredentialSource::HardwareToken { .. } => f.write_str("HardwareToken { pin: [REDACTED] }"),
            CredentialSource::None => f.write_str("None"),
        }
    }
}

/// Inputs to [`KeyManager::get_or_create_key`].
#[derive(Debug)]
pub struct KeyRequest<'a> {
    pub credential: &'a CredentialSource,
    /// Metadata of an already-initialized encrypted store, if any.
    pub existing: Option<&'a KeyMetadata>,
    /// True when an encrypted file already exists, with or without metadata.
    pub store_exists: bool,
    pub force_password: bool,
}

impl<'a> KeyRequest<'a> {
    pub fn new(credential: &'a CredentialSource) -> Self {
        Self {
            credential,
            existing: None,
            store_exists: false,
            force_password: false,
        }
    }
}

/// A key together with what is needed to persist its metadata.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: DatabaseKey,
    pub method: DerivationMethod,
    pub salt: Option<Salt>,
    pub kdf: KdfAlgorithm,
}

impl DerivedKey {
    /// The metadata record describing how this key was derived.
    pub fn metadata(&self) -> KeyMetadata {
        match (&self.method, &self.salt) {
            (DerivationMethod::Password, Some(salt)) => KeyMetadata::for_password(salt, self.kdf),
            _ => KeyMetadata::for_hardware_token(),
        }
    }
}

/// Holds the token collaborator, KDF tuning, and the in-memory key cache.
pub struct KeyManager {
    token: Box<dyn HardwareToken>,
    params: KdfParams,
    cached: Option<DerivedKey>,
}

impl KeyManager {
    pub fn new(token: Box<dyn HardwareToken>, params: KdfParams) -> Self {
        Self {
            token,
            params,
            cached: None,
        }
    }

    pub fn token(&self) -> &dyn HardwareToken {
        self.token.as_ref()
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn cached(&self) -> Option<&DerivedKey> {
        self.cached.as_ref()
    }

    /// Replace the cached key, e.g. after a password rotation.
    pub fn replace_cached(&mut self, key: DerivedKey) {
        self.cached = Some(key);
    }

    /// Drop the cached key. `DatabaseKey` zeroizes itself on drop.
    pub fn clear(&mut self) {
        if self.cached.take().is_some() {
            tracing::debug!("Cleared cached database key");
        }
    }

    /// Return the cached key or derive one from the request's credential.
    pub fn get_or_create_key(&mut self, request: &KeyRequest<'_>) -> Result<DerivedKey, KeyError> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }

        let derived = self.derive(request)?;
        self.cached = Some(derived.clone());
        Ok(derived)
    }

    fn derive(&self, request: &KeyRequest<'_>) -> Result<DerivedKey, KeyError> {
        if let Some(existing) = request.existing {
            self.check_method_matches(existing, request)?;
        }

        match request.credential {
            CredentialSource::HardwareToken { pin } => {
                if request.force_password {
                    return Err(KeyError::MissingCredential(
                        "a password is required when force_password is set".to_string(),
                    ));
                }
                if !self.token.is_present() {
                    return Err(KeyError::TokenUnavailable);
                }
                let key = derive_from_hardware_token(self.token.as_ref(), pin)?;
                tracing::info!("Database key obtained from hardware token");
                Ok(DerivedKey {
                    key,
                    method: DerivationMethod::HardwareToken,
                    salt: None,
                    kdf: KdfAlgorithm::default(),
                })
            }
            CredentialSource::Password(password) => {
                let (salt, kdf) = match request.existing {
                    Some(existing) => (existing.salt()?, existing.kdf),
                    None => (None, self.params.algorithm),
                };

                if request.store_exists && salt.is_none() {
                    return Err(KeyError::MissingCredential(
                        "salt for the existing encrypted store".to_string(),
                    ));
                }

                let params = KdfParams {
                    algorithm: kdf,
                    ..self.params
                };
                let derived = derive_from_password(password, salt.as_ref(), &params)?;
                tracing::info!(kdf = %kdf, "Database key obtained from password");
                Ok(DerivedKey {
                    key: derived.key,
                    method: DerivationMethod::Password,
                    salt: Some(derived.salt),
                    kdf,
                })
            }
            CredentialSource::None => Err(KeyError::MissingCredential(
                "neither a password nor a hardware token PIN was supplied".to_string(),
            )),
        }
    }

    fn check_method_matches(
        &self,
        existing: &KeyMetadata,
        request: &KeyRequest<'_>,
    ) -> Result<(), KeyError> {
        let requested = match request.credential {
            CredentialSource::Password(_) => DerivationMethod::Password,
            CredentialSource::HardwareToken { .. } => DerivationMethod::HardwareToken,
            CredentialSource::None => return Ok(()),
        };

        if requested != existing.derivation_method {
            return Err(KeyError::InvalidInput(format!(
                "store was sealed with {} but {} was supplied",
                existing.derivation_method, requested
            )));
        }
        Ok(())
    }
}

/// Derive a key for a one-off check without touching any cache.
pub fn derive_with_metadata(
    password: &str,
    metadata: &KeyMetadata,
    params: &KdfParams,
) -> Result<DatabaseKey, KeyError> {
    let salt = metadata.salt()?.ok_or_else(|| {
        KeyError::MissingCredential("salt for the existing encrypted store".to_string())
    })?;
    let params = KdfParams {
        algorithm: metadata.kdf,
        ..*params
    };
    Ok(derive_from_password(password, Some(&salt), &params)?.key)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::token::{NoHardwareToken, SoftwareToken};

    fn manager_without_token() -> KeyManager {
        KeyManager::new(Box::new(NoHardwareToken), KdfParams::default())
    }

    fn manager_with_token() -> KeyManager {
        KeyManager::new(
            Box::new(SoftwareToken::new("2468", b"device")),
            KdfParams::default(),
        )
    }

    #[test]
    fn test_missing_credential() {
        let mut manager = manager_without_token();
        let none = CredentialSource::None;
        let err = manager.get_or_create_key(&KeyRequest::new(&none)).unwrap_err();
        assert!(matches!(err, KeyError::MissingCredential(_)));
    }

    #[test]
    fn test_first_creation_generates_salt() {
        let mut manager = manager_without_token();
        let pw = CredentialSource::password("hunter22");
        let key = manager.get_or_create_key(&KeyRequest::new(&pw)).unwrap();

        assert_eq!(key.method, DerivationMethod::Password);
        assert!(key.salt.is_some());
        assert_eq!(key.metadata().derivation_method, DerivationMethod::Password);
    }

    #[test]
    fn test_cached_key_is_returned() {
        let mut manager = manager_without_token();
        let pw = CredentialSource::password("hunter22");
        let first = manager.get_or_create_key(&KeyRequest::new(&pw)).unwrap();

        // Second call without any credential still succeeds from cache.
        let none = CredentialSource::None;
        let second = manager.get_or_create_key(&KeyRequest::new(&none)).unwrap();
        assert_eq!(first.key, second.key);

        manager.clear();
        assert!(manager.cached().is_none());
        assert!(manager.get_or_create_key(&KeyRequest::new(&none)).is_err());
    }

    #[test]
    fn test_reopen_uses_stored_salt() {
        let mut creator = manager_without_token();
        let pw = CredentialSource::password("hunter22");
        let created = creator.get_or_create_key(&KeyRequest::new(&pw)).unwrap();
        let metadata = created.metadata();

        let mut reopener = manager_without_token();
        let request = KeyRequest {
            existing: Some(&metadata),
            store_exists: true,
            ..KeyRequest::new(&pw)
        };
        let reopened = reopener.get_or_create_key(&request).unwrap();
        assert_eq!(created.key, reopened.key);
    }

    #[test]
    fn test_reopen_without_salt_is_rejected() {
        let mut manager = manager_without_token();
        let pw = CredentialSource::password("hunter22");
        let request = KeyRequest {
            store_exists: true,
            ..KeyRequest::new(&pw)
        };
        let err = manager.get_or_create_key(&request).unwrap_err();
        assert!(matches!(err, KeyError::MissingCredential(_)));
    }

    #[test]
    fn test_token_path_when_present() {
        let mut manager = manager_with_token();
        let pin = CredentialSource::hardware_token("2468");
        let key = manager.get_or_create_key(&KeyRequest::new(&pin)).unwrap();
        assert_eq!(key.method, DerivationMethod::HardwareToken);
        assert!(key.salt.is_none());
    }

    #[test]
    fn test_token_path_without_token_is_unavailable() {
        let mut manager = manager_without_token();
        let pin = CredentialSource::hardware_token("2468");
        let err = manager.get_or_create_key(&KeyRequest::new(&pin)).unwrap_err();
        assert!(matches!(err, KeyError::TokenUnavailable));
    }

    #[test]
    fn test_force_password_skips_token() {
        let mut manager = manager_with_token();
        let pin = CredentialSource::hardware_token("2468");
        let request = KeyRequest {
            force_password: true,
            ..KeyRequest::new(&pin)
        };
        assert!(matches!(
            manager.get_or_create_key(&request),
            Err(KeyError::MissingCredential(_))
        ));

        let pw = CredentialSource::password("hunter22");
        let request = KeyRequest {
            force_password: true,
            ..KeyRequest::new(&pw)
        };
        let key = manager.get_or_create_key(&request).unwrap();
        assert_eq!(key.method, DerivationMethod::Password);
    }

    #[test]
    fn test_method_mismatch_is_rejected() {
        let mut manager = manager_with_token();
        let metadata = KeyMetadata::for_hardware_token();
        let pw = CredentialSource::password("hunter22");
        let request = KeyRequest {
            existing: Some(&metadata),
            store_exists: true,
            ..KeyRequest::new(&pw)
        };
        assert!(matches!(
            manager.get_or_create_key(&request),
            Err(KeyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reopen_honours_recorded_kdf() {
        let argon = KdfParams::new(KdfAlgorithm::Argon2id);
        let created = derive_from_password("pw", None, &argon).unwrap();
        let metadata = KeyMetadata::for_password(&created.salt, KdfAlgorithm::Argon2id);

        // Manager defaults to PBKDF2, but the record says Argon2id.
        let key = derive_with_metadata("pw", &metadata, &KdfParams::default()).unwrap();
        assert_eq!(key, created.key);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let pw = CredentialSource::password("super-secret");
        assert!(!format!("{:?}", pw).contains("super-secret"));
        let pin = CredentialSource::hardware_token("9876");
        assert!(!format!("{:?}", pin).contains("9876"));
    }
}
