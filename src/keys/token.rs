// Strongbox — Hardware Token Collaborator
//
// The hardware security token itself (USB key, smart card) is an external
// collaborator. This module only fixes the contract the key derivation
// service relies on: presence detection, PIN unlock, and a deterministic
// encrypt/sign primitive over caller-supplied bytes.

use std::sync::atomic::{AtomicBool, Ordering};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::KeyError;

/// Contract exposed by a hardware security token.
///
/// `encrypt` must be deterministic for a given token and input, otherwise
/// the derived database key would change between runs.
pub trait HardwareToken: Send + Sync {
    /// Whether a token is currently attached and reachable.
    fn is_present(&self) -> bool;

    /// Unlock the token with the user's PIN or unlock secret.
    /// Fails with `TokenAuthFailed` when the PIN is rejected.
    fn unlock(&self, pin: &str) -> Result<(), KeyError>;

    /// Run the token's encrypt/sign primitive over `data`.
    /// Only valid after a successful `unlock`.
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeyError>;
}

/// Stand-in used when no hardware token is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHardwareToken;

impl HardwareToken for NoHardwareToken {
    fn is_present(&self) -> bool {
        false
    }

    fn unlock(&self, _pin: &str) -> Result<(), KeyError> {
        Err(KeyError::TokenUnavailable)
    }

    fn encrypt(&self, _data: &[u8]) -> Result<Vec<u8>, KeyError> {
        Err(KeyError::TokenUnavailable)
    }
}

/// Software-emulated token: HMAC-SHA256 keyed by a device secret, gated by a PIN.
/// Intended for development machines and tests.
pub struct SoftwareToken {
    pin: Zeroizing<String>,
    device_secret: Zeroizing<Vec<u8>>,
    unlocked: AtomicBool,
}

impl SoftwareToken {
    pub fn new(pin: &str, device_secret: &[u8]) -> Self {
        Self {
            pin: Zeroizing::new(pin.to_string()),
            device_secret: Zeroizing::new(device_secret.to_vec()),
            unlocked: AtomicBool::new(false),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }
}

impl HardwareToken for SoftwareToken {
    fn is_present(&self) -> bool {
        true
    }

    fn unlock(&self, pin: &str) -> Result<(), KeyError> {
        // Compare digests so the PIN length does not affect timing either.
        let offered = Sha256::digest(pin.as_bytes());
        let expected = Sha256::digest(self.pin.as_bytes());
        let matches: bool = offered.as_slice().ct_eq(expected.as_slice()).into();

        if !matches {
            self.unlocked.store(false, Ordering::SeqCst);
            tracing::debug!("Software token rejected PIN");
            return Err(KeyError::TokenAuthFailed);
        }

        self.unlocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        if !self.is_unlocked() {
            return Err(KeyError::Token("token is locked".to_string()));
        }

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.device_secret)
            .map_err(|e| KeyError::Token(format!("invalid device secret: {}", e)))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_token_reports_unavailable() {
        let token = NoHardwareToken;
        assert!(!token.is_present());
        assert!(matches!(token.unlock("1234"), Err(KeyError::TokenUnavailable)));
    }

    #[test]
    fn test_software_token_rejects_wrong_pin() {
        let token = SoftwareToken::new("1234", b"device-secret");
        assert!(matches!(token.unlock("0000"), Err(KeyError::TokenAuthFailed)));
        assert!(!token.is_unlocked());
    }

    #[test]
    fn test_software_token_requires_unlock_before_encrypt() {
        let token = SoftwareToken::new("1234", b"device-secret");
        assert!(token.encrypt(b"data").is_err());

        token.unlock("1234").unwrap();
        assert_eq!(token.encrypt(b"data").unwrap().len(), 32);
    }

    #[test]
    fn test_software_token_is_deterministic() {
        let token = SoftwareToken::new("1234", b"device-secret");
        token.unlock("1234").unwrap();
        assert_eq!(token.encrypt(b"data").unwrap(), token.encrypt(b"data").unwrap());
    }

    #[test]
    fn test_software_token_rejects_pin_prefix_and_extension() {
        let token = SoftwareToken::new("1234", b"device-secret");
        assert!(matches!(token.unlock("123"), Err(KeyError::TokenAuthFailed)));
        assert!(matches!(token.unlock("12345"), Err(KeyError::TokenAuthFailed)));
        assert!(matches!(token.unlock(""), Err(KeyError::TokenAuthFailed)));
        token.unlock("1234").unwrap();
        assert!(token.is_unlocked());
    }
}
