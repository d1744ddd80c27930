//! Decoy Vault - Key Material
//!
//! 256-bit vault keys and CSPRNG draws.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// IV length for AES-CBC (one block)
pub const IV_LEN: usize = 16;

/// Salt length for PBKDF2
pub const SALT_LEN: usize = 16;

/// Which persisted key a piece of ciphertext belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Master,
    Decoy,
}

impl KeyKind {
    pub const ALL: [KeyKind; 2] = [KeyKind::Master, KeyKind::Decoy];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Master => "master",
            KeyKind::Decoy => "decoy",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secure key wrapper, zeroized on drop
pub struct VaultKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl VaultKey {
    /// Create a new vault key from bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Build a key from an arbitrary slice, checking its length
    pub fn from_slice(bytes: &[u8]) -> VaultResult<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::new(arr))
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key from the system CSPRNG
    pub fn generate() -> VaultResult<Self> {
        let mut bytes = [0u8; KEY_LEN];
        fill_random(&mut bytes)?;
        Ok(Self::new(bytes))
    }
}

impl Clone for VaultKey {
    fn clone(&self) -> Self {
        Self::new(*self.expose())
    }
}

impl PartialEq for VaultKey {
    fn eq(&self, other: &Self) -> bool {
        super::integrity::constant_time_eq(self.expose(), other.expose())
    }
}

impl Eq for VaultKey {}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Fill a buffer from the OS CSPRNG
pub fn fill_random(buf: &mut [u8]) -> VaultResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VaultError::RandomUnavailable(e.to_string()))
}

/// `n` cryptographically secure random bytes
pub fn random_bytes(n: usize) -> VaultResult<Vec<u8>> {
    let mut buf = vec![0u8; n];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a fresh IV for AES-CBC
pub fn generate_iv() -> VaultResult<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;
    Ok(iv)
}

/// Generate a fresh PBKDF2 salt
pub fn generate_salt() -> VaultResult<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let k1 = VaultKey::generate().unwrap();
        let k2 = VaultKey::generate().unwrap();
        assert_ne!(k1, k2);
        assert_eq!(k1.clone(), k1);
    }

    #[test]
    fn test_from_slice_checks_length() {
        assert!(VaultKey::from_slice(&[7u8; KEY_LEN]).is_ok());
        match VaultKey::from_slice(&[7u8; 16]) {
            Err(VaultError::InvalidKeyLength { expected, actual }) => {
                assert_eq!(expected, KEY_LEN);
                assert_eq!(actual, 16);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(0).unwrap().len(), 0);
        assert_eq!(random_bytes(48).unwrap().len(), 48);
        assert_ne!(generate_iv().unwrap(), generate_iv().unwrap());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = VaultKey::new([0xAB; KEY_LEN]);
        let shown = format!("{:?}", key);
        assert!(!shown.contains("171"));
        assert!(shown.contains("REDACTED"));
    }
}
