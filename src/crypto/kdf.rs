//! Decoy Vault - Password Key Derivation
//!
//! PBKDF2-HMAC-SHA256 with a fixed work factor.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::keys::{generate_salt, VaultKey, KEY_LEN, SALT_LEN};
use crate::error::{VaultError, VaultResult};

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A password-derived key together with the salt that reproduces it
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: VaultKey,
    pub salt: [u8; SALT_LEN],
}

/// Derive a 256-bit key from a password.
///
/// With `salt == None` a fresh 128-bit salt is generated; the caller must
/// persist `DerivedKey::salt` to re-derive the same key later.
pub fn derive_key(password: &str, salt: Option<&[u8]>) -> VaultResult<DerivedKey> {
    let salt: [u8; SALT_LEN] = match salt {
        Some(bytes) => bytes
            .try_into()
            .map_err(|_| VaultError::KeyDerivationFailed(format!(
                "salt must be {} bytes, got {}",
                SALT_LEN,
                bytes.len()
            )))?,
        None => generate_salt()?,
    };

    let mut okm = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut okm);
    let key = VaultKey::new(okm);
    okm.zeroize();

    Ok(DerivedKey { key, salt })
}
