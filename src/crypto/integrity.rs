//! Decoy Vault - Hashing and Buffer Hygiene

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Hex SHA-256 digest.
///
/// Used both for plaintext integrity labels and for credential digests.
pub fn hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare two byte strings without early exit on the first mismatch
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Overwrite a plaintext buffer before it is released.
///
/// Best-effort: copies made earlier by the allocator are out of reach.
pub fn secure_erase(buffer: &mut [u8]) {
    buffer.zeroize();
}

/// Overwrite and truncate a plaintext vector
pub fn secure_erase_vec(buffer: &mut Vec<u8>) {
    buffer.zeroize();
}
