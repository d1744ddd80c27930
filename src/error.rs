//! Decoy Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // ACCESS ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Record belongs to the {actual} vault, expected {expected}")]
    SelectorMismatch { expected: String, actual: String },

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Integrity failure - wrong key, wrong IV or corrupted ciphertext")]
    IntegrityFailure,

    #[error("Cipher failure: {0}")]
    CipherFailure(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Secure random source unavailable: {0}")]
    RandomUnavailable(String),

    // ═══════════════════════════════════════════════════════════════
    // KEY STORE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    // ═══════════════════════════════════════════════════════════════
    // FILE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Source file missing: {0}")]
    SourceMissing(String),

    #[error("Ciphertext file missing: {0}")]
    CiphertextMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // ROTATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Key rotation already in progress for the {0} vault")]
    RotationInProgress(String),

    #[error("Batch stopped after {processed} of {total} files: {reason}")]
    BatchPartialFailure {
        processed: usize,
        total: usize,
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════
    // INDEX ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Record not found in index: {0}")]
    RecordNotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // ═══════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VaultError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            VaultError::IntegrityFailure
                | VaultError::KeyStoreUnavailable(_)
                | VaultError::RandomUnavailable(_)
                | VaultError::SelectorMismatch { .. }
        )
    }

    /// Check if retrying the same call can ever succeed.
    ///
    /// Integrity failures are deterministic for a given key and IV, and a
    /// missing key store is fatal for the session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::Io(_)
                | VaultError::RotationInProgress(_)
                | VaultError::BatchPartialFailure { .. }
                | VaultError::DatabaseError(_)
        )
    }

    /// Wrap any lower-level fault as a cipher failure, keeping typed
    /// variants that callers are expected to handle.
    pub(crate) fn into_cipher_failure(self) -> VaultError {
        match self {
            VaultError::Io(e) => VaultError::CipherFailure(e.to_string()),
            VaultError::SerializationError(e) | VaultError::DatabaseError(e) => {
                VaultError::CipherFailure(e)
            }
            other => other,
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_failure_is_not_retryable() {
        let err = VaultError::IntegrityFailure;
        assert!(err.is_security_critical());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_wrapped_as_cipher_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let wrapped = VaultError::from(io).into_cipher_failure();
        assert!(matches!(wrapped, VaultError::CipherFailure(_)));

        let kept = VaultError::IntegrityFailure.into_cipher_failure();
        assert!(matches!(kept, VaultError::IntegrityFailure));
    }
}
