//! Decoy Vault - AES-256-CBC Encryption
//!
//! Raw CBC output with PKCS7 padding. The IV travels out-of-band in the
//! index, so ciphertext files carry no header.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::keys::{generate_iv, KeyKind, VaultKey, IV_LEN};
use crate::error::{VaultError, VaultResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size
pub const BLOCK_LEN: usize = 16;

/// Ciphertext paired with the IV needed to decrypt it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub key_kind: KeyKind,
}

/// Encrypt with a fresh IV
pub fn encrypt(plaintext: &[u8], key: &VaultKey) -> VaultResult<(Vec<u8>, [u8; IV_LEN])> {
    let iv = generate_iv()?;
    let ciphertext = encrypt_with_iv(plaintext, key, &iv)?;
    Ok((ciphertext, iv))
}

/// Encrypt with a fresh IV, tagging the result with the key it was sealed under
pub fn seal(plaintext: &[u8], key: &VaultKey, key_kind: KeyKind) -> VaultResult<CipherEnvelope> {
    let (ciphertext, iv) = encrypt(plaintext, key)?;
    Ok(CipherEnvelope {
        ciphertext,
        iv,
        key_kind,
    })
}

/// Deterministic encryption under a caller-supplied IV
pub fn encrypt_with_iv(plaintext: &[u8], key: &VaultKey, iv: &[u8; IV_LEN]) -> VaultResult<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key.expose(), iv)
        .map_err(|e| VaultError::CipherFailure(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt, treating bad padding as an integrity failure.
///
/// Padding is a corruption heuristic only, not authentication.
pub fn decrypt(ciphertext: &[u8], iv: &[u8; IV_LEN], key: &VaultKey) -> VaultResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(VaultError::IntegrityFailure);
    }

    let cipher = Aes256CbcDec::new_from_slices(key.expose(), iv)
        .map_err(|e| VaultError::CipherFailure(e.to_string()))?;

    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::IntegrityFailure)
}

/// Decrypt an envelope with the key it claims to be sealed under
pub fn open(envelope: &CipherEnvelope, key: &VaultKey, key_kind: KeyKind) -> VaultResult<Vec<u8>> {
    if envelope.key_kind != key_kind {
        return Err(VaultError::SelectorMismatch {
            expected: envelope.key_kind.to_string(),
            actual: key_kind.to_string(),
        });
    }
    decrypt(&envelope.ciphertext, &envelope.iv, key)
}
