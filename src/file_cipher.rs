//! Decoy Vault - File Cipher
//!
//! Encrypts and decrypts whole files under the key of a vault selector.
//! Files are read fully into memory; plaintext buffers are zeroized on drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::{self, VaultKey, IV_LEN};
use crate::error::{VaultError, VaultResult};
use crate::gate::VaultGate;
use crate::index::{VaultFileRecord, VaultSelector};
use crate::keystore::KeyStore;
use crate::secure_fs::{DeleteOutcome, SecureFs};

/// Stage of a single-file operation, reported in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherStage {
    Read,
    Encrypt,
    Decrypt,
    Write,
}

/// Progress callback payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CipherProgress {
    pub stage: CipherStage,
    /// Fraction of the whole operation completed, 0.0..=1.0
    pub completed: f32,
}

impl CipherProgress {
    fn at(stage: CipherStage, step: u8, steps: u8) -> Self {
        Self {
            stage,
            completed: step as f32 / steps as f32,
        }
    }
}

/// Result of encrypting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFile {
    pub dest_path: PathBuf,
    pub iv: [u8; IV_LEN],
    /// Hex SHA-256 of the plaintext
    pub hash: String,
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
}

/// Result of decrypting one file to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub output_path: PathBuf,
    pub size: u64,
}

/// File Cipher
pub struct FileCipher {
    keys: Arc<KeyStore>,
    gate: Arc<VaultGate>,
    fs: SecureFs,
}

impl FileCipher {
    pub fn new(keys: Arc<KeyStore>, gate: Arc<VaultGate>, fs: SecureFs) -> Self {
        Self { keys, gate, fs }
    }

    async fn key_for(&self, selector: VaultSelector) -> VaultResult<VaultKey> {
        self.keys.ensure_key(selector.key_kind()).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENCRYPT
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt `source` into `dest` under the key of `selector`
    pub async fn encrypt_file(
        &self,
        source: &Path,
        dest: &Path,
        selector: VaultSelector,
        mut on_progress: impl FnMut(CipherProgress) + Send,
    ) -> VaultResult<EncryptedFile> {
        let _shared = self.gate.enter(selector).await;

        let plaintext = match self.fs.read_optional(source).await {
            Ok(Some(data)) => Zeroizing::new(data),
            Ok(None) => return Err(VaultError::SourceMissing(source.display().to_string())),
            Err(e) => return Err(e.into_cipher_failure()),
        };
        on_progress(CipherProgress::at(CipherStage::Read, 1, 3));

        let key = self.key_for(selector).await?;
        let hash = crypto::hash(&plaintext);
        let (ciphertext, iv) =
            crypto::encrypt(&plaintext, &key).map_err(VaultError::into_cipher_failure)?;
        on_progress(CipherProgress::at(CipherStage::Encrypt, 2, 3));

        self.fs
            .write_atomic(dest, &ciphertext)
            .await
            .map_err(VaultError::into_cipher_failure)?;
        on_progress(CipherProgress::at(CipherStage::Write, 3, 3));

        log::debug!(
            "Encrypted {} -> {} ({} vault)",
            source.display(),
            dest.display(),
            selector
        );

        Ok(EncryptedFile {
            dest_path: dest.to_path_buf(),
            iv,
            hash,
            plaintext_size: plaintext.len() as u64,
            ciphertext_size: ciphertext.len() as u64,
        })
    }

    /// Encrypt an in-memory buffer into `dest`
    pub async fn encrypt_bytes_to_file(
        &self,
        plaintext: &[u8],
        dest: &Path,
        selector: VaultSelector,
    ) -> VaultResult<EncryptedFile> {
        let _shared = self.gate.enter(selector).await;

        let key = self.key_for(selector).await?;
        let (ciphertext, iv) =
            crypto::encrypt(plaintext, &key).map_err(VaultError::into_cipher_failure)?;
        self.fs
            .write_atomic(dest, &ciphertext)
            .await
            .map_err(VaultError::into_cipher_failure)?;

        Ok(EncryptedFile {
            dest_path: dest.to_path_buf(),
            iv,
            hash: crypto::hash(plaintext),
            plaintext_size: plaintext.len() as u64,
            ciphertext_size: ciphertext.len() as u64,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DECRYPT
    // ═══════════════════════════════════════════════════════════════════════

    /// Decrypt a ciphertext file into memory
    pub async fn decrypt_file_to_memory(
        &self,
        ciphertext_path: &Path,
        iv: &[u8; IV_LEN],
        selector: VaultSelector,
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        let _shared = self.gate.enter(selector).await;
        self.decrypt_locked(ciphertext_path, iv, selector, &mut |_| {}).await
    }

    /// Decrypt a ciphertext file and write the plaintext to `output`
    pub async fn decrypt_file(
        &self,
        ciphertext_path: &Path,
        iv: &[u8; IV_LEN],
        selector: VaultSelector,
        output: &Path,
        mut on_progress: impl FnMut(CipherProgress) + Send,
    ) -> VaultResult<DecryptedFile> {
        let _shared = self.gate.enter(selector).await;

        let plaintext = self
            .decrypt_locked(ciphertext_path, iv, selector, &mut on_progress)
            .await?;
        self.fs
            .write_atomic(output, &plaintext)
            .await
            .map_err(VaultError::into_cipher_failure)?;
        on_progress(CipherProgress::at(CipherStage::Write, 3, 3));

        Ok(DecryptedFile {
            output_path: output.to_path_buf(),
            size: plaintext.len() as u64,
        })
    }

    /// Decrypt the file a record points at, with the record's own vault key
    pub async fn decrypt_record(&self, record: &VaultFileRecord) -> VaultResult<Zeroizing<Vec<u8>>> {
        self.decrypt_file_to_memory(&record.ciphertext_path, &record.iv, record.vault_selector)
            .await
    }

    /// Decrypt a record and compare the plaintext digest with the one
    /// captured at encrypt time
    pub async fn verify_record(&self, record: &VaultFileRecord) -> VaultResult<bool> {
        let plaintext = self.decrypt_record(record).await?;
        let digest = crypto::hash(&plaintext);
        Ok(crypto::constant_time_eq(
            digest.as_bytes(),
            record.integrity_hash.as_bytes(),
        ))
    }

    async fn decrypt_locked(
        &self,
        ciphertext_path: &Path,
        iv: &[u8; IV_LEN],
        selector: VaultSelector,
        on_progress: &mut (dyn FnMut(CipherProgress) + Send),
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        let ciphertext = match self.fs.read_optional(ciphertext_path).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                return Err(VaultError::CiphertextMissing(
                    ciphertext_path.display().to_string(),
                ))
            }
            Err(e) => return Err(e.into_cipher_failure()),
        };
        on_progress(CipherProgress::at(CipherStage::Read, 1, 3));

        let key = self.key_for(selector).await?;
        let plaintext = crypto::decrypt(&ciphertext, iv, &key).map_err(VaultError::into_cipher_failure)?;
        on_progress(CipherProgress::at(CipherStage::Decrypt, 2, 3));

        Ok(Zeroizing::new(plaintext))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DELETE
    // ═══════════════════════════════════════════════════════════════════════

    /// Overwrite then unlink, falling back to a plain unlink
    pub async fn secure_delete(&self, path: &Path) -> VaultResult<DeleteOutcome> {
        self.fs.secure_delete(path).await
    }

    /// Securely delete a record's ciphertext while holding its vault's gate
    pub async fn shred_record(&self, record: &VaultFileRecord) -> VaultResult<DeleteOutcome> {
        let _shared = self.gate.enter(record.vault_selector).await;
        let outcome = self.fs.secure_delete(&record.ciphertext_path).await?;
        log::debug!("Shredded {} ({:?})", record.id, outcome);
        Ok(outcome)
    }
}
