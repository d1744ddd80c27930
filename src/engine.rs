//! Decoy Vault - Engine
//!
//! Composition root. Builds every component once and routes file
//! operations to the vault the current session exposes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::config::EngineConfig;
use crate::crypto::VaultKey;
use crate::decoy::{AccessDecision, CredentialVerifier, DecoyAccessController, PanicClearReport};
use crate::error::{VaultError, VaultResult};
use crate::file_cipher::{CipherProgress, DecryptedFile, FileCipher};
use crate::gate::VaultGate;
use crate::index::{FileKind, SqliteVaultIndex, VaultFileRecord, VaultIndex, VaultSelector};
use crate::keystore::KeyStore;
use crate::rotation::{KeyRotationCoordinator, RotationOutcome, RotationProgress};
use crate::secure_fs::DeleteOutcome;
use crate::secure_store::SecureStore;

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Vault Engine
///
/// Content operations need an unlocked session, started by
/// [`submit_credential`](Self::submit_credential).
///
/// ```rust,ignore
/// let engine = VaultEngine::open(config, store).await?;
/// engine.submit_credential("2580", &verifier).await?;
/// let record = engine.import_file(Path::new("holiday.jpg"), |_| {}).await?;
/// let bytes = engine.read_file(&record.id).await?;
/// ```
pub struct VaultEngine {
    config: EngineConfig,
    keys: Arc<KeyStore>,
    index: Arc<dyn VaultIndex>,
    cipher: FileCipher,
    rotation: KeyRotationCoordinator,
    decoy: DecoyAccessController,
    unlocked: AtomicBool,
}

impl VaultEngine {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open with the SQLite index at `config.index_path`
    pub async fn open(config: EngineConfig, store: Arc<dyn SecureStore>) -> VaultResult<Self> {
        config.validate()?;
        if let Some(parent) = config.index_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let index = Arc::new(SqliteVaultIndex::open(&config.index_path)?);
        Self::with_index(config, store, index).await
    }

    /// Open with a caller-supplied index
    pub async fn with_index(
        config: EngineConfig,
        store: Arc<dyn SecureStore>,
        index: Arc<dyn VaultIndex>,
    ) -> VaultResult<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.ciphertext_dir).await?;
        tokio::fs::create_dir_all(&config.staging_dir).await?;

        let keys = Arc::new(KeyStore::new(store.clone()));
        let gate = Arc::new(VaultGate::new());
        let cipher = FileCipher::new(keys.clone(), gate.clone(), config.secure_fs());
        let rotation =
            KeyRotationCoordinator::new(keys.clone(), gate, index.clone(), config.secure_fs());
        let decoy = DecoyAccessController::new(store);

        log::info!("Vault engine opened at {}", config.vault_root.display());

        Ok(Self {
            config,
            keys,
            index,
            cipher,
            rotation,
            decoy,
            unlocked: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn decoy(&self) -> &DecoyAccessController {
        &self.decoy
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SESSION
    // ═══════════════════════════════════════════════════════════════════════

    /// Route a credential to a vault and unlock the session.
    ///
    /// A denied credential locks the session.
    pub async fn submit_credential(
        &self,
        input: &str,
        verifier: &dyn CredentialVerifier,
    ) -> VaultResult<AccessDecision> {
        let decision = self.decoy.authenticate(input, verifier).await?;
        self.unlocked
            .store(decision != AccessDecision::Denied, Ordering::Release);
        Ok(decision)
    }

    /// Pre-select the last recorded mode.
    ///
    /// The session stays locked until a credential is submitted.
    pub async fn resume_last_mode(&self) -> VaultResult<VaultSelector> {
        let mode = self.decoy.last_access_mode().await?;
        self.decoy.activate(mode).await?;
        Ok(mode.selector())
    }

    pub fn lock(&self) {
        self.unlocked.store(false, Ordering::Release);
        log::debug!("Session locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    fn active_selector(&self) -> VaultResult<VaultSelector> {
        if !self.is_unlocked() {
            return Err(VaultError::PermissionDenied("vault is locked".into()));
        }
        Ok(self.decoy.active_selector())
    }

    /// Resolve a record of the active vault.
    ///
    /// Records of the other vault are reported as missing, so a decoy
    /// session cannot learn that real content exists.
    async fn resolve_active(&self, id: &str) -> VaultResult<VaultFileRecord> {
        let selector = self.active_selector()?;
        let record = self.index.resolve(id).await?;
        if record.vault_selector != selector {
            log::debug!("Refused cross-vault access to {}", id);
            return Err(VaultError::RecordNotFound(id.to_string()));
        }
        Ok(record)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt a file into the active vault and index it
    pub async fn import_file(
        &self,
        source: &Path,
        on_progress: impl FnMut(CipherProgress) + Send,
    ) -> VaultResult<VaultFileRecord> {
        let selector = self.active_selector()?;
        let id = uuid::Uuid::new_v4().to_string();
        let dest = self.ciphertext_path(selector, &id);

        let encrypted = self
            .cipher
            .encrypt_file(source, &dest, selector, on_progress)
            .await?;

        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());

        let record = VaultFileRecord::new(
            id,
            encrypted.dest_path,
            encrypted.iv,
            FileKind::from_extension(source),
            selector,
            encrypted.hash,
            original_name,
            encrypted.plaintext_size,
            encrypted.ciphertext_size,
        );

        if let Err(e) = self.index.persist(&record).await {
            // Unindexed ciphertext can never be decrypted again
            if let Err(cleanup) = self.cipher.shred_record(&record).await {
                log::warn!(
                    "Could not remove unindexed ciphertext {}: {}",
                    record.ciphertext_path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        log::info!("Imported {} into {} vault", record.id, selector);
        Ok(record)
    }

    /// Decrypt a file of the active vault into memory
    pub async fn read_file(&self, id: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
        let record = self.resolve_active(id).await?;
        self.cipher.decrypt_record(&record).await
    }

    /// Decrypt a file of the active vault to `output`
    pub async fn export_file(
        &self,
        id: &str,
        output: &Path,
        on_progress: impl FnMut(CipherProgress) + Send,
    ) -> VaultResult<DecryptedFile> {
        let record = self.resolve_active(id).await?;
        self.cipher
            .decrypt_file(
                &record.ciphertext_path,
                &record.iv,
                record.vault_selector,
                output,
                on_progress,
            )
            .await
    }

    /// Check a file's plaintext digest against its record
    pub async fn verify_file(&self, id: &str) -> VaultResult<bool> {
        let record = self.resolve_active(id).await?;
        self.cipher.verify_record(&record).await
    }

    /// Securely delete a file of the active vault and drop its record
    pub async fn remove_file(&self, id: &str) -> VaultResult<DeleteOutcome> {
        let record = self.resolve_active(id).await?;
        let outcome = self.cipher.shred_record(&record).await?;
        self.index.delete(id).await?;
        log::info!("Removed {} ({:?})", id, outcome);
        Ok(outcome)
    }

    /// Records of the active vault, oldest first
    pub async fn list_files(&self) -> VaultResult<Vec<VaultFileRecord>> {
        self.active_selector()?;
        self.decoy.files_for_current_mode(&*self.index).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEYS
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-encrypt the real vault under a freshly generated master key.
    ///
    /// Only a real-mode session may rotate.
    pub async fn rotate_master_key(
        &self,
        on_progress: impl FnMut(RotationProgress) + Send,
    ) -> VaultResult<RotationOutcome> {
        self.require_real()?;
        let records = self.index.list_by_selector(VaultSelector::Real).await?;
        let new_key = VaultKey::generate()?;

        let outcome = self
            .rotation
            .rotate(&records, &new_key, &self.config.staging_dir, on_progress)
            .await;
        Ok(outcome)
    }

    /// Finish an interrupted master key rotation
    pub async fn resume_rotation(
        &self,
        on_progress: impl FnMut(RotationProgress) + Send,
    ) -> VaultResult<RotationOutcome> {
        self.require_real()?;
        let records = self.index.list_by_selector(VaultSelector::Real).await?;
        Ok(self
            .rotation
            .resume(VaultSelector::Real, &records, &self.config.staging_dir, on_progress)
            .await)
    }

    /// Securely delete every real-vault file
    pub async fn panic_clear(&self) -> VaultResult<PanicClearReport> {
        self.active_selector()?;
        self.decoy
            .clear_real_vault(&*self.index, &self.cipher)
            .await
    }

    fn require_real(&self) -> VaultResult<()> {
        match self.active_selector()? {
            VaultSelector::Real => Ok(()),
            VaultSelector::Decoy => Err(VaultError::PermissionDenied(
                "key rotation needs a real-vault session".into(),
            )),
        }
    }

    fn ciphertext_path(&self, selector: VaultSelector, id: &str) -> PathBuf {
        self.config
            .ciphertext_dir
            .join(selector.as_str())
            .join(format!("{}.enc", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryVaultIndex;
    use crate::secure_store::MemorySecureStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct Accept(&'static str);

    #[async_trait]
    impl CredentialVerifier for Accept {
        async fn verify(&self, input: &str) -> VaultResult<bool> {
            Ok(input == self.0)
        }
    }

    async fn engine(root: &Path) -> VaultEngine {
        VaultEngine::with_index(
            EngineConfig::for_root(root),
            Arc::new(MemorySecureStore::new()),
            Arc::new(MemoryVaultIndex::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_locked_engine_refuses_content() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;

        assert!(matches!(engine.list_files().await, Err(VaultError::PermissionDenied(_))));
        assert!(matches!(engine.read_file("x").await, Err(VaultError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_import_read_remove() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir.path().join("vault")).await;
        let source = dir.path().join("note.txt");
        std::fs::write(&source, b"meet at noon").unwrap();

        assert_eq!(
            engine.submit_credential("pw", &Accept("pw")).await.unwrap(),
            AccessDecision::Real
        );

        let record = engine.import_file(&source, |_| {}).await.unwrap();
        assert_eq!(record.kind, FileKind::Document);
        assert_eq!(record.original_name, "note.txt");
        assert_eq!(engine.read_file(&record.id).await.unwrap().as_slice(), b"meet at noon");
        assert!(engine.verify_file(&record.id).await.unwrap());

        let outcome = engine.remove_file(&record.id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Shredded);
        assert!(!record.ciphertext_path.exists());
        assert!(engine.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_denied_credential_locks() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;
        engine.submit_credential("pw", &Accept("pw")).await.unwrap();
        assert!(engine.is_unlocked());

        let decision = engine.submit_credential("nope", &Accept("pw")).await.unwrap();
        assert_eq!(decision, AccessDecision::Denied);
        assert!(!engine.is_unlocked());
    }

    #[tokio::test]
    async fn test_decoy_session_cannot_rotate() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path()).await;
        engine.decoy().set_decoy_pin("1234").await.unwrap();
        engine.decoy().set_enabled(true).await.unwrap();

        engine.submit_credential("1234", &Accept("pw")).await.unwrap();
        assert!(matches!(
            engine.rotate_master_key(|_| {}).await,
            Err(VaultError::PermissionDenied(_))
        ));
    }

    /// Index that accepts nothing
    struct ReadOnlyIndex(MemoryVaultIndex);

    #[async_trait]
    impl VaultIndex for ReadOnlyIndex {
        async fn resolve(&self, id: &str) -> VaultResult<VaultFileRecord> {
            self.0.resolve(id).await
        }

        async fn persist(&self, _record: &VaultFileRecord) -> VaultResult<()> {
            Err(VaultError::DatabaseError("read-only".into()))
        }

        async fn delete(&self, id: &str) -> VaultResult<()> {
            self.0.delete(id).await
        }

        async fn list_by_selector(&self, selector: VaultSelector) -> VaultResult<Vec<VaultFileRecord>> {
            self.0.list_by_selector(selector).await
        }
    }

    #[tokio::test]
    async fn test_unindexed_import_leaves_no_ciphertext() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("vault");
        let engine = VaultEngine::with_index(
            EngineConfig::for_root(&root),
            Arc::new(MemorySecureStore::new()),
            Arc::new(ReadOnlyIndex(MemoryVaultIndex::new())),
        )
        .await
        .unwrap();
        let source = dir.path().join("note.txt");
        std::fs::write(&source, b"meet at noon").unwrap();

        engine.submit_credential("pw", &Accept("pw")).await.unwrap();
        assert!(matches!(
            engine.import_file(&source, |_| {}).await,
            Err(VaultError::DatabaseError(_))
        ));

        let real_dir = engine.config().ciphertext_dir.join(VaultSelector::Real.as_str());
        let leftovers = std::fs::read_dir(&real_dir).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}
