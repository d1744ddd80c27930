//! Decoy Vault - Key Rotation
//!
//! Re-encrypts every file of a vault under a new key.
//!
//! Rotation runs in two phases. Staging decrypts each file under the
//! current key and writes the re-encrypted copy into a staging directory;
//! a failure here leaves every original untouched. Commit then moves the
//! staged files over the originals, updates the index and finally swaps
//! the key. Before the first original is replaced, the new key is parked
//! in the secure store as a pending key next to a journal of the new IVs,
//! so every ciphertext on disk always has a retrievable key and IV.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::{self, VaultKey, IV_LEN};
use crate::error::{VaultError, VaultResult};
use crate::gate::VaultGate;
use crate::index::{VaultFileRecord, VaultIndex, VaultSelector};
use crate::keystore::KeyStore;
use crate::secure_fs::SecureFs;

/// Rotation phase reported with progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Staging,
    Committing,
}

/// Progress callback payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationProgress {
    pub phase: RotationPhase,
    /// Files finished in this phase
    pub done: usize,
    pub total: usize,
    pub file_id: String,
}

/// Result of a rotation batch
#[derive(Debug)]
pub struct RotationOutcome {
    pub total: usize,
    /// Files re-encrypted under the new key before the batch stopped
    pub processed_count: usize,
    /// Files whose original ciphertext was replaced
    pub committed_count: usize,
    /// New IVs of committed files, in batch order
    pub new_ivs: Vec<[u8; IV_LEN]>,
    /// Whether the new key is now the active key
    pub key_committed: bool,
    pub error: Option<VaultError>,
}

impl RotationOutcome {
    fn empty(total: usize) -> Self {
        Self {
            total,
            processed_count: 0,
            committed_count: 0,
            new_ivs: Vec::new(),
            key_committed: false,
            error: None,
        }
    }

    fn failed(mut self, error: VaultError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.key_committed
    }

    /// Collapse into a result, reporting a stopped batch as
    /// `BatchPartialFailure`
    pub fn into_result(self) -> VaultResult<Vec<[u8; IV_LEN]>> {
        match self.error {
            None => Ok(self.new_ivs),
            Some(e @ VaultError::BatchPartialFailure { .. })
            | Some(e @ VaultError::RotationInProgress(_)) => Err(e),
            Some(e) => Err(VaultError::BatchPartialFailure {
                processed: self.processed_count,
                total: self.total,
                reason: e.to_string(),
            }),
        }
    }
}

/// One file ready to be committed
struct Staged {
    staged_path: Option<PathBuf>,
    record: VaultFileRecord,
}

/// Key Rotation Coordinator
pub struct KeyRotationCoordinator {
    keys: Arc<KeyStore>,
    gate: Arc<VaultGate>,
    index: Arc<dyn VaultIndex>,
    fs: SecureFs,
}

impl KeyRotationCoordinator {
    pub fn new(
        keys: Arc<KeyStore>,
        gate: Arc<VaultGate>,
        index: Arc<dyn VaultIndex>,
        fs: SecureFs,
    ) -> Self {
        Self {
            keys,
            gate,
            index,
            fs,
        }
    }

    /// Rotate the master key over the real vault's files
    pub async fn rotate(
        &self,
        records: &[VaultFileRecord],
        new_key: &VaultKey,
        temp_dir: &Path,
        on_progress: impl FnMut(RotationProgress) + Send,
    ) -> RotationOutcome {
        self.rotate_vault(VaultSelector::Real, records, new_key, temp_dir, on_progress)
            .await
    }

    /// Rotate the key of `selector` over `records`, in the given order
    pub async fn rotate_vault(
        &self,
        selector: VaultSelector,
        records: &[VaultFileRecord],
        new_key: &VaultKey,
        temp_dir: &Path,
        on_progress: impl FnMut(RotationProgress) + Send,
    ) -> RotationOutcome {
        let total = records.len();
        match self.keys.pending_key(selector.key_kind()).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                return RotationOutcome::empty(total).failed(VaultError::RotationInProgress(format!(
                    "{} (an interrupted rotation must be resumed first)",
                    selector
                )))
            }
            Err(e) => return RotationOutcome::empty(total).failed(e),
        }

        self.run(selector, records, new_key, temp_dir, false, on_progress)
            .await
    }

    /// Finish a rotation whose commit phase was interrupted, using the
    /// pending key left in the secure store
    pub async fn resume(
        &self,
        selector: VaultSelector,
        records: &[VaultFileRecord],
        temp_dir: &Path,
        on_progress: impl FnMut(RotationProgress) + Send,
    ) -> RotationOutcome {
        let total = records.len();
        let pending = match self.keys.pending_key(selector.key_kind()).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                return RotationOutcome::empty(total).failed(VaultError::PermissionDenied(format!(
                    "no interrupted rotation for the {} vault",
                    selector
                )))
            }
            Err(e) => return RotationOutcome::empty(total).failed(e),
        };

        log::info!("Resuming interrupted {} vault rotation", selector);
        self.run(selector, records, &pending, temp_dir, true, on_progress)
            .await
    }

    async fn run(
        &self,
        selector: VaultSelector,
        records: &[VaultFileRecord],
        new_key: &VaultKey,
        temp_dir: &Path,
        resuming: bool,
        mut on_progress: impl FnMut(RotationProgress) + Send,
    ) -> RotationOutcome {
        let total = records.len();
        let mut outcome = RotationOutcome::empty(total);

        if let Some(stray) = records.iter().find(|r| r.vault_selector != selector) {
            return outcome.failed(VaultError::SelectorMismatch {
                expected: selector.to_string(),
                actual: format!("{} (record {})", stray.vault_selector, stray.id),
            });
        }

        let _exclusive = match self.gate.begin_rotation(selector).await {
            Ok(guard) => guard,
            Err(e) => return outcome.failed(e),
        };

        if let Err(e) = self.check_covers_vault(selector, records).await {
            return outcome.failed(e);
        }

        let kind = selector.key_kind();
        let current_key = match self.keys.ensure_key(kind).await {
            Ok(key) => key,
            Err(e) => return outcome.failed(e),
        };
        if !resuming && current_key == *new_key {
            return outcome.failed(VaultError::PermissionDenied(
                "new key equals the active key".into(),
            ));
        }

        let journal = if resuming {
            match self.keys.rotation_journal(kind).await {
                Ok(journal) => Some(journal),
                Err(e) => return outcome.failed(e),
            }
        } else {
            None
        };

        // ── Phase 1: staging ─────────────────────────────────────────────
        let mut staged = Vec::with_capacity(total);
        for (i, record) in records.iter().enumerate() {
            let staged_path = temp_dir.join(format!("rotation-{}-{:06}.stage", selector, i));
            match self
                .stage_one(record, &current_key, new_key, &staged_path, journal.as_ref())
                .await
            {
                Ok(entry) => staged.push(entry),
                Err(e) => {
                    log::warn!(
                        "Rotation of {} vault stopped at file {} of {} ({}): {}",
                        selector,
                        i + 1,
                        total,
                        record.id,
                        e
                    );
                    self.discard_staged(&staged).await;
                    outcome.processed_count = i;
                    return outcome.failed(e);
                }
            }
            on_progress(RotationProgress {
                phase: RotationPhase::Staging,
                done: i + 1,
                total,
                file_id: record.id.clone(),
            });
        }
        outcome.processed_count = total;

        // ── Phase 2: commit ──────────────────────────────────────────────
        if !resuming {
            if let Err(e) = self.keys.stage_pending(kind, new_key).await {
                self.discard_staged(&staged).await;
                return outcome.failed(e);
            }
        }

        let ivs: BTreeMap<String, [u8; IV_LEN]> = staged
            .iter()
            .map(|s| (s.record.id.clone(), s.record.iv))
            .collect();
        if let Err(e) = self.keys.write_rotation_journal(kind, &ivs).await {
            self.discard_staged(&staged).await;
            if !resuming {
                if let Err(discard_err) = self.keys.discard_pending(kind).await {
                    log::warn!("Could not clear pending {} key: {}", kind, discard_err);
                }
            }
            return outcome.failed(e);
        }

        for (j, entry) in staged.iter().enumerate() {
            if let Some(path) = &entry.staged_path {
                if let Err(e) = self.fs.promote(path, &entry.record.ciphertext_path).await {
                    log::error!(
                        "Rotation commit failed at file {} of {} ({}): {}; pending key retained",
                        j + 1,
                        total,
                        entry.record.id,
                        e
                    );
                    let reason = match self.persist_records(&staged[..j]).await {
                        Ok(()) => e.to_string(),
                        Err(index_err) => format!("{}; index update failed: {}", e, index_err),
                    };
                    self.discard_staged(&staged[j..]).await;
                    outcome.committed_count = j;
                    outcome.new_ivs = staged[..j].iter().map(|s| s.record.iv).collect();
                    return outcome.failed(VaultError::BatchPartialFailure {
                        processed: j,
                        total,
                        reason,
                    });
                }
            }
            outcome.committed_count = j + 1;
            on_progress(RotationProgress {
                phase: RotationPhase::Committing,
                done: j + 1,
                total,
                file_id: entry.record.id.clone(),
            });
        }
        outcome.new_ivs = staged.iter().map(|s| s.record.iv).collect();

        if let Err(e) = self.persist_records(&staged).await {
            log::error!("Index update failed after rotation commit: {}; pending key retained", e);
            return outcome.failed(VaultError::BatchPartialFailure {
                processed: total,
                total,
                reason: format!("index update failed: {}", e),
            });
        }

        if let Err(e) = self.keys.replace_key(kind, new_key).await {
            return outcome.failed(e);
        }
        outcome.key_committed = true;

        if let Err(e) = self.keys.discard_pending(kind).await {
            log::warn!("Could not clear pending {} key: {}", kind, e);
        }
        if let Err(e) = self.keys.discard_rotation_journal(kind).await {
            log::warn!("Could not clear {} rotation journal: {}", kind, e);
        }

        log::info!("Rotated {} vault key over {} files", selector, total);
        outcome
    }

    /// Refuse a batch that leaves out indexed files of the vault; they
    /// would stay under a key that is about to be retired
    async fn check_covers_vault(
        &self,
        selector: VaultSelector,
        records: &[VaultFileRecord],
    ) -> VaultResult<()> {
        let indexed = self.index.list_by_selector(selector).await?;
        let batch: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let missing: Vec<&str> = indexed
            .iter()
            .map(|r| r.id.as_str())
            .filter(|id| !batch.contains(id))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        Err(VaultError::PermissionDenied(format!(
            "batch omits {} of {} indexed {} vault files: {}",
            missing.len(),
            indexed.len(),
            selector,
            missing.join(", ")
        )))
    }

    /// Stage one file under the new key.
    ///
    /// With a journal (resuming), a file that no longer opens under the
    /// current key is looked up under the pending key instead.
    async fn stage_one(
        &self,
        record: &VaultFileRecord,
        current_key: &VaultKey,
        new_key: &VaultKey,
        staged_path: &Path,
        journal: Option<&BTreeMap<String, [u8; IV_LEN]>>,
    ) -> VaultResult<Staged> {
        let ciphertext = self
            .fs
            .read_optional(&record.ciphertext_path)
            .await?
            .ok_or_else(|| VaultError::CiphertextMissing(record.ciphertext_path.display().to_string()))?;

        let plaintext = match (open_verified(&ciphertext, record, current_key), journal) {
            (Ok(plaintext), _) => plaintext,
            (Err(VaultError::IntegrityFailure), Some(journal)) => {
                return Ok(Staged {
                    staged_path: None,
                    record: recover_migrated(&ciphertext, record, new_key, journal)?,
                });
            }
            (Err(e), _) => return Err(e),
        };

        let (reencrypted, iv) = crypto::encrypt(&plaintext, new_key)?;
        self.fs.write_staged(staged_path, &reencrypted).await?;

        Ok(Staged {
            staged_path: Some(staged_path.to_path_buf()),
            record: record.with_envelope(iv, reencrypted.len() as u64),
        })
    }

    /// Write every record to the index, returning the first failure
    async fn persist_records(&self, entries: &[Staged]) -> VaultResult<()> {
        let mut first_error = None;
        for entry in entries {
            if let Err(e) = self.index.persist(&entry.record).await {
                log::error!("Could not record new IV for {}: {}", entry.record.id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn discard_staged(&self, entries: &[Staged]) {
        for path in entries.iter().filter_map(|e| e.staged_path.as_deref()) {
            if let Err(e) = self.fs.secure_delete(path).await {
                log::warn!("Could not remove staged file {}: {}", path.display(), e);
            }
        }
    }
}

/// Decrypt and check the plaintext digest recorded at encrypt time.
///
/// Padding alone accepts roughly 1 in 256 wrong keys; the digest does not.
/// Record of a file an interrupted commit already moved under the pending
/// key: the indexed IV if the index caught up, else the journalled one
fn recover_migrated(
    ciphertext: &[u8],
    record: &VaultFileRecord,
    pending_key: &VaultKey,
    journal: &BTreeMap<String, [u8; IV_LEN]>,
) -> VaultResult<VaultFileRecord> {
    if open_verified(ciphertext, record, pending_key).is_ok() {
        return Ok(record.clone());
    }
    let iv = journal.get(&record.id).ok_or(VaultError::IntegrityFailure)?;
    let migrated = record.with_envelope(*iv, ciphertext.len() as u64);
    open_verified(ciphertext, &migrated, pending_key)?;
    Ok(migrated)
}

fn open_verified(
    ciphertext: &[u8],
    record: &VaultFileRecord,
    key: &VaultKey,
) -> VaultResult<Zeroizing<Vec<u8>>> {
    let plaintext = Zeroizing::new(crypto::decrypt(ciphertext, &record.iv, key)?);
    let digest = crypto::hash(&plaintext);
    if !crypto::constant_time_eq(digest.as_bytes(), record.integrity_hash.as_bytes()) {
        return Err(VaultError::IntegrityFailure);
    }
    Ok(plaintext)
}
