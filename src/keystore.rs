//! Decoy Vault - Key Store
//!
//! Owns the master and decoy keys and the persisted PBKDF2 salts.
//! Keys are loaded or generated once per process and cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use tokio::sync::Mutex;

use crate::crypto::{derive_key, generate_salt, DerivedKey, KeyKind, VaultKey, IV_LEN, SALT_LEN};
use crate::error::{VaultError, VaultResult};
use crate::secure_store::{keys, SecureStore};

/// Cached key slot; `None` until first loaded
type KeySlot = Mutex<Option<VaultKey>>;

/// Key Store
///
/// Each key kind has its own slot lock, held across the whole
/// read-or-generate-and-persist sequence so concurrent first access
/// generates exactly one key. Salt creation is serialized the same way.
pub struct KeyStore {
    store: Arc<dyn SecureStore>,
    master: KeySlot,
    decoy: KeySlot,
    salts: Mutex<()>,
}

impl KeyStore {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            master: Mutex::new(None),
            decoy: Mutex::new(None),
            salts: Mutex::new(()),
        }
    }

    fn slot(&self, kind: KeyKind) -> &KeySlot {
        match kind {
            KeyKind::Master => &self.master,
            KeyKind::Decoy => &self.decoy,
        }
    }

    fn storage_key(kind: KeyKind) -> &'static str {
        match kind {
            KeyKind::Master => keys::MASTER_KEY,
            KeyKind::Decoy => keys::DECOY_KEY,
        }
    }

    fn pending_storage_key(kind: KeyKind) -> &'static str {
        match kind {
            KeyKind::Master => keys::MASTER_KEY_PENDING,
            KeyKind::Decoy => keys::DECOY_KEY_PENDING,
        }
    }

    fn journal_storage_key(kind: KeyKind) -> &'static str {
        match kind {
            KeyKind::Master => keys::MASTER_ROTATION_JOURNAL,
            KeyKind::Decoy => keys::DECOY_ROTATION_JOURNAL,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEY LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Return the key for `kind`, loading or generating it on first use
    pub async fn ensure_key(&self, kind: KeyKind) -> VaultResult<VaultKey> {
        let mut slot = self.slot(kind).lock().await;
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.read_key(Self::storage_key(kind)).await? {
            Some(key) => {
                log::debug!("Loaded {} key from secure store", kind);
                key
            }
            None => {
                let key = VaultKey::generate()?;
                self.write_key(Self::storage_key(kind), &key).await?;
                log::info!("Generated new {} key", kind);
                key
            }
        };

        *slot = Some(key.clone());
        Ok(key)
    }

    /// Whether a key for `kind` is cached in memory
    pub async fn is_loaded(&self, kind: KeyKind) -> bool {
        self.slot(kind).lock().await.is_some()
    }

    /// Replace the persisted and cached key for `kind`.
    ///
    /// Every ciphertext under the old key must already be migrated;
    /// `KeyRotationCoordinator` enforces that ordering.
    pub async fn replace_key(&self, kind: KeyKind, new_key: &VaultKey) -> VaultResult<()> {
        let mut slot = self.slot(kind).lock().await;
        self.write_key(Self::storage_key(kind), new_key).await?;
        *slot = Some(new_key.clone());
        log::info!("Committed rotated {} key", kind);
        Ok(())
    }

    /// Replace the master key after a completed rotation
    pub async fn rotate_master_key(&self, new_key: &VaultKey) -> VaultResult<()> {
        self.replace_key(KeyKind::Master, new_key).await
    }

    /// Persist a key that is about to take over from the current one
    pub async fn stage_pending(&self, kind: KeyKind, key: &VaultKey) -> VaultResult<()> {
        self.write_key(Self::pending_storage_key(kind), key).await
    }

    /// Key staged by an interrupted rotation, if any
    pub async fn pending_key(&self, kind: KeyKind) -> VaultResult<Option<VaultKey>> {
        self.read_key(Self::pending_storage_key(kind)).await
    }

    pub async fn discard_pending(&self, kind: KeyKind) -> VaultResult<()> {
        self.store
            .delete(Self::pending_storage_key(kind))
            .await
            .map_err(Self::unavailable)
    }

    /// Record the IV each file will carry under the pending key.
    ///
    /// Written before any original is replaced, so a commit interrupted
    /// before the index is updated can still be decrypted.
    pub async fn write_rotation_journal(
        &self,
        kind: KeyKind,
        ivs: &BTreeMap<String, [u8; IV_LEN]>,
    ) -> VaultResult<()> {
        let encoded: BTreeMap<&str, String> = ivs
            .iter()
            .map(|(id, iv)| (id.as_str(), hex::encode(iv)))
            .collect();
        let json = serde_json::to_string(&encoded)?;
        self.store
            .write(Self::journal_storage_key(kind), &json)
            .await
            .map_err(Self::unavailable)
    }

    /// IVs recorded by an interrupted rotation; empty when there is none
    pub async fn rotation_journal(&self, kind: KeyKind) -> VaultResult<BTreeMap<String, [u8; IV_LEN]>> {
        let raw = self
            .store
            .read(Self::journal_storage_key(kind))
            .await
            .map_err(Self::unavailable)?;
        let Some(json) = raw else {
            return Ok(BTreeMap::new());
        };

        let encoded: BTreeMap<String, String> = serde_json::from_str(&json)
            .map_err(|e| VaultError::KeyStoreUnavailable(format!("bad rotation journal: {}", e)))?;
        encoded
            .into_iter()
            .map(|(id, iv_hex)| {
                let iv = hex::decode(&iv_hex)
                    .ok()
                    .and_then(|bytes| <[u8; IV_LEN]>::try_from(bytes.as_slice()).ok())
                    .ok_or_else(|| {
                        VaultError::KeyStoreUnavailable(format!("bad journalled IV for {}", id))
                    })?;
                Ok((id, iv))
            })
            .collect()
    }

    pub async fn discard_rotation_journal(&self, kind: KeyKind) -> VaultResult<()> {
        self.store
            .delete(Self::journal_storage_key(kind))
            .await
            .map_err(Self::unavailable)
    }

    /// Delete both keys and every staged key, clearing the caches.
    ///
    /// Irreversible: every ciphertext in both vaults becomes unrecoverable.
    pub async fn reset_keys(&self) -> VaultResult<()> {
        for kind in KeyKind::ALL {
            let mut slot = self.slot(kind).lock().await;
            self.store
                .delete(Self::storage_key(kind))
                .await
                .map_err(Self::unavailable)?;
            self.store
                .delete(Self::pending_storage_key(kind))
                .await
                .map_err(Self::unavailable)?;
            self.discard_rotation_journal(kind).await?;
            *slot = None;
        }
        log::warn!("All vault keys deleted");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DERIVED-KEY SALTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Persisted salt for `label`, if one was created
    pub async fn salt(&self, label: &str) -> VaultResult<Option<[u8; SALT_LEN]>> {
        let raw = self
            .store
            .read(&format!("{}{}", keys::KDF_SALT_PREFIX, label))
            .await
            .map_err(Self::unavailable)?;

        match raw {
            Some(encoded) => {
                let bytes = B64
                    .decode(encoded)
                    .map_err(|e| VaultError::KeyStoreUnavailable(format!("bad salt: {}", e)))?;
                let salt: [u8; SALT_LEN] = bytes.as_slice().try_into().map_err(|_| {
                    VaultError::KeyStoreUnavailable(format!("salt '{}' has wrong length", label))
                })?;
                Ok(Some(salt))
            }
            None => Ok(None),
        }
    }

    /// Derive a password key under the salt stored for `label`,
    /// creating and persisting the salt on first use
    pub async fn derive_password_key(&self, label: &str, password: &str) -> VaultResult<DerivedKey> {
        let salt = {
            let _creating = self.salts.lock().await;
            match self.salt(label).await? {
                Some(salt) => salt,
                None => {
                    let salt = generate_salt()?;
                    self.store
                        .write(&format!("{}{}", keys::KDF_SALT_PREFIX, label), &B64.encode(salt))
                        .await
                        .map_err(Self::unavailable)?;
                    salt
                }
            }
        };

        let password = password.to_owned();
        tokio::task::spawn_blocking(move || derive_key(&password, Some(&salt)))
            .await
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    async fn read_key(&self, storage_key: &str) -> VaultResult<Option<VaultKey>> {
        let raw = self.store.read(storage_key).await.map_err(Self::unavailable)?;
        match raw {
            Some(encoded) => {
                let mut bytes = B64
                    .decode(encoded)
                    .map_err(|e| VaultError::KeyStoreUnavailable(format!("bad key encoding: {}", e)))?;
                let key = VaultKey::from_slice(&bytes);
                zeroize::Zeroize::zeroize(&mut bytes);
                key.map(Some)
                    .map_err(|e| VaultError::KeyStoreUnavailable(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn write_key(&self, storage_key: &str, key: &VaultKey) -> VaultResult<()> {
        let encoded = zeroize::Zeroizing::new(B64.encode(key.expose()));
        self.store
            .write(storage_key, &encoded)
            .await
            .map_err(Self::unavailable)
    }

    fn unavailable(e: VaultError) -> VaultError {
        match e {
            VaultError::KeyStoreUnavailable(_) => e,
            other => {
                log::error!("Secure store fault: {}", other);
                VaultError::KeyStoreUnavailable(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_store::MemorySecureStore;

    fn fixture() -> (Arc<MemorySecureStore>, KeyStore) {
        let store = Arc::new(MemorySecureStore::new());
        let keystore = KeyStore::new(store.clone());
        (store, keystore)
    }

    #[tokio::test]
    async fn test_ensure_key_generates_once() {
        let (store, keystore) = fixture();

        let k1 = keystore.ensure_key(KeyKind::Master).await.unwrap();
        let k2 = keystore.ensure_key(KeyKind::Master).await.unwrap();
        assert_eq!(k1, k2);

        let persisted = store.read(keys::MASTER_KEY).await.unwrap().unwrap();
        assert_eq!(B64.decode(persisted).unwrap(), k1.expose().to_vec());
    }

    #[tokio::test]
    async fn test_master_and_decoy_are_independent() {
        let (_, keystore) = fixture();
        let master = keystore.ensure_key(KeyKind::Master).await.unwrap();
        let decoy = keystore.ensure_key(KeyKind::Decoy).await.unwrap();
        assert_ne!(master, decoy);
    }

    #[tokio::test]
    async fn test_reload_from_store() {
        let store = Arc::new(MemorySecureStore::new());
        let first = KeyStore::new(store.clone())
            .ensure_key(KeyKind::Decoy)
            .await
            .unwrap();

        let second = KeyStore::new(store).ensure_key(KeyKind::Decoy).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_generates_one_key() {
        let (_, keystore) = fixture();
        let keystore = Arc::new(keystore);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ks = keystore.clone();
                tokio::spawn(async move { ks.ensure_key(KeyKind::Master).await.unwrap() })
            })
            .collect();

        let mut keys_seen = Vec::new();
        for handle in handles {
            keys_seen.push(handle.await.unwrap());
        }
        assert!(keys_seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_rotate_master_key() {
        let (store, keystore) = fixture();
        let old = keystore.ensure_key(KeyKind::Master).await.unwrap();
        let new = VaultKey::generate().unwrap();

        keystore.rotate_master_key(&new).await.unwrap();

        assert_eq!(keystore.ensure_key(KeyKind::Master).await.unwrap(), new);
        assert_ne!(keystore.ensure_key(KeyKind::Master).await.unwrap(), old);
        let reloaded = KeyStore::new(store).ensure_key(KeyKind::Master).await.unwrap();
        assert_eq!(reloaded, new);
    }

    #[tokio::test]
    async fn test_reset_keys() {
        let (store, keystore) = fixture();
        let old = keystore.ensure_key(KeyKind::Master).await.unwrap();
        keystore.ensure_key(KeyKind::Decoy).await.unwrap();
        keystore
            .stage_pending(KeyKind::Master, &VaultKey::generate().unwrap())
            .await
            .unwrap();

        keystore.reset_keys().await.unwrap();

        assert!(store.is_empty());
        assert!(!keystore.is_loaded(KeyKind::Master).await);
        let fresh = keystore.ensure_key(KeyKind::Master).await.unwrap();
        assert_ne!(fresh, old);
    }

    #[tokio::test]
    async fn test_pending_key_roundtrip() {
        let (_, keystore) = fixture();
        assert!(keystore.pending_key(KeyKind::Master).await.unwrap().is_none());

        let staged = VaultKey::generate().unwrap();
        keystore.stage_pending(KeyKind::Master, &staged).await.unwrap();
        assert_eq!(keystore.pending_key(KeyKind::Master).await.unwrap(), Some(staged));

        keystore.discard_pending(KeyKind::Master).await.unwrap();
        assert!(keystore.pending_key(KeyKind::Master).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_salt_persisted_per_label() {
        let (_, keystore) = fixture();
        assert!(keystore.salt("backup").await.unwrap().is_none());

        let first = keystore.derive_password_key("backup", "hunter22").await.unwrap();
        let second = keystore.derive_password_key("backup", "hunter22").await.unwrap();

        assert_eq!(keystore.salt("backup").await.unwrap(), Some(first.salt));
        assert_eq!(first.key, second.key);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_derivation_shares_one_salt() {
        let (_, keystore) = fixture();
        let keystore = Arc::new(keystore);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ks = keystore.clone();
                tokio::spawn(async move { ks.derive_password_key("unlock", "hunter22").await.unwrap() })
            })
            .collect();

        let mut derived = Vec::new();
        for handle in handles {
            derived.push(handle.await.unwrap());
        }

        let stored = keystore.salt("unlock").await.unwrap().unwrap();
        for d in &derived {
            assert_eq!(d.salt, stored);
            assert_eq!(d.key, derived[0].key);
        }
    }

    #[tokio::test]
    async fn test_rotation_journal() {
        let (store, keystore) = fixture();
        assert!(keystore.rotation_journal(KeyKind::Master).await.unwrap().is_empty());

        let mut ivs = BTreeMap::new();
        ivs.insert("a".to_string(), [7u8; IV_LEN]);
        ivs.insert("b".to_string(), [9u8; IV_LEN]);
        keystore.write_rotation_journal(KeyKind::Master, &ivs).await.unwrap();

        assert_eq!(keystore.rotation_journal(KeyKind::Master).await.unwrap(), ivs);
        assert!(keystore.rotation_journal(KeyKind::Decoy).await.unwrap().is_empty());

        keystore.discard_rotation_journal(KeyKind::Master).await.unwrap();
        assert!(keystore.rotation_journal(KeyKind::Master).await.unwrap().is_empty());

        store
            .write(keys::MASTER_ROTATION_JOURNAL, r#"{"a":"00ff"}"#)
            .await
            .unwrap();
        assert!(matches!(
            keystore.rotation_journal(KeyKind::Master).await,
            Err(VaultError::KeyStoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupted_key_is_unavailable() {
        let (store, keystore) = fixture();
        store.write(keys::MASTER_KEY, "dG9vIHNob3J0").await.unwrap();

        assert!(matches!(
            keystore.ensure_key(KeyKind::Master).await,
            Err(VaultError::KeyStoreUnavailable(_))
        ));
    }
}
