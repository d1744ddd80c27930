//! Decoy Vault - Secure Key-Value Store
//!
//! String-keyed, string-valued storage for key material and decoy settings.
//! On a device this is backed by the platform keystore; the file-backed
//! store here covers desktop use and the admin binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{VaultError, VaultResult};

/// Storage keys used by the engine
pub mod keys {
    /// base64 256-bit master key
    pub const MASTER_KEY: &str = "master_key";
    /// base64 256-bit decoy key
    pub const DECOY_KEY: &str = "decoy_key";
    /// base64 key staged during a rotation commit
    pub const MASTER_KEY_PENDING: &str = "master_key_pending";
    pub const DECOY_KEY_PENDING: &str = "decoy_key_pending";
    /// JSON map of file ID to hex IV, written before a rotation commit
    pub const MASTER_ROTATION_JOURNAL: &str = "master_rotation_journal";
    pub const DECOY_ROTATION_JOURNAL: &str = "decoy_rotation_journal";
    /// `"true"` / `"false"`
    pub const DECOY_MODE_ENABLED: &str = "decoy_mode_enabled";
    /// hex SHA-256
    pub const DECOY_PIN_HASH: &str = "decoy_pin_hash";
    /// hex SHA-256
    pub const DECOY_PASSWORD_HASH: &str = "decoy_password_hash";
    /// `"real"` / `"decoy"`
    pub const LAST_ACCESS_MODE: &str = "last_access_mode";
    /// JSON `DecoySettings`
    pub const DECOY_SETTINGS: &str = "decoy_settings";
    /// Prefix for persisted PBKDF2 salts (base64)
    pub const KDF_SALT_PREFIX: &str = "kdf_salt_";
}

/// Platform-backed secure storage.
///
/// Only `KeyStore` and `DecoyAccessController` talk to this.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn read(&self, key: &str) -> VaultResult<Option<String>>;
    async fn write(&self, key: &str, value: &str) -> VaultResult<()>;
    async fn delete(&self, key: &str) -> VaultResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Volatile store, used in tests and for ephemeral sessions
#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn read(&self, key: &str) -> VaultResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> VaultResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE-BACKED STORE
// ═══════════════════════════════════════════════════════════════════════════

/// JSON map persisted in a single owner-only file.
///
/// Relies on the OS for at-rest protection of the file itself.
pub struct FileSecureStore {
    path: PathBuf,
    entries: tokio::sync::Mutex<Option<HashMap<String, String>>>,
}

impl FileSecureStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> VaultResult<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| VaultError::KeyStoreUnavailable(format!("corrupted store: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(VaultError::KeyStoreUnavailable(e.to_string())),
        }
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> VaultResult<()> {
        let data = serde_json::to_vec(entries)?;
        write_private(&self.path, &data)
            .await
            .map_err(|e| VaultError::KeyStoreUnavailable(e.to_string()))
    }

    async fn with_entries<T>(
        &self,
        mutate: bool,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> VaultResult<T> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard
            .as_mut()
            .ok_or_else(|| VaultError::KeyStoreUnavailable("store not loaded".into()))?;

        if !mutate {
            return Ok(f(entries));
        }

        // The cache only takes the change once it is on disk
        let mut updated = entries.clone();
        let result = f(&mut updated);
        self.persist(&updated).await?;
        *entries = updated;
        Ok(result)
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn read(&self, key: &str) -> VaultResult<Option<String>> {
        self.with_entries(false, |entries| entries.get(key).cloned()).await
    }

    async fn write(&self, key: &str, value: &str) -> VaultResult<()> {
        self.with_entries(true, |entries| {
            entries.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn delete(&self, key: &str) -> VaultResult<()> {
        self.with_entries(true, |entries| {
            entries.remove(key);
        })
        .await
    }
}

/// Write via temp file + rename, owner-only permissions on Unix
async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}
