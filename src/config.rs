//! Decoy Vault - Engine Configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::secure_fs::SecureFs;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Vault root directory
    pub vault_root: PathBuf,
    /// Where ciphertext files live
    pub ciphertext_dir: PathBuf,
    /// Scratch space for key rotation
    pub staging_dir: PathBuf,
    /// Secure key-value store file
    pub secure_store_path: PathBuf,
    /// SQLite index database
    pub index_path: PathBuf,
    /// Overwrite passes before a file is unlinked
    pub secure_delete_passes: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_root("./vault")
    }
}

impl EngineConfig {
    /// Derive every path from a single vault root
    pub fn for_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            vault_root: root.to_path_buf(),
            ciphertext_dir: root.join("files"),
            staging_dir: root.join("staging"),
            secure_store_path: root.join("keystore.json"),
            index_path: root.join("index.db"),
            secure_delete_passes: 1,
        }
    }

    /// Load from a JSON file; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();
        let config: Self = match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON, atomically
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> VaultResult<()> {
        self.validate()?;
        let json = serde_json::to_vec_pretty(self)?;
        SecureFs::default().write_atomic(path.as_ref(), &json).await
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.secure_delete_passes == 0 {
            return Err(VaultError::SerializationError(
                "secure_delete_passes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn secure_fs(&self) -> SecureFs {
        SecureFs::new(self.secure_delete_passes)
    }
}
