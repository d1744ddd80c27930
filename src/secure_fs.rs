//! Decoy Vault - Secure Filesystem Operations
//!
//! Atomic ciphertext writes and overwrite-then-delete removal.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::crypto::fill_random;
use crate::error::VaultResult;

/// Overwrite chunk size
const WIPE_CHUNK: usize = 1024 * 1024;

/// Result of a secure delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Overwritten, then unlinked
    Shredded,
    /// Overwrite failed; the file was still unlinked
    Degraded,
    /// Nothing existed at the path
    Missing,
}

/// Secure Filesystem Handler
#[derive(Debug, Clone)]
pub struct SecureFs {
    /// Overwrite passes before unlinking
    wipe_passes: u8,
}

impl Default for SecureFs {
    fn default() -> Self {
        Self { wipe_passes: 1 }
    }
}

impl SecureFs {
    pub fn new(wipe_passes: u8) -> Self {
        Self {
            wipe_passes: wipe_passes.max(1),
        }
    }

    /// Write a file atomically: temp sibling, fsync, rename.
    ///
    /// A crash leaves either the old content or the new, never a mix.
    pub async fn write_atomic(&self, path: &Path, data: &[u8]) -> VaultResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_sibling(path);
        write_synced(&temp_path, data).await?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Write a file and fsync it, no rename
    pub async fn write_staged(&self, path: &Path, data: &[u8]) -> VaultResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_synced(path, data).await?;
        Ok(())
    }

    /// Move a staged file over `dest`.
    ///
    /// Falls back to an atomic copy when the two paths are on different
    /// filesystems.
    pub async fn promote(&self, staged: &Path, dest: &Path) -> VaultResult<()> {
        match fs::rename(staged, dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                log::debug!("rename {} failed ({}), copying instead", staged.display(), e);
                let data = fs::read(staged).await?;
                self.write_atomic(dest, &data).await?;
                fs::remove_file(staged).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a file, `None` if it does not exist
    pub async fn read_optional(&self, path: &Path) -> VaultResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite a file with random bytes, then unlink it.
    ///
    /// If the overwrite fails the file is still removed and the degraded
    /// guarantee is logged.
    pub async fn secure_delete(&self, path: &Path) -> VaultResult<DeleteOutcome> {
        let len = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DeleteOutcome::Missing),
            Err(e) => return Err(e.into()),
        };

        let overwrite = self.overwrite(path, len).await;
        remove_after_overwrite(path, overwrite).await
    }

    async fn overwrite(&self, path: &Path, len: u64) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path).await?;
        let mut chunk = vec![0u8; (len as usize).min(WIPE_CHUNK)];

        for _ in 0..self.wipe_passes {
            file.seek(io::SeekFrom::Start(0)).await?;
            let mut remaining = len;
            while remaining > 0 {
                let n = (remaining as usize).min(chunk.len());
                fill_random(&mut chunk[..n])
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                file.write_all(&chunk[..n]).await?;
                remaining -= n as u64;
            }
            file.sync_all().await?;
        }
        Ok(())
    }
}

/// Unlink `path` whatever the overwrite step reported
pub(crate) async fn remove_after_overwrite(
    path: &Path,
    overwrite: io::Result<()>,
) -> VaultResult<DeleteOutcome> {
    let outcome = match overwrite {
        Ok(()) => DeleteOutcome::Shredded,
        Err(e) => {
            log::warn!(
                "Overwrite of {} failed ({}); falling back to plain delete",
                path.display(),
                e
            );
            DeleteOutcome::Degraded
        }
    };

    match fs::remove_file(path).await {
        Ok(()) => Ok(outcome),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(outcome),
        Err(e) => Err(e.into()),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await
}
