//! Decoy Vault - File Index
//!
//! Metadata store for vault file records. The engine only ever resolves
//! records by opaque logical ID or lists them per vault selector.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyKind, IV_LEN};
use crate::error::{VaultError, VaultResult};

/// Which vault a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultSelector {
    Real,
    Decoy,
}

impl VaultSelector {
    /// The only key allowed to decrypt records of this vault
    pub fn key_kind(&self) -> KeyKind {
        match self {
            VaultSelector::Real => KeyKind::Master,
            VaultSelector::Decoy => KeyKind::Decoy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VaultSelector::Real => "real",
            VaultSelector::Decoy => "decoy",
        }
    }
}

impl fmt::Display for VaultSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VaultSelector {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" => Ok(VaultSelector::Real),
            "decoy" => Ok(VaultSelector::Decoy),
            other => Err(VaultError::SerializationError(format!(
                "unknown vault selector '{}'",
                other
            ))),
        }
    }
}

/// Declared file kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Document,
    Other,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Document => "document",
            FileKind::Other => "other",
        }
    }

    /// Guess from a file extension; the import pipeline may know better
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" | "heif" | "bmp" => FileKind::Image,
            "mp4" | "mov" | "mkv" | "webm" | "avi" | "3gp" => FileKind::Video,
            "pdf" | "doc" | "docx" | "txt" | "md" | "odt" | "xls" | "xlsx" | "ppt" | "pptx" => {
                FileKind::Document
            }
            _ => FileKind::Other,
        }
    }
}

impl FromStr for FileKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(FileKind::Image),
            "video" => Ok(FileKind::Video),
            "document" => Ok(FileKind::Document),
            "other" => Ok(FileKind::Other),
            other => Err(VaultError::SerializationError(format!(
                "unknown file kind '{}'",
                other
            ))),
        }
    }
}

/// One encrypted file in a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFileRecord {
    /// Opaque logical ID
    pub id: String,
    /// Ciphertext location on durable storage
    pub ciphertext_path: PathBuf,
    /// IV needed, with the vault's key, to decrypt
    pub iv: [u8; IV_LEN],
    pub kind: FileKind,
    pub vault_selector: VaultSelector,
    /// Hex SHA-256 of the plaintext, computed at encrypt time
    pub integrity_hash: String,
    pub original_name: String,
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
    pub created_at: DateTime<Utc>,
}

impl VaultFileRecord {
    /// Record for a freshly encrypted file
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        ciphertext_path: PathBuf,
        iv: [u8; IV_LEN],
        kind: FileKind,
        vault_selector: VaultSelector,
        integrity_hash: String,
        original_name: impl Into<String>,
        plaintext_size: u64,
        ciphertext_size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            ciphertext_path,
            iv,
            kind,
            vault_selector,
            integrity_hash,
            original_name: original_name.into(),
            plaintext_size,
            ciphertext_size,
            created_at: Utc::now(),
        }
    }

    /// Copy with a new envelope location, used only by key rotation
    pub(crate) fn with_envelope(&self, iv: [u8; IV_LEN], ciphertext_size: u64) -> Self {
        Self {
            iv,
            ciphertext_size,
            ..self.clone()
        }
    }
}

/// Metadata store contract consumed by the engine
#[async_trait]
pub trait VaultIndex: Send + Sync {
    /// Look up a record by logical ID
    async fn resolve(&self, id: &str) -> VaultResult<VaultFileRecord>;
    /// Insert or replace a record
    async fn persist(&self, record: &VaultFileRecord) -> VaultResult<()>;
    /// Drop a record; missing IDs are not an error
    async fn delete(&self, id: &str) -> VaultResult<()>;
    /// Every record of one vault, oldest first
    async fn list_by_selector(&self, selector: VaultSelector) -> VaultResult<Vec<VaultFileRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY INDEX
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryVaultIndex {
    records: Mutex<HashMap<String, VaultFileRecord>>,
}

impl MemoryVaultIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VaultIndex for MemoryVaultIndex {
    async fn resolve(&self, id: &str) -> VaultResult<VaultFileRecord> {
        self.records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::RecordNotFound(id.to_string()))
    }

    async fn persist(&self, record: &VaultFileRecord) -> VaultResult<()> {
        self.records.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> VaultResult<()> {
        self.records.lock().remove(id);
        Ok(())
    }

    async fn list_by_selector(&self, selector: VaultSelector) -> VaultResult<Vec<VaultFileRecord>> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .values()
            .filter(|r| r.vault_selector == selector)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE INDEX
// ═══════════════════════════════════════════════════════════════════════════

/// SQLite-backed index
pub struct SqliteVaultIndex {
    conn: Mutex<Connection>,
}

impl SqliteVaultIndex {
    /// Open or create the index database
    pub fn open(db_path: &Path) -> VaultResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// Index that lives only as long as the process
    pub fn in_memory() -> VaultResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> VaultResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                ciphertext_path TEXT NOT NULL,
                iv TEXT NOT NULL,
                kind TEXT NOT NULL,
                vault TEXT NOT NULL,
                integrity_hash TEXT NOT NULL,
                original_name TEXT NOT NULL,
                plaintext_size INTEGER NOT NULL,
                ciphertext_size INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_vault ON files(vault, created_at);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            id: row.get(0)?,
            ciphertext_path: row.get(1)?,
            iv: row.get(2)?,
            kind: row.get(3)?,
            vault: row.get(4)?,
            integrity_hash: row.get(5)?,
            original_name: row.get(6)?,
            plaintext_size: row.get(7)?,
            ciphertext_size: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    /// Count records in one vault
    pub fn count(&self, selector: VaultSelector) -> VaultResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE vault = ?1",
            params![selector.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, ciphertext_path, iv, kind, vault, integrity_hash, \
     original_name, plaintext_size, ciphertext_size, created_at FROM files";

/// Row as stored, before parsing into typed fields
struct RawRow {
    id: String,
    ciphertext_path: String,
    iv: String,
    kind: String,
    vault: String,
    integrity_hash: String,
    original_name: String,
    plaintext_size: i64,
    ciphertext_size: i64,
    created_at: String,
}

impl TryFrom<RawRow> for VaultFileRecord {
    type Error = VaultError;

    fn try_from(raw: RawRow) -> Result<Self, Self::Error> {
        let iv_bytes = hex::decode(&raw.iv)
            .map_err(|e| VaultError::SerializationError(format!("record {}: bad iv: {}", raw.id, e)))?;
        let iv: [u8; IV_LEN] = iv_bytes.as_slice().try_into().map_err(|_| {
            VaultError::SerializationError(format!("record {}: iv has wrong length", raw.id))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
            .map_err(|e| VaultError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(VaultFileRecord {
            ciphertext_path: PathBuf::from(raw.ciphertext_path),
            iv,
            kind: raw.kind.parse()?,
            vault_selector: raw.vault.parse()?,
            integrity_hash: raw.integrity_hash,
            original_name: raw.original_name,
            plaintext_size: raw.plaintext_size as u64,
            ciphertext_size: raw.ciphertext_size as u64,
            created_at,
            id: raw.id,
        })
    }
}

#[async_trait]
impl VaultIndex for SqliteVaultIndex {
    async fn resolve(&self, id: &str) -> VaultResult<VaultFileRecord> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()?
        };

        raw.ok_or_else(|| VaultError::RecordNotFound(id.to_string()))?
            .try_into()
    }

    async fn persist(&self, record: &VaultFileRecord) -> VaultResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO files (id, ciphertext_path, iv, kind, vault, integrity_hash, \
             original_name, plaintext_size, ciphertext_size, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.ciphertext_path.to_string_lossy(),
                hex::encode(record.iv),
                record.kind.as_str(),
                record.vault_selector.as_str(),
                record.integrity_hash,
                record.original_name,
                record.plaintext_size as i64,
                record.ciphertext_size as i64,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> VaultResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn list_by_selector(&self, selector: VaultSelector) -> VaultResult<Vec<VaultFileRecord>> {
        let raws = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&format!(
                "{} WHERE vault = ?1 ORDER BY created_at ASC, id ASC",
                SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![selector.as_str()], Self::row_to_record)?;
            let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            collected
        };

        raws.into_iter().map(VaultFileRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, selector: VaultSelector) -> VaultFileRecord {
        VaultFileRecord::new(
            id,
            PathBuf::from(format!("/vault/files/{}.enc", id)),
            [id.len() as u8; IV_LEN],
            FileKind::Image,
            selector,
            "ab".repeat(32),
            format!("{}.jpg", id),
            10,
            16,
        )
    }

    async fn exercise(index: &dyn VaultIndex) {
        index.persist(&record("a", VaultSelector::Real)).await.unwrap();
        index.persist(&record("bb", VaultSelector::Decoy)).await.unwrap();
        index.persist(&record("ccc", VaultSelector::Real)).await.unwrap();

        let resolved = index.resolve("bb").await.unwrap();
        assert_eq!(resolved.vault_selector, VaultSelector::Decoy);
        assert_eq!(resolved.iv, [2u8; IV_LEN]);

        let real: Vec<_> = index
            .list_by_selector(VaultSelector::Real)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(real.len(), 2);
        assert!(real.contains(&"a".to_string()) && real.contains(&"ccc".to_string()));

        index.delete("a").await.unwrap();
        index.delete("a").await.unwrap();
        assert!(matches!(index.resolve("a").await, Err(VaultError::RecordNotFound(_))));
        assert_eq!(index.list_by_selector(VaultSelector::Decoy).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_index() {
        exercise(&MemoryVaultIndex::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_index() {
        let index = SqliteVaultIndex::in_memory().unwrap();
        exercise(&index).await;
        assert_eq!(index.count(VaultSelector::Real).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_roundtrips_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let original = record("photo", VaultSelector::Real);
        {
            let index = SqliteVaultIndex::open(&dir.path().join("db").join("index.db")).unwrap();
            index.persist(&original).await.unwrap();
        }

        let index = SqliteVaultIndex::open(&dir.path().join("db").join("index.db")).unwrap();
        let loaded = index.resolve("photo").await.unwrap();
        assert_eq!(loaded.ciphertext_path, original.ciphertext_path);
        assert_eq!(loaded.iv, original.iv);
        assert_eq!(loaded.integrity_hash, original.integrity_hash);
        assert_eq!(loaded.created_at.timestamp_micros(), original.created_at.timestamp_micros());
    }

    #[test]
    fn test_selector_key_binding() {
        assert_eq!(VaultSelector::Real.key_kind(), KeyKind::Master);
        assert_eq!(VaultSelector::Decoy.key_kind(), KeyKind::Decoy);
        assert_eq!("decoy".parse::<VaultSelector>().unwrap(), VaultSelector::Decoy);
        assert!("both".parse::<VaultSelector>().is_err());
    }

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_extension(Path::new("a/IMG_1.JPG")), FileKind::Image);
        assert_eq!(FileKind::from_extension(Path::new("clip.mp4")), FileKind::Video);
        assert_eq!(FileKind::from_extension(Path::new("tax.pdf")), FileKind::Document);
        assert_eq!(FileKind::from_extension(Path::new("blob")), FileKind::Other);
    }
}
