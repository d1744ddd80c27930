//! # Decoy Vault
//!
//! Encrypted personal file vault with a disguise (decoy) vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       VAULT ENGINE                        │
//! │  ┌────────────────────┐        ┌──────────────────────┐   │
//! │  │ DECOY ACCESS       │───────▶│ active selector      │   │
//! │  │ CONTROLLER         │        │ Real | Decoy         │   │
//! │  └────────────────────┘        └──────────┬───────────┘   │
//! │                                           │               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────┴───────────┐   │
//! │  │ KEY ROTATION │  │ FILE CIPHER  │  │ VAULT INDEX    │   │
//! │  │ (staged)     │  │ 3-stage I/O  │  │ (SQLite)       │   │
//! │  └──────┬───────┘  └──────┬───────┘  └────────────────┘   │
//! │         │   VAULT GATE    │                               │
//! │  ┌──────┴─────────────────┴─────────────────────────────┐ │
//! │  │ KEY STORE: master key / decoy key / PBKDF2 salts     │ │
//! │  └──────────────────────┬───────────────────────────────┘ │
//! │                   SECURE STORE                            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Files encrypted with AES-256-CBC + PKCS7, fresh IV per encryption
//! - Separate master and decoy keys; a decoy record never meets the master key
//! - IVs live in the index, ciphertext files carry no header
//! - Credentials stored only as SHA-256 digests
//! - Key rotation stages every file before replacing anything
//! - Plaintext buffers zeroized after use

pub mod config;
pub mod crypto;
pub mod decoy;
pub mod engine;
pub mod error;
pub mod file_cipher;
pub mod gate;
pub mod index;
pub mod keystore;
pub mod rotation;
pub mod secure_fs;
pub mod secure_store;

pub use config::EngineConfig;
pub use crypto::{constant_time_eq, CipherEnvelope, DerivedKey, KeyKind, VaultKey};
pub use decoy::{
    AccessDecision, AccessMode, CredentialCheck, CredentialKind, CredentialVerifier,
    DecoyAccessController, DecoySettings, PanicAction, PanicClearReport,
};
pub use engine::VaultEngine;
pub use error::{VaultError, VaultResult};
pub use file_cipher::{CipherProgress, CipherStage, DecryptedFile, EncryptedFile, FileCipher};
pub use gate::VaultGate;
pub use index::{
    FileKind, MemoryVaultIndex, SqliteVaultIndex, VaultFileRecord, VaultIndex, VaultSelector,
};
pub use keystore::KeyStore;
pub use rotation::{KeyRotationCoordinator, RotationOutcome, RotationPhase, RotationProgress};
pub use secure_fs::{DeleteOutcome, SecureFs};
pub use secure_store::{FileSecureStore, MemorySecureStore, SecureStore};

/// Decoy Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
