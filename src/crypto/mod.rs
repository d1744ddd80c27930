//! Decoy Vault - Cryptographic Core
//!
//! Stateless primitives: CSPRNG draws, PBKDF2, AES-256-CBC, SHA-256.

pub mod keys;
pub mod cipher;
pub mod kdf;
pub mod integrity;

pub use keys::*;
pub use cipher::*;
pub use kdf::*;
pub use integrity::*;
