//! # Storage Module
//!
//! Where a wallet's vault records go between sessions.
//!
//! ## Architecture
//!
//! ```text
//! secure.rs    — SecureStorage / LegacyStorage traits, StorageKey, typed get/set
//! schema.rs    — shape validation for values read back from storage
//! db.rs        — VaultDB: sled + AES-256-GCM implementation of both traits
//! migration.rs — one-time move of legacy records into secure storage
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! connect ─→ migrate_legacy ─→ get_secure_item ×3 ─→ VaultState
//!                                                       │ change
//!                                                       ▼
//!                              set_secure_item ←── debounce (1s)
//! ```
//!
//! ## Design Decisions
//!
//! 1. **JSON at the trait boundary.** Collections are validated entry by
//!    entry, which needs a self-describing format. It is also what the web
//!    product stored, so legacy records need no conversion.
//!
//! 2. **Errors stop at the typed helpers.** The raw traits return
//!    [`StoreResult`]; `get_secure_item` / `set_secure_item` log and move
//!    on. Nothing upstream has to care that a disk hiccupped.

pub mod db;
pub mod migration;
pub mod schema;
pub mod secure;

pub use db::VaultDB;
pub use migration::{migrate_legacy, MigrationReport};
pub use schema::Schema;
pub use secure::{get_secure_item, set_secure_item, LegacyStorage, SecureStorage, StorageKey};

use crate::crypto::CryptoError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
