//! # VaultDB — Encrypted Persistent Storage
//!
//! The concrete storage collaborator, built on sled's embedded key-value
//! store. Implements both [`SecureStorage`] and [`LegacyStorage`].
//!
//! ## Tree Layout
//!
//! | Tree       | Key                          | Value                         |
//! |------------|------------------------------|-------------------------------|
//! | `secure`   | `slot_id(address):key`       | `nonce ‖ AES-GCM(json)`       |
//! | `legacy`   | key (UTF-8)                  | JSON text, unencrypted        |
//! | `metadata` | key (UTF-8)                  | value (bytes)                 |
//!
//! `slot_id` is a BLAKE3 digest, so wallet addresses never appear on disk.
//! Each wallet gets its own AES key, derived from a random master key that
//! is created on first open and kept in `metadata`. The full tree key is
//! bound to the ciphertext as associated data.
//!
//! Writes are not flushed individually; sled syncs in the background. Call
//! [`VaultDB::flush`] where durability matters.
//!
//! The master key sits next to the data it protects. That keeps records
//! opaque to anything that isn't this store, which is the bar browser
//! "secure storage" set; it is not protection against someone holding the
//! whole database directory.

use rand::RngCore;
use serde_json::Value;
use sled::{Db, Tree};
use std::path::Path;

use super::secure::{LegacyStorage, SecureStorage, StorageKey};
use super::{StoreError, StoreResult};
use crate::config::MASTER_KEY_LENGTH;
use crate::crypto::{derive_wallet_key, open, seal, slot_id};

/// Well-known key in the `metadata` tree holding the master key.
const META_MASTER_KEY: &[u8] = b"master_key";

/// Persistent, encrypted storage for vault collections.
///
/// Cheap to clone: sled handles are reference counted, and every clone
/// shares the same master key.
#[derive(Debug, Clone)]
pub struct VaultDB {
    db: Db,
    secure: Tree,
    legacy: Tree,
    master_key: [u8; MASTER_KEY_LENGTH],
}

impl VaultDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// Ideal for unit tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let secure = db.open_tree("secure")?;
        let legacy = db.open_tree("legacy")?;
        let metadata = db.open_tree("metadata")?;
        let master_key = load_or_create_master_key(&metadata)?;

        Ok(Self {
            db,
            secure,
            legacy,
            master_key,
        })
    }

    fn slot_key(address: &str, key: StorageKey) -> String {
        format!("{}:{}", slot_id(address), key.as_str())
    }

    // -- Legacy seeding -----------------------------------------------------

    /// Writes a plain, unscoped legacy value.
    ///
    /// Nothing in the engine writes legacy data; this exists for importing
    /// records exported by older builds and for tests.
    pub fn put_legacy_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.legacy.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    // -- Utility operations -------------------------------------------------

    /// Number of sealed values across all wallets.
    pub fn secure_count(&self) -> usize {
        self.secure.len()
    }

    /// Number of legacy values still waiting for migration.
    pub fn legacy_count(&self) -> usize {
        self.legacy.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn load_or_create_master_key(metadata: &Tree) -> StoreResult<[u8; MASTER_KEY_LENGTH]> {
    if metadata.get(META_MASTER_KEY)?.is_none() {
        let mut fresh = [0u8; MASTER_KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut fresh);
        // Lose the race gracefully if another handle created one first.
        let _ = metadata.compare_and_swap(
            META_MASTER_KEY,
            None as Option<&[u8]>,
            Some(&fresh[..]),
        )?;
        metadata.flush()?;
    }

    let stored = metadata
        .get(META_MASTER_KEY)?
        .ok_or_else(|| StoreError::Corrupt("master key vanished after creation".to_string()))?;
    <[u8; MASTER_KEY_LENGTH]>::try_from(&stored[..])
        .map_err(|_| StoreError::Corrupt("master key has the wrong length".to_string()))
}

impl SecureStorage for VaultDB {
    fn get_secure_raw(&self, address: &str, key: StorageKey) -> StoreResult<Option<Value>> {
        let slot = Self::slot_key(address, key);
        let Some(sealed) = self.secure.get(slot.as_bytes())? else {
            return Ok(None);
        };

        let wallet_key = derive_wallet_key(&self.master_key, address);
        let plaintext = open(&wallet_key, &sealed, slot.as_bytes())?;
        let value = serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(value))
    }

    fn set_secure_raw(&self, address: &str, key: StorageKey, value: &Value) -> StoreResult<()> {
        let slot = Self::slot_key(address, key);
        let plaintext =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let wallet_key = derive_wallet_key(&self.master_key, address);
        let sealed = seal(&wallet_key, &plaintext, slot.as_bytes())?;

        self.secure.insert(slot.as_bytes(), sealed)?;
        Ok(())
    }
}

impl LegacyStorage for VaultDB {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        match self.legacy.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.legacy.remove(key.as_bytes())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
