//! # Storage Collaborator Contracts
//!
//! The vault state never talks to a database directly. It goes through two
//! narrow traits:
//!
//! - [`SecureStorage`] — wallet-scoped, validated, encrypted-at-rest values
//!   under one of three well-known [`StorageKey`]s.
//! - [`LegacyStorage`] — the plain, unscoped key-value API older builds
//!   wrote to. Only the migration pass reads it.
//!
//! On top of the raw traits sit [`get_secure_item`] and [`set_secure_item`],
//! which handle typing and shape validation and never return errors. A read
//! that fails yields the caller's default; a write that fails is logged.
//! Persisted state is best-effort and recoverable by reload.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::schema::Schema;
use super::StoreResult;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// The three collections the vault persists per wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    VaultPositions,
    UserBalances,
    EarningsHistory,
}

impl StorageKey {
    /// Every key, in load order.
    pub const ALL: [StorageKey; 3] = [
        StorageKey::VaultPositions,
        StorageKey::UserBalances,
        StorageKey::EarningsHistory,
    ];

    /// Wire name of the key. Also the legacy (unscoped) key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::VaultPositions => "vaultPositions",
            StorageKey::UserBalances => "userBalances",
            StorageKey::EarningsHistory => "earningsHistory",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Wallet-scoped storage for vault collections.
///
/// Implementations namespace every value by `address` and are free to
/// encrypt, compress, or relocate it. Values cross the boundary as JSON so
/// the typed layer can validate them element by element.
pub trait SecureStorage: Send + Sync {
    /// Reads the value stored under `key` for `address`, if any.
    fn get_secure_raw(&self, address: &str, key: StorageKey) -> StoreResult<Option<Value>>;

    /// Replaces the value stored under `key` for `address`.
    fn set_secure_raw(&self, address: &str, key: StorageKey, value: &Value) -> StoreResult<()>;
}

/// Plain, unscoped key-value storage left behind by older builds.
pub trait LegacyStorage: Send + Sync {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

    fn remove_item(&self, key: &str) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Reads and validates `key` for `address`.
///
/// Returns `default` when nothing is stored, the store fails, or the stored
/// value doesn't have the expected shape. Collections keep their valid
/// entries and drop the rest.
pub fn get_secure_item<T: Schema>(
    store: &dyn SecureStorage,
    address: &str,
    key: StorageKey,
    default: T,
) -> T {
    match store.get_secure_raw(address, key) {
        Ok(Some(value)) => match T::sanitize(value) {
            Some(item) => item,
            None => {
                warn!(%key, "stored value has unexpected shape, using default");
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!(%key, error = %e, "secure read failed, using default");
            default
        }
    }
}

/// Serializes `value` and writes it under `key` for `address`.
///
/// Fire-and-forget: failures are logged, not returned, and not retried.
pub fn set_secure_item<T: Serialize + ?Sized>(
    store: &dyn SecureStorage,
    address: &str,
    key: StorageKey,
    value: &T,
) {
    let json = match serde_json::to_value(value) {
        Ok(json) => json,
        Err(e) => {
            error!(%key, error = %e, "failed to serialize value for secure write");
            return;
        }
    };

    match store.set_secure_raw(address, key, &json) {
        Ok(()) => debug!(%key, "secure write complete"),
        Err(e) => error!(%key, error = %e, "secure write failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StoreError, VaultDB};
    use crate::vault::{UserBalances, VaultPosition};
    use serde_json::json;

    const ADDRESS: &str = "0x2222222222222222222222222222222222222222";

    struct BrokenStore;

    impl SecureStorage for BrokenStore {
        fn get_secure_raw(&self, _: &str, _: StorageKey) -> StoreResult<Option<Value>> {
            Err(StoreError::Serialization("disk on fire".to_string()))
        }

        fn set_secure_raw(&self, _: &str, _: StorageKey, _: &Value) -> StoreResult<()> {
            Err(StoreError::Serialization("disk on fire".to_string()))
        }
    }

    #[test]
    fn key_names_match_wire_format() {
        assert_eq!(StorageKey::VaultPositions.as_str(), "vaultPositions");
        assert_eq!(StorageKey::UserBalances.to_string(), "userBalances");
        assert_eq!(StorageKey::EarningsHistory.as_str(), "earningsHistory");
    }

    #[test]
    fn absent_value_yields_default() {
        let db = VaultDB::open_temporary().unwrap();
        let balances = get_secure_item(&db, ADDRESS, StorageKey::UserBalances, UserBalances::starting());
        assert_eq!(balances, UserBalances::starting());
    }

    #[test]
    fn typed_write_then_read() {
        let db = VaultDB::open_temporary().unwrap();
        set_secure_item(&db, ADDRESS, StorageKey::UserBalances, &UserBalances::new(0.4, 12.5));

        let balances = get_secure_item(&db, ADDRESS, StorageKey::UserBalances, UserBalances::starting());
        assert_eq!(balances, UserBalances::new(0.4, 12.5));
    }

    #[test]
    fn wrong_shape_yields_default() {
        let db = VaultDB::open_temporary().unwrap();
        db.set_secure_raw(ADDRESS, StorageKey::VaultPositions, &json!({"not": "a list"}))
            .unwrap();

        let positions: Vec<VaultPosition> =
            get_secure_item(&db, ADDRESS, StorageKey::VaultPositions, Vec::new());
        assert!(positions.is_empty());
    }

    #[test]
    fn store_failures_are_swallowed() {
        let balances = get_secure_item(
            &BrokenStore,
            ADDRESS,
            StorageKey::UserBalances,
            UserBalances::starting(),
        );
        assert_eq!(balances, UserBalances::starting());

        // Must not panic or propagate.
        set_secure_item(&BrokenStore, ADDRESS, StorageKey::UserBalances, &balances);
    }
}
