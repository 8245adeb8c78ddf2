//! One-time move of legacy (unscoped, unencrypted) records into secure
//! storage.
//!
//! Older builds kept the three vault collections under bare key names with
//! no wallet scoping. The first wallet to connect after an upgrade adopts
//! whatever is there: each key is parsed, written to that wallet's secure
//! slot, and deleted from the legacy store.
//!
//! Best-effort per key. A key that can't be read, parsed, or written is
//! logged and left in place; the others carry on.

use tracing::{info, warn};

use super::secure::{LegacyStorage, SecureStorage, StorageKey};
use super::{StoreError, StoreResult};

/// What a migration pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Keys moved into secure storage and removed from the legacy store.
    pub migrated: Vec<StorageKey>,
    /// Keys whose migration failed. Their legacy copies are untouched.
    pub failed: Vec<StorageKey>,
}

impl MigrationReport {
    /// `true` when there was nothing to migrate and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.migrated.is_empty() && self.failed.is_empty()
    }
}

/// Moves every legacy collection into `address`'s secure slots.
pub fn migrate_legacy(
    legacy: &dyn LegacyStorage,
    secure: &dyn SecureStorage,
    address: &str,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    for key in StorageKey::ALL {
        match migrate_key(legacy, secure, address, key) {
            Ok(true) => {
                info!(%key, "legacy record migrated to secure storage");
                report.migrated.push(key);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(%key, error = %e, "legacy migration failed, key skipped");
                report.failed.push(key);
            }
        }
    }

    report
}

fn migrate_key(
    legacy: &dyn LegacyStorage,
    secure: &dyn SecureStorage,
    address: &str,
    key: StorageKey,
) -> StoreResult<bool> {
    let Some(raw) = legacy.get_item(key.as_str())? else {
        return Ok(false);
    };

    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
    secure.set_secure_raw(address, key, &value)?;
    legacy.remove_item(key.as_str())?;
    Ok(true)
}
