//! # Key Derivation & Slot Naming
//!
//! BLAKE3 does both jobs here: a keyed hash turns the store's master key
//! into one AES key per wallet, and a plain hash turns a wallet address into
//! an opaque slot prefix so addresses never sit on disk in the clear.

use crate::config::{AES_KEY_LENGTH, MASTER_KEY_LENGTH};

/// Derive the per-wallet sealing key from the store master key.
///
/// Deterministic: the same master and address always give the same key,
/// which is what lets a reconnecting wallet read its own data back.
pub fn derive_wallet_key(
    master: &[u8; MASTER_KEY_LENGTH],
    address: &str,
) -> [u8; AES_KEY_LENGTH] {
    *blake3::keyed_hash(master, address.as_bytes()).as_bytes()
}

/// Opaque, stable identifier for a wallet's storage slot.
///
/// Lower-case hex BLAKE3 digest of the address.
pub fn slot_id(address: &str) -> String {
    blake3::hash(address.as_bytes()).to_hex().to_string()
}
