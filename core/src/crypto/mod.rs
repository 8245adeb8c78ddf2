//! # Storage Cryptography
//!
//! Everything the vault store needs to keep a wallet's records private at
//! rest: AES-256-GCM for sealing values, BLAKE3 for deriving per-wallet keys
//! and naming slots.
//!
//! Thin wrappers around audited crates. Nothing clever lives here, and
//! nothing clever should.

pub mod encryption;
pub mod hash;

pub use encryption::{open, seal, CryptoError};
pub use hash::{derive_wallet_key, slot_id};
