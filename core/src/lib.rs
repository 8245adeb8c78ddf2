// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # LSTVault — Core Library
//!
//! The state engine behind the lstBTC vault simulator: deposit wBTC and
//! stCORE, watch simulated yield accrue, close out to a history of what you
//! earned. Nothing here touches a chain. Prices are fixed, yields are
//! simple interest, and the "wallet" is whatever address you hand it.
//!
//! What it does take seriously is the bookkeeping. Every wallet's records
//! live in their own encrypted namespace, nothing is written before a
//! wallet's data has finished loading, and an accrual pass can run twice
//! without paying out twice.
//!
//! ## Architecture
//!
//! - **vault** — Positions, balances, history, accrual math, `VaultState`.
//! - **storage** — Storage traits, schema validation, sled-backed `VaultDB`,
//!   legacy migration.
//! - **crypto** — AES-256-GCM sealing and BLAKE3 key/slot derivation.
//! - **wallet** — The connection signal the provider follows.
//! - **provider** — Session lifecycle, debounced write-back, scheduled
//!   accrual, and the `VaultHandle` consumers use.
//! - **config** — Prices, defaults, timers, tolerances.
//!
//! ## Design Philosophy
//!
//! 1. Not loaded means hands off. No mutation before readiness.
//! 2. Storage is best-effort. A failed read yields defaults, a failed write
//!    is logged, and the UI never sees an error from either.
//! 3. If it touches money, even pretend money, it has tests.

pub mod config;
pub mod crypto;
pub mod provider;
pub mod storage;
pub mod vault;
pub mod wallet;

pub use provider::{VaultHandle, VaultProvider};
