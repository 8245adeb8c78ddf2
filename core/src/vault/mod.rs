//! # Vault Module — Positions, Accrual & the Per-Wallet Record Store
//!
//! This is where the simulated money lives. A connected wallet owns a set
//! of open positions, a pair of free balances, and a history of positions
//! it has closed. This module defines those records, the arithmetic that
//! grows them, and the container that keeps them consistent.
//!
//! ## Architecture
//!
//! ```text
//! position.rs — VaultPosition, NewPosition, EarningsHistory, UserBalances
//! accrual.rs  — pure simple-interest accrual and rounding helpers
//! state.rs    — VaultState: readiness gate, mutators, accrual passes, totals
//! ```
//!
//! ## Design Principles
//!
//! 1. **Valuation is frozen at deposit.** `initial_value` is computed once
//!    with the fixed wBTC price and never revisited.
//!
//! 2. **Accrual is recomputed, not accumulated.** Every pass derives
//!    earnings from the deposit date and the clock, so running it twice
//!    cannot double-count.
//!
//! 3. **Not ready means hands off.** Until a wallet's data is loaded,
//!    mutators are no-ops and totals read zero.

pub mod accrual;
pub mod position;
pub mod state;

pub use accrual::{compute_accrual, parse_apy, round2, round6, Accrual, AccrualError};
pub use position::{
    deposit_value, quote_lstbtc, EarningsHistory, NewPosition, UserBalances, VaultPosition,
};
pub use state::{AccrualOutcome, AccrualSkip, LoadedVault, VaultError, VaultState};
