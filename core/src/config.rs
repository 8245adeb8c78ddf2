//! # Engine Configuration & Constants
//!
//! Every magic number in LSTVault lives here. Prices, timers, rounding
//! tolerances, the defaults a brand-new wallet starts with. If you're
//! hardcoding one of these somewhere else, move it here instead.
//!
//! The timer values are the production cadence. Tests shrink them through
//! [`ProviderConfig`] rather than editing the constants.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Fixed wBTC price in stCORE-denominated value units.
///
/// The simulation has no price feed. Every deposit is valued at this price
/// when it is created and that valuation is never revisited.
pub const WBTC_PRICE: f64 = 43_000.0;

/// Days per year used to turn an APY into a daily rate.
pub const DAYS_PER_YEAR: f64 = 365.0;

// ---------------------------------------------------------------------------
// Wallet Defaults
// ---------------------------------------------------------------------------

/// Free wBTC a wallet starts with the first time it connects.
pub const DEFAULT_WBTC_BALANCE: f64 = 1.0;

/// Free stCORE a wallet starts with the first time it connects.
pub const DEFAULT_STCORE_BALANCE: f64 = 10_000.0;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Quiet period before a changed collection is written back to storage.
/// Every change inside the window restarts it.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_secs(1);

/// Minimum wall-clock gap between two completed accrual passes.
pub const ACCRUAL_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Delay between a session becoming ready and its first accrual pass.
pub const ACCRUAL_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Period of the recurring accrual pass while a session is live.
pub const ACCRUAL_INTERVAL: Duration = Duration::from_secs(15 * 60);

// ---------------------------------------------------------------------------
// Rounding Tolerances
// ---------------------------------------------------------------------------

/// Changes at or below this size in a 2-decimal value field are not worth
/// republishing a position for.
pub const VALUE_EPSILON: f64 = 0.01;

/// Same as [`VALUE_EPSILON`] for the 6-decimal wBTC earnings field.
pub const WBTC_EPSILON: f64 = 0.000_001;

// ---------------------------------------------------------------------------
// Storage Crypto
// ---------------------------------------------------------------------------

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not sixteen.
pub const AES_NONCE_LENGTH: usize = 12;

/// Length of the store-wide master key kept in the metadata tree.
pub const MASTER_KEY_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Tunable parameters for a [`VaultProvider`](crate::provider::VaultProvider).
///
/// Defaults mirror the constants above.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Price used to value wBTC deposits.
    pub wbtc_price: f64,

    /// Debounce window for write-back of a changed collection.
    pub persist_debounce: Duration,

    /// Minimum gap between completed accrual passes.
    pub accrual_cooldown: Duration,

    /// Delay before the first accrual pass of a session.
    pub accrual_initial_delay: Duration,

    /// Period of the recurring accrual pass.
    pub accrual_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            wbtc_price: WBTC_PRICE,
            persist_debounce: PERSIST_DEBOUNCE,
            accrual_cooldown: ACCRUAL_COOLDOWN,
            accrual_initial_delay: ACCRUAL_INITIAL_DELAY,
            accrual_interval: ACCRUAL_INTERVAL,
        }
    }
}
