//! # Vault Records
//!
//! The three record types a wallet owns: open [`VaultPosition`]s, archived
//! [`EarningsHistory`] entries, and free [`UserBalances`].
//!
//! Field names serialize in camelCase. That is the shape the web product
//! wrote to browser storage, and keeping it means old records deserialize
//! without a translation layer.
//!
//! Amounts are `f64`. This is a simulation of yield, not a ledger: values
//! are rounded at fixed precision when they are computed, and nothing here
//! ever settles on-chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DEFAULT_STCORE_BALANCE, DEFAULT_WBTC_BALANCE};

// ---------------------------------------------------------------------------
// VaultPosition
// ---------------------------------------------------------------------------

/// A single deposit into one vault.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultPosition {
    /// Unique identifier, assigned once at creation.
    pub id: String,

    /// Display label of the vault.
    pub vault_name: String,

    /// wBTC locked in this position.
    pub wbtc_deposited: f64,

    /// stCORE locked in this position.
    pub stcore_deposited: f64,

    /// lstBTC issued against the deposit. Drives the per-asset earnings
    /// split.
    pub lstbtc_generated: f64,

    /// When the deposit was made. Never changes.
    pub deposit_date: DateTime<Utc>,

    /// Value of the deposit at creation time. Older records may not carry
    /// it; see [`VaultPosition::principal`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<f64>,

    /// `principal + earnings`, refreshed by every accrual pass.
    #[serde(default)]
    pub current_value: f64,

    /// Cumulative accrued value since deposit.
    #[serde(default)]
    pub earnings: f64,

    /// Annualized yield as a percentage string, e.g. `"36.5%"`.
    pub apy: String,

    /// Share of the earnings attributed to the wBTC leg, in wBTC.
    #[serde(default)]
    pub wbtc_earnings: f64,

    /// Share of the earnings attributed to the stCORE leg, in stCORE.
    #[serde(default)]
    pub stcore_earnings: f64,

    /// When accrual last rewrote this position.
    pub last_earnings_update: DateTime<Utc>,
}

impl VaultPosition {
    /// Opens a fresh position from a deposit request.
    ///
    /// The deposit is valued at `wbtc_price` right now and that value is
    /// frozen into `initial_value`. All earnings start at zero.
    pub fn open(request: NewPosition, now: DateTime<Utc>, wbtc_price: f64) -> Self {
        let initial_value = deposit_value(
            request.wbtc_deposited,
            request.stcore_deposited,
            wbtc_price,
        );

        Self {
            id: Uuid::new_v4().to_string(),
            vault_name: request.vault_name,
            wbtc_deposited: request.wbtc_deposited,
            stcore_deposited: request.stcore_deposited,
            lstbtc_generated: request.lstbtc_generated,
            deposit_date: now,
            initial_value: Some(initial_value),
            current_value: initial_value,
            earnings: 0.0,
            apy: request.apy,
            wbtc_earnings: 0.0,
            stcore_earnings: 0.0,
            last_earnings_update: now,
        }
    }

    /// The amount earnings accrue on.
    ///
    /// `initial_value` when the record has one, otherwise the deposit
    /// revalued at `wbtc_price`.
    pub fn principal(&self, wbtc_price: f64) -> f64 {
        self.initial_value.unwrap_or_else(|| {
            deposit_value(self.wbtc_deposited, self.stcore_deposited, wbtc_price)
        })
    }
}

/// Value of a two-asset deposit in the common (stCORE) unit.
pub fn deposit_value(wbtc: f64, stcore: f64, wbtc_price: f64) -> f64 {
    wbtc * wbtc_price + stcore
}

/// lstBTC issued for a deposit: the deposit's value expressed in BTC.
pub fn quote_lstbtc(wbtc: f64, stcore: f64, wbtc_price: f64) -> f64 {
    if wbtc_price <= 0.0 {
        return 0.0;
    }
    deposit_value(wbtc, stcore, wbtc_price) / wbtc_price
}

// ---------------------------------------------------------------------------
// NewPosition
// ---------------------------------------------------------------------------

/// The caller-supplied half of a [`VaultPosition`].
///
/// Everything else (id, timestamps, valuation, earnings) is filled in by
/// the vault state when the position is opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPosition {
    pub vault_name: String,
    pub wbtc_deposited: f64,
    pub stcore_deposited: f64,
    pub lstbtc_generated: f64,
    pub apy: String,
}

impl NewPosition {
    /// Builds a request whose lstBTC issuance is quoted from the deposit
    /// value at `wbtc_price`.
    pub fn quoted(
        vault_name: impl Into<String>,
        wbtc_deposited: f64,
        stcore_deposited: f64,
        apy: impl Into<String>,
        wbtc_price: f64,
    ) -> Self {
        Self {
            vault_name: vault_name.into(),
            wbtc_deposited,
            stcore_deposited,
            lstbtc_generated: quote_lstbtc(wbtc_deposited, stcore_deposited, wbtc_price),
            apy: apy.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// EarningsHistory
// ---------------------------------------------------------------------------

/// Archived snapshot of a closed position's earnings. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsHistory {
    pub id: String,

    /// Id of the position this entry was cut from. The position itself is
    /// gone by the time anyone reads this.
    pub vault_id: String,

    pub date: DateTime<Utc>,
    pub wbtc_earned: f64,
    pub stcore_earned: f64,
    pub lstbtc_value: f64,
}

impl EarningsHistory {
    /// Captures the final earnings of `position` as it is being closed.
    pub fn from_closed(position: &VaultPosition, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vault_id: position.id.clone(),
            date: now,
            wbtc_earned: position.wbtc_earnings,
            stcore_earned: position.stcore_earnings,
            lstbtc_value: position.lstbtc_generated,
        }
    }
}

// ---------------------------------------------------------------------------
// UserBalances
// ---------------------------------------------------------------------------

/// Free (non-deposited) asset quantities of the connected wallet.
///
/// `Default` is the cleared, disconnected state: both zero. A wallet seen
/// for the first time starts from [`UserBalances::starting`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserBalances {
    pub wbtc: f64,
    pub stcore: f64,
}

impl UserBalances {
    pub fn new(wbtc: f64, stcore: f64) -> Self {
        Self { wbtc, stcore }
    }

    /// Balances handed to a wallet with no stored history.
    pub fn starting() -> Self {
        Self::new(DEFAULT_WBTC_BALANCE, DEFAULT_STCORE_BALANCE)
    }

    /// Adds both quantities in place.
    pub fn credit(&mut self, wbtc: f64, stcore: f64) {
        self.wbtc += wbtc;
        self.stcore += stcore;
    }

    /// Returns `true` when both balances cover the requested quantities.
    pub fn covers(&self, wbtc: f64, stcore: f64) -> bool {
        self.wbtc >= wbtc && self.stcore >= stcore
    }
}
