//! # VaultState — the per-wallet record store
//!
//! Holds everything the connected wallet owns in memory: open positions,
//! free balances, and closed-position history. Nothing in here does I/O or
//! touches a clock on its own; callers pass `now` in, and the
//! [`VaultProvider`](crate::provider::VaultProvider) takes care of loading,
//! persistence, and timers.
//!
//! ## Readiness
//!
//! A freshly constructed (or cleared) state is *not ready*. Mutators refuse
//! to run until [`VaultState::load`] installs a wallet's data, so a
//! half-loaded state can never be edited and then written back over the
//! real records.
//!
//! ## Accrual in two phases
//!
//! [`VaultState::begin_accrual`] raises the in-flight flag and hands out a
//! snapshot; [`VaultState::finish_accrual`] applies the results and lowers
//! the flag. Between the two, the persister sees the flag and holds back
//! position writes. [`VaultState::update_earnings`] runs both phases back to
//! back for callers that don't need the gap.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::accrual::{compute_accrual, parse_apy, Accrual};
use super::position::{EarningsHistory, NewPosition, UserBalances, VaultPosition};

// ---------------------------------------------------------------------------
// Errors & Outcomes
// ---------------------------------------------------------------------------

/// Errors returned by [`VaultState::deposit`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VaultError {
    /// No wallet is connected or its data hasn't finished loading.
    #[error("vault data is not loaded for a connected wallet")]
    NotReady,

    /// A deposit quantity is negative or not a finite number.
    #[error("invalid deposit amount: wbtc {wbtc}, stcore {stcore}")]
    InvalidAmount { wbtc: f64, stcore: f64 },

    /// The requested APY string can't be parsed.
    #[error("invalid apy {0:?}")]
    InvalidApy(String),

    /// Free balances don't cover the deposit.
    #[error(
        "insufficient balance: have wbtc {available_wbtc} / stcore {available_stcore}, \
         need wbtc {requested_wbtc} / stcore {requested_stcore}"
    )]
    InsufficientBalance {
        available_wbtc: f64,
        available_stcore: f64,
        requested_wbtc: f64,
        requested_stcore: f64,
    },
}

/// Why an accrual pass did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualSkip {
    /// Disconnected, or connected but not loaded yet.
    NotReady,
    /// Another pass raised the in-flight flag and hasn't finished.
    InFlight,
    /// The last completed pass is younger than the cooldown.
    CoolingDown,
}

/// Result of [`VaultState::update_earnings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// The pass ran and rewrote this many positions (possibly zero).
    Completed { updated: usize },
    /// The pass did not run.
    Skipped(AccrualSkip),
}

impl AccrualOutcome {
    /// Number of positions the pass rewrote. Zero when skipped.
    pub fn updated(&self) -> usize {
        match self {
            AccrualOutcome::Completed { updated } => *updated,
            AccrualOutcome::Skipped(_) => 0,
        }
    }
}

/// The three collections loaded for a wallet on connect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedVault {
    pub positions: Vec<VaultPosition>,
    pub user_balances: UserBalances,
    pub earnings_history: Vec<EarningsHistory>,
}

// ---------------------------------------------------------------------------
// VaultState
// ---------------------------------------------------------------------------

/// In-memory vault records for (at most) one connected wallet.
#[derive(Debug, Clone)]
pub struct VaultState {
    address: Option<String>,
    positions: Vec<VaultPosition>,
    earnings_history: Vec<EarningsHistory>,
    user_balances: UserBalances,
    data_loaded: bool,
    accrual_in_flight: bool,
    last_accrual: Option<DateTime<Utc>>,
    wbtc_price: f64,
    accrual_cooldown: Duration,
}

impl VaultState {
    /// An empty, not-ready state.
    pub fn new(wbtc_price: f64, accrual_cooldown: Duration) -> Self {
        Self {
            address: None,
            positions: Vec::new(),
            earnings_history: Vec::new(),
            user_balances: UserBalances::default(),
            data_loaded: false,
            accrual_in_flight: false,
            last_accrual: None,
            wbtc_price,
            accrual_cooldown,
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Installs `loaded` as the records of `address` and marks the state
    /// ready.
    pub fn load(&mut self, address: &str, loaded: LoadedVault) {
        self.address = Some(address.to_string());
        self.positions = loaded.positions;
        self.user_balances = loaded.user_balances;
        self.earnings_history = loaded.earnings_history;
        self.accrual_in_flight = false;
        self.last_accrual = None;
        self.data_loaded = true;
    }

    /// Drops every in-memory record and returns to the not-ready state.
    ///
    /// Storage is not touched.
    pub fn clear(&mut self) {
        self.address = None;
        self.positions.clear();
        self.earnings_history.clear();
        self.user_balances = UserBalances::default();
        self.data_loaded = false;
        self.accrual_in_flight = false;
        self.last_accrual = None;
    }

    // -- Accessors ----------------------------------------------------------

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn is_wallet_connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn is_data_loaded(&self) -> bool {
        self.data_loaded
    }

    pub fn is_accrual_in_flight(&self) -> bool {
        self.accrual_in_flight
    }

    pub fn last_accrual(&self) -> Option<DateTime<Utc>> {
        self.last_accrual
    }

    pub fn positions(&self) -> &[VaultPosition] {
        &self.positions
    }

    pub fn earnings_history(&self) -> &[EarningsHistory] {
        &self.earnings_history
    }

    pub fn user_balances(&self) -> UserBalances {
        self.user_balances
    }

    fn is_ready(&self) -> bool {
        self.address.is_some() && self.data_loaded
    }

    // -- Mutators -----------------------------------------------------------

    /// Replaces the free balances. Ignored (with a warning) when not ready.
    pub fn set_user_balances(&mut self, balances: UserBalances) -> bool {
        if !self.is_ready() {
            warn!("set_user_balances ignored: vault data not loaded");
            return false;
        }
        self.user_balances = balances;
        true
    }

    /// Opens a new position from `request`.
    ///
    /// Returns `None` (and logs a warning) when not ready or when the
    /// request's `apy` can't be parsed. Free balances are not touched; see
    /// [`VaultState::deposit`] for the debiting variant.
    pub fn add_position(
        &mut self,
        request: NewPosition,
        now: DateTime<Utc>,
    ) -> Option<VaultPosition> {
        if !self.is_ready() {
            warn!("add_position ignored: vault data not loaded");
            return None;
        }
        if let Err(e) = parse_apy(&request.apy) {
            warn!(error = %e, "add_position ignored");
            return None;
        }

        let position = VaultPosition::open(request, now, self.wbtc_price);
        debug!(
            id = %position.id,
            vault = %position.vault_name,
            value = position.current_value,
            "position opened"
        );
        self.positions.push(position.clone());
        Some(position)
    }

    /// Debits the free balances by the deposited quantities and opens the
    /// position, as one step.
    ///
    /// # Errors
    ///
    /// Nothing is mutated on error. See [`VaultError`] for the cases.
    pub fn deposit(
        &mut self,
        request: NewPosition,
        now: DateTime<Utc>,
    ) -> Result<VaultPosition, VaultError> {
        if !self.is_ready() {
            return Err(VaultError::NotReady);
        }

        let (wbtc, stcore) = (request.wbtc_deposited, request.stcore_deposited);
        let valid = |x: f64| x.is_finite() && x >= 0.0;
        if !valid(wbtc) || !valid(stcore) || !valid(request.lstbtc_generated) {
            return Err(VaultError::InvalidAmount { wbtc, stcore });
        }
        parse_apy(&request.apy).map_err(|_| VaultError::InvalidApy(request.apy.clone()))?;

        if !self.user_balances.covers(wbtc, stcore) {
            return Err(VaultError::InsufficientBalance {
                available_wbtc: self.user_balances.wbtc,
                available_stcore: self.user_balances.stcore,
                requested_wbtc: wbtc,
                requested_stcore: stcore,
            });
        }

        self.user_balances.wbtc -= wbtc;
        self.user_balances.stcore -= stcore;

        let position = VaultPosition::open(request, now, self.wbtc_price);
        self.positions.push(position.clone());
        debug!(id = %position.id, wbtc, stcore, "deposit accepted");
        Ok(position)
    }

    /// Closes position `id`: archives its earnings, returns deposit plus
    /// earnings to the free balances, and removes it.
    ///
    /// Returns the new history entry, or `None` when not ready or when no
    /// such position exists. All three effects land together or not at all.
    pub fn close_vault(&mut self, id: &str, now: DateTime<Utc>) -> Option<EarningsHistory> {
        if !self.is_ready() {
            warn!(id, "close_vault ignored: vault data not loaded");
            return None;
        }

        let index = self.positions.iter().position(|p| p.id == id)?;
        let position = self.positions.remove(index);

        let entry = EarningsHistory::from_closed(&position, now);
        self.earnings_history.push(entry.clone());
        self.user_balances.credit(
            position.wbtc_deposited + position.wbtc_earnings,
            position.stcore_deposited + position.stcore_earnings,
        );

        debug!(
            id,
            wbtc_earned = entry.wbtc_earned,
            stcore_earned = entry.stcore_earned,
            "position closed"
        );
        Some(entry)
    }

    // -- Accrual ------------------------------------------------------------

    /// Opens an accrual pass and returns the positions to compute against.
    ///
    /// # Errors
    ///
    /// The [`AccrualSkip`] reason when the pass must not run.
    pub fn begin_accrual(&mut self, now: DateTime<Utc>) -> Result<Vec<VaultPosition>, AccrualSkip> {
        if !self.is_ready() {
            return Err(AccrualSkip::NotReady);
        }
        if self.accrual_in_flight {
            return Err(AccrualSkip::InFlight);
        }
        if let Some(last) = self.last_accrual {
            let since = (now - last).to_std().unwrap_or(Duration::ZERO);
            if since < self.accrual_cooldown {
                return Err(AccrualSkip::CoolingDown);
            }
        }

        self.accrual_in_flight = true;
        Ok(self.positions.clone())
    }

    /// Applies the results of a pass opened with [`VaultState::begin_accrual`].
    ///
    /// Accruals for positions closed in the meantime are dropped; accruals
    /// that don't visibly change their position are skipped. Lowers the
    /// in-flight flag in every case and returns how many positions changed.
    pub fn finish_accrual(&mut self, accruals: &[Accrual], now: DateTime<Utc>) -> usize {
        self.accrual_in_flight = false;
        if !self.is_ready() {
            return 0;
        }

        let mut updated = 0;
        for accrual in accruals {
            if let Some(position) = self.positions.iter_mut().find(|p| p.id == accrual.position_id) {
                if accrual.differs_from(position) {
                    *position = accrual.apply(position, now);
                    updated += 1;
                }
            }
        }

        self.last_accrual = Some(now);
        updated
    }

    /// Computes accruals for a snapshot. Positions with an unusable `apy`
    /// are logged and left out.
    pub fn compute_accruals(
        snapshot: &[VaultPosition],
        now: DateTime<Utc>,
        wbtc_price: f64,
    ) -> Vec<Accrual> {
        snapshot
            .iter()
            .filter_map(|p| match compute_accrual(p, now, wbtc_price) {
                Ok(accrual) => Some(accrual),
                Err(e) => {
                    warn!(id = %p.id, error = %e, "position skipped by accrual");
                    None
                }
            })
            .collect()
    }

    /// Runs a full accrual pass as of `now`.
    pub fn update_earnings(&mut self, now: DateTime<Utc>) -> AccrualOutcome {
        let snapshot = match self.begin_accrual(now) {
            Ok(snapshot) => snapshot,
            Err(skip) => return AccrualOutcome::Skipped(skip),
        };
        let accruals = Self::compute_accruals(&snapshot, now, self.wbtc_price);
        let updated = self.finish_accrual(&accruals, now);
        AccrualOutcome::Completed { updated }
    }

    pub fn wbtc_price(&self) -> f64 {
        self.wbtc_price
    }

    // -- Aggregates ---------------------------------------------------------

    fn sum(&self, field: impl Fn(&VaultPosition) -> f64) -> f64 {
        if !self.is_ready() {
            return 0.0;
        }
        self.positions.iter().map(field).sum()
    }

    /// Principal still locked in open positions.
    pub fn total_deposited(&self) -> f64 {
        self.sum(|p| p.current_value - p.earnings)
    }

    pub fn total_earnings(&self) -> f64 {
        self.sum(|p| p.earnings)
    }

    pub fn total_value(&self) -> f64 {
        self.sum(|p| p.current_value)
    }

    pub fn total_wbtc_earnings(&self) -> f64 {
        self.sum(|p| p.wbtc_earnings)
    }

    pub fn total_stcore_earnings(&self) -> f64 {
        self.sum(|p| p.stcore_earnings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
