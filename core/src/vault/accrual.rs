//! # Earnings Accrual
//!
//! Simple interest, no compounding, computed from scratch on every pass:
//!
//! ```text
//! days            = floor(hours since deposit) / 24
//! daily_rate      = apy / 365 / 100
//! earnings        = round2(principal * daily_rate * days)
//! lst_accrual     = lstbtc_generated * daily_rate * days
//! wbtc_earnings   = round6(lst_accrual * wbtc_share)
//! stcore_earnings = round2(lst_accrual * stcore_share * wbtc_price)
//! current_value   = round2(principal + earnings)
//! ```
//!
//! The shares are each asset's fraction of the *original* deposit value.
//! Elapsed time is truncated to whole hours so displayed earnings only move
//! once an hour instead of jittering on every pass.
//!
//! Everything here is pure: same position, same clock, same answer. That is
//! what makes re-running a pass harmless.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::position::VaultPosition;
use crate::config::{DAYS_PER_YEAR, VALUE_EPSILON, WBTC_EPSILON};

/// Errors raised while interpreting a position for accrual.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccrualError {
    /// The `apy` string is not a non-negative percentage.
    #[error("invalid apy {0:?}: expected a non-negative percentage such as \"12.5%\"")]
    InvalidApy(String),
}

/// Rounds to 2 decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds to 6 decimals, half away from zero.
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Parses an APY percentage string.
///
/// Accepts `"36.5%"`, `"36.5"`, and surrounding whitespace. Rejects
/// anything that isn't a finite, non-negative number.
pub fn parse_apy(apy: &str) -> Result<f64, AccrualError> {
    let trimmed = apy.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(AccrualError::InvalidApy(apy.to_string())),
    }
}

/// Converts an annual percentage into a daily fraction.
pub fn daily_rate(apy_percent: f64) -> f64 {
    apy_percent / DAYS_PER_YEAR / 100.0
}

/// Whole hours between `since` and `now`, expressed in days.
///
/// A deposit date in the future (clock skew) counts as zero.
pub fn days_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - since).num_hours();
    if hours <= 0 {
        0.0
    } else {
        hours as f64 / 24.0
    }
}

/// Freshly computed earnings for one position.
#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    /// Position the numbers belong to.
    pub position_id: String,
    pub earnings: f64,
    pub wbtc_earnings: f64,
    pub stcore_earnings: f64,
    pub current_value: f64,
}

impl Accrual {
    /// `true` when applying this accrual would visibly change `position`.
    ///
    /// Movements within rounding tolerance don't count, so a pass that
    /// lands inside the same hour leaves the position untouched.
    pub fn differs_from(&self, position: &VaultPosition) -> bool {
        (self.earnings - position.earnings).abs() > VALUE_EPSILON
            || (self.current_value - position.current_value).abs() > VALUE_EPSILON
            || (self.stcore_earnings - position.stcore_earnings).abs() > VALUE_EPSILON
            || (self.wbtc_earnings - position.wbtc_earnings).abs() > WBTC_EPSILON
    }

    /// Returns a copy of `position` carrying these numbers, stamped `now`.
    pub fn apply(&self, position: &VaultPosition, now: DateTime<Utc>) -> VaultPosition {
        VaultPosition {
            earnings: self.earnings,
            wbtc_earnings: self.wbtc_earnings,
            stcore_earnings: self.stcore_earnings,
            current_value: self.current_value,
            last_earnings_update: now,
            ..position.clone()
        }
    }
}

/// Computes the accrual of `position` as of `now`.
///
/// # Errors
///
/// [`AccrualError::InvalidApy`] if the position's `apy` can't be parsed.
pub fn compute_accrual(
    position: &VaultPosition,
    now: DateTime<Utc>,
    wbtc_price: f64,
) -> Result<Accrual, AccrualError> {
    let rate = daily_rate(parse_apy(&position.apy)?);
    let days = days_elapsed(position.deposit_date, now);
    let principal = position.principal(wbtc_price);

    let earnings = round2(principal * rate * days).max(0.0);

    let wbtc_value = position.wbtc_deposited * wbtc_price;
    let stcore_value = position.stcore_deposited;
    let total_value = wbtc_value + stcore_value;
    let (wbtc_share, stcore_share) = if total_value > 0.0 {
        (wbtc_value / total_value, stcore_value / total_value)
    } else {
        (0.0, 0.0)
    };

    let lst_accrual = position.lstbtc_generated * rate * days;
    let wbtc_earnings = round6(lst_accrual * wbtc_share).max(0.0);
    let stcore_earnings = round2(lst_accrual * stcore_share * wbtc_price).max(0.0);

    Ok(Accrual {
        position_id: position.id.clone(),
        earnings,
        wbtc_earnings,
        stcore_earnings,
        current_value: round2(principal + earnings),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WBTC_PRICE;
    use crate::vault::position::NewPosition;
    use chrono::Duration;

    fn position(wbtc: f64, stcore: f64, lstbtc: f64, apy: &str, age: Duration) -> VaultPosition {
        let now = Utc::now();
        VaultPosition::open(
            NewPosition {
                vault_name: "test".to_string(),
                wbtc_deposited: wbtc,
                stcore_deposited: stcore,
                lstbtc_generated: lstbtc,
                apy: apy.to_string(),
            },
            now - age,
            WBTC_PRICE,
        )
    }

    #[test]
    fn parse_apy_accepts_percent_strings() {
        assert_eq!(parse_apy("36.5%").unwrap(), 36.5);
        assert_eq!(parse_apy(" 12 % ").unwrap(), 12.0);
        assert_eq!(parse_apy("8").unwrap(), 8.0);
        assert_eq!(parse_apy("0%").unwrap(), 0.0);
    }

    #[test]
    fn parse_apy_rejects_garbage() {
        for bad in ["", "%", "abc", "12%%", "-5%", "NaN", "inf%"] {
            assert!(
                matches!(parse_apy(bad), Err(AccrualError::InvalidApy(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(430.000_000_1), 430.0);
        assert_eq!(round6(0.000_000_4), 0.0);
        assert_eq!(round6(0.123_456_7), 0.123_457);
    }

    #[test]
    fn days_elapsed_truncates_to_whole_hours() {
        let now = Utc::now();
        assert_eq!(days_elapsed(now - Duration::minutes(59), now), 0.0);
        assert_eq!(days_elapsed(now - Duration::minutes(61), now), 1.0 / 24.0);
        assert_eq!(days_elapsed(now - Duration::hours(36), now), 1.5);
    }

    #[test]
    fn days_elapsed_clamps_future_deposits() {
        let now = Utc::now();
        assert_eq!(days_elapsed(now + Duration::hours(5), now), 0.0);
    }

    #[test]
    fn ten_day_wbtc_only_example() {
        let p = position(1.0, 0.0, 1.0, "36.5%", Duration::days(10));
        let accrual = compute_accrual(&p, Utc::now(), WBTC_PRICE).unwrap();

        assert_eq!(accrual.earnings, 430.0);
        assert_eq!(accrual.current_value, 43_430.0);
        assert_eq!(accrual.wbtc_earnings, 0.01);
        assert_eq!(accrual.stcore_earnings, 0.0);
    }

    #[test]
    fn earnings_split_by_original_value_share() {
        // Half the value in wBTC, half in stCORE.
        let p = position(0.5, 21_500.0, 1.0, "36.5%", Duration::days(10));
        let accrual = compute_accrual(&p, Utc::now(), WBTC_PRICE).unwrap();

        assert_eq!(accrual.earnings, 430.0);
        assert_eq!(accrual.wbtc_earnings, 0.005);
        assert_eq!(accrual.stcore_earnings, 215.0);
    }

    #[test]
    fn fresh_position_accrues_nothing() {
        let p = position(1.0, 500.0, 1.0, "20%", Duration::minutes(30));
        let accrual = compute_accrual(&p, Utc::now(), WBTC_PRICE).unwrap();

        assert_eq!(accrual.earnings, 0.0);
        assert_eq!(accrual.current_value, 43_500.0);
        assert!(!accrual.differs_from(&p));
    }

    #[test]
    fn empty_deposit_yields_zero_shares() {
        let p = position(0.0, 0.0, 1.0, "10%", Duration::days(30));
        let accrual = compute_accrual(&p, Utc::now(), WBTC_PRICE).unwrap();

        assert_eq!(accrual.earnings, 0.0);
        assert_eq!(accrual.wbtc_earnings, 0.0);
        assert_eq!(accrual.stcore_earnings, 0.0);
    }

    #[test]
    fn missing_initial_value_uses_deposit_value() {
        let mut p = position(1.0, 0.0, 1.0, "36.5%", Duration::days(10));
        p.initial_value = None;
        let accrual = compute_accrual(&p, Utc::now(), WBTC_PRICE).unwrap();
        assert_eq!(accrual.current_value, 43_430.0);
    }

    #[test]
    fn invalid_apy_is_an_error() {
        let p = position(1.0, 0.0, 1.0, "lots", Duration::days(10));
        assert!(compute_accrual(&p, Utc::now(), WBTC_PRICE).is_err());
    }

    #[test]
    fn current_value_invariant_holds() {
        for (wbtc, stcore, apy, days) in [
            (0.3, 1_234.56, "7.25%", 3),
            (2.0, 0.0, "15%", 400),
            (0.0, 99_999.0, "0.5%", 1),
        ] {
            let p = position(wbtc, stcore, wbtc, apy, Duration::days(days));
            let accrual = compute_accrual(&p, Utc::now(), WBTC_PRICE).unwrap();
            let principal = p.principal(WBTC_PRICE);

            assert_eq!(accrual.current_value, round2(principal + accrual.earnings));
            assert!(accrual.earnings >= 0.0);
            assert!(accrual.wbtc_earnings >= 0.0);
            assert!(accrual.stcore_earnings >= 0.0);
        }
    }

    #[test]
    fn apply_only_touches_earnings_fields() {
        let p = position(1.0, 0.0, 1.0, "36.5%", Duration::days(10));
        let now = Utc::now();
        let accrual = compute_accrual(&p, now, WBTC_PRICE).unwrap();
        assert!(accrual.differs_from(&p));

        let updated = accrual.apply(&p, now);
        assert_eq!(updated.id, p.id);
        assert_eq!(updated.deposit_date, p.deposit_date);
        assert_eq!(updated.initial_value, p.initial_value);
        assert_eq!(updated.earnings, 430.0);
        assert_eq!(updated.last_earnings_update, now);
        assert!(!accrual.differs_from(&updated));
    }
}
