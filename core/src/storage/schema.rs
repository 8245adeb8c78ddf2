//! Shape validation for values coming out of storage.
//!
//! Stored data is untrusted: an older build, a hand-edited file, or a
//! half-finished write may have produced it. A list keeps the entries that
//! deserialize and pass their checks; a single record is either valid or
//! replaced by the caller's default.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::vault::{EarningsHistory, UserBalances, VaultPosition};

/// A type that can be recovered from a stored JSON value.
pub trait Schema: Sized {
    /// Returns the validated value, or `None` if the value as a whole is
    /// unusable.
    fn sanitize(value: Value) -> Option<Self>;
}

fn amount(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

fn sanitize_list<T: DeserializeOwned>(
    value: Value,
    label: &'static str,
    valid: impl Fn(&T) -> bool,
) -> Option<Vec<T>> {
    let Value::Array(entries) = value else {
        return None;
    };

    let total = entries.len();
    let kept: Vec<T> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<T>(entry).ok())
        .filter(|item| valid(item))
        .collect();

    if kept.len() < total {
        warn!(
            collection = label,
            dropped = total - kept.len(),
            kept = kept.len(),
            "dropped malformed stored entries"
        );
    }
    Some(kept)
}

/// Checks the numeric fields of a deserialized position.
pub fn valid_position(p: &VaultPosition) -> bool {
    !p.id.is_empty()
        && amount(p.wbtc_deposited)
        && amount(p.stcore_deposited)
        && amount(p.lstbtc_generated)
        && p.initial_value.map_or(true, amount)
        && amount(p.current_value)
        && amount(p.earnings)
        && amount(p.wbtc_earnings)
        && amount(p.stcore_earnings)
}

/// Checks the numeric fields of a deserialized history entry.
pub fn valid_history(h: &EarningsHistory) -> bool {
    !h.id.is_empty() && amount(h.wbtc_earned) && amount(h.stcore_earned) && amount(h.lstbtc_value)
}

impl Schema for Vec<VaultPosition> {
    fn sanitize(value: Value) -> Option<Self> {
        sanitize_list(value, "vaultPositions", valid_position)
    }
}

impl Schema for Vec<EarningsHistory> {
    fn sanitize(value: Value) -> Option<Self> {
        sanitize_list(value, "earningsHistory", valid_history)
    }
}

impl Schema for UserBalances {
    fn sanitize(value: Value) -> Option<Self> {
        let balances: UserBalances = serde_json::from_value(value).ok()?;
        (amount(balances.wbtc) && amount(balances.stcore)).then_some(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WBTC_PRICE;
    use crate::vault::NewPosition;
    use chrono::Utc;
    use serde_json::json;

    fn position_json() -> Value {
        let position = VaultPosition::open(
            NewPosition::quoted("Vault", 0.1, 100.0, "9%", WBTC_PRICE),
            Utc::now(),
            WBTC_PRICE,
        );
        serde_json::to_value(position).unwrap()
    }

    #[test]
    fn valid_positions_survive() {
        let value = json!([position_json(), position_json()]);
        let positions = Vec::<VaultPosition>::sanitize(value).unwrap();
        assert_eq!(positions.len(), 2);
    }

    #[test]
    fn malformed_positions_are_dropped() {
        let mut negative = position_json();
        negative["wbtcDeposited"] = json!(-1.0);
        let mut empty_id = position_json();
        empty_id["id"] = json!("");

        let value = json!([position_json(), {"id": "x"}, negative, empty_id, 42]);
        let positions = Vec::<VaultPosition>::sanitize(value).unwrap();
        assert_eq!(positions.len(), 1);
    }

    #[test]
    fn non_array_collection_is_rejected() {
        assert!(Vec::<VaultPosition>::sanitize(json!({"positions": []})).is_none());
        assert!(Vec::<EarningsHistory>::sanitize(json!("nope")).is_none());
    }

    #[test]
    fn history_entries_are_checked() {
        let good = json!({
            "id": "h1",
            "vaultId": "p1",
            "date": "2024-03-01T12:00:00Z",
            "wbtcEarned": 0.001,
            "stcoreEarned": 12.5,
            "lstbtcValue": 0.2
        });
        let mut bad = good.clone();
        bad["stcoreEarned"] = json!(-3);

        let history = Vec::<EarningsHistory>::sanitize(json!([good, bad])).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].vault_id, "p1");
    }

    #[test]
    fn balances_validation() {
        assert_eq!(
            UserBalances::sanitize(json!({"wbtc": 0.5, "stcore": 20})),
            Some(UserBalances::new(0.5, 20.0))
        );
        assert_eq!(UserBalances::sanitize(json!({"wbtc": -0.5, "stcore": 20})), None);
        assert_eq!(UserBalances::sanitize(json!({"wbtc": "lots"})), None);
        assert_eq!(UserBalances::sanitize(json!(null)), None);
    }
}
