//! Stock balance projection and ledger reconciliation

use serde::Serialize;
use thiserror::Error;

/// Bound enforced when applying a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockPolicy {
    /// Receipts and returns: no bound
    Additive,
    /// Sales and adjustments: the balance may not go below zero
    NonNegative,
}

/// Balance before and after one delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub previous_balance: i64,
    pub new_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("insufficient stock for medicine {medicine_id}: {available} available, {requested} requested")]
    Insufficient {
        medicine_id: i64,
        available: i64,
        requested: i64,
    },

    #[error("stock balance for medicine {medicine_id} overflowed")]
    Overflow { medicine_id: i64 },
}

/// Compute the new balance for `medicine_id` after `delta` base units
pub fn project(
    medicine_id: i64,
    previous_balance: i64,
    delta: i64,
    policy: StockPolicy,
) -> Result<StockChange, StockError> {
    let new_balance = previous_balance
        .checked_add(delta)
        .ok_or(StockError::Overflow { medicine_id })?;

    if policy == StockPolicy::NonNegative && new_balance < 0 {
        return Err(StockError::Insufficient {
            medicine_id,
            available: previous_balance,
            requested: -delta,
        });
    }

    Ok(StockChange {
        previous_balance,
        new_balance,
    })
}

/// Medicine ids in the order their rows must be locked: ascending, no repeats.
///
/// Every workflow that touches several medicines locks them in this order so
/// two transactions can never wait on each other in a cycle.
pub fn lock_order<I>(ids: I) -> Vec<i64>
where
    I: IntoIterator<Item = i64>,
{
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Cached balance that disagrees with the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerDrift {
    pub medicine_id: i64,
    pub name: String,
    pub cached_base_qty: i64,
    pub ledger_base_qty: i64,
    /// `cached - ledger`
    pub drift: i64,
}

/// Compare a cached balance with the ledger sum, returning the drift if any
pub fn detect_drift(
    medicine_id: i64,
    name: &str,
    cached_base_qty: i64,
    ledger_base_qty: i64,
) -> Option<LedgerDrift> {
    let drift = cached_base_qty - ledger_base_qty;
    (drift != 0).then(|| LedgerDrift {
        medicine_id,
        name: name.to_string(),
        cached_base_qty,
        ledger_base_qty,
        drift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_has_no_upper_bound() {
        let change = project(1, 100, 4000, StockPolicy::Additive).unwrap();
        assert_eq!(change.new_balance, 4100);
        assert_eq!(change.previous_balance, 100);
    }

    #[test]
    fn test_non_negative_rejects_overdraw() {
        assert_eq!(
            project(3, 20, -50, StockPolicy::NonNegative),
            Err(StockError::Insufficient {
                medicine_id: 3,
                available: 20,
                requested: 50
            })
        );
    }

    #[test]
    fn test_non_negative_allows_exact_depletion() {
        let change = project(3, 50, -50, StockPolicy::NonNegative).unwrap();
        assert_eq!(change.new_balance, 0);
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            project(1, i64::MAX, 1, StockPolicy::Additive),
            Err(StockError::Overflow { medicine_id: 1 })
        );
    }

    #[test]
    fn test_lock_order_sorted_and_unique() {
        assert_eq!(lock_order([9, 2, 9, 4, 2]), vec![2, 4, 9]);
    }

    #[test]
    fn test_detect_drift() {
        assert_eq!(detect_drift(1, "x", 10, 10), None);
        let drift = detect_drift(1, "x", 12, 10).unwrap();
        assert_eq!(drift.drift, 2);
    }
}
