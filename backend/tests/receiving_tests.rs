//! Purchase order receiving tests
//!
//! Drives the receiving rules the way the receive endpoint does: validate the
//! whole request, then credit stock and advance each line.

use proptest::prelude::*;
use shared::models::PurchaseStatus;
use shared::receiving::{
    apply_plan, plan_receipt, remaining_quantity, status_after, OrderLineState, ReceiptError,
    ReceiptRequest,
};
use shared::stock::{project, StockPolicy};
use shared::{compute_base_quantity, PackagingConfig, UnitType};

fn line(id: i64, qty: i64) -> OrderLineState {
    OrderLineState {
        id,
        name: format!("medicine-{}", id),
        qty,
        received_qty: 0,
    }
}

fn request(id: i64, qty: i64) -> ReceiptRequest {
    ReceiptRequest {
        purchase_item_id: id,
        received_qty: qty,
        batch_no: None,
        expiry_date: None,
    }
}

/// Validate, credit stock and advance lines; returns base units credited
fn receive(
    lines: &mut [OrderLineState],
    stock: &mut i64,
    config: &PackagingConfig,
    requests: &[ReceiptRequest],
) -> Result<i64, ReceiptError> {
    let plan = plan_receipt(status_after(lines), lines, requests)?;
    let mut credited = 0;
    for receipt in &plan.receipts {
        let base = compute_base_quantity(UnitType::Carton, receipt.qty, config).unwrap();
        *stock = project(1, *stock, base, StockPolicy::Additive)
            .unwrap()
            .new_balance;
        credited += base;
    }
    apply_plan(lines, &plan);
    Ok(credited)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 100 cartons of 10 packs x 1 blister x 10 tablets, received 40 then 60
    #[test]
    fn test_partial_then_full_receipt() {
        let config = PackagingConfig::new(10, 1, 10);
        let mut lines = vec![line(1, 100)];
        let mut stock = 0;

        let credited = receive(&mut lines, &mut stock, &config, &[request(1, 40)]).unwrap();
        assert_eq!(credited, 4000);
        assert_eq!(stock, 4000);
        assert_eq!(lines[0].received_qty, 40);
        assert_eq!(status_after(&lines), PurchaseStatus::Ordered);
        assert_eq!(remaining_quantity(&lines), 60);

        let credited = receive(&mut lines, &mut stock, &config, &[request(1, 60)]).unwrap();
        assert_eq!(credited, 6000);
        assert_eq!(stock, 10_000);
        assert_eq!(lines[0].received_qty, 100);
        assert_eq!(status_after(&lines), PurchaseStatus::Received);
        assert_eq!(remaining_quantity(&lines), 0);
    }

    /// Two valid entries and one over-receipt leave every line untouched
    #[test]
    fn test_over_receipt_mutates_nothing() {
        let config = PackagingConfig::new(10, 1, 10);
        let mut lines = vec![line(1, 10), line(2, 10), line(3, 5)];
        let before = lines.clone();
        let mut stock = 0;

        let err = receive(
            &mut lines,
            &mut stock,
            &config,
            &[request(1, 10), request(2, 4), request(3, 6)],
        )
        .unwrap_err();

        assert_eq!(
            err,
            ReceiptError::ExceedsOutstanding {
                purchase_item_id: 3,
                name: "medicine-3".to_string(),
                requested: 6,
                outstanding: 5,
            }
        );
        assert_eq!(lines, before);
        assert_eq!(stock, 0);
    }

    #[test]
    fn test_received_order_rejects_further_receipts() {
        let config = PackagingConfig::new(1, 1, 1);
        let mut lines = vec![line(1, 3)];
        let mut stock = 0;

        receive(&mut lines, &mut stock, &config, &[request(1, 3)]).unwrap();
        let err = receive(&mut lines, &mut stock, &config, &[request(1, 0)]).unwrap_err();

        assert_eq!(
            err,
            ReceiptError::OrderNotOpen {
                status: PurchaseStatus::Received
            }
        );
        assert_eq!(stock, 3);
    }

    #[test]
    fn test_zero_quantity_entries_are_skipped() {
        let config = PackagingConfig::new(2, 2, 2);
        let mut lines = vec![line(1, 4), line(2, 4)];
        let mut stock = 0;

        let credited =
            receive(&mut lines, &mut stock, &config, &[request(1, 0), request(2, 1)]).unwrap();

        assert_eq!(credited, 8);
        assert_eq!(lines[0].received_qty, 0);
        assert_eq!(lines[1].received_qty, 1);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn batch_strategy() -> impl Strategy<Value = Vec<(usize, i64)>> {
        prop::collection::vec((0usize..5, 0i64..60), 1..4)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// received_qty never decreases and never exceeds the ordered quantity
        #[test]
        fn prop_received_qty_monotone_and_bounded(
            ordered in prop::collection::vec(1i64..100, 1..5),
            batches in prop::collection::vec(batch_strategy(), 1..8)
        ) {
            let config = PackagingConfig::new(3, 2, 5);
            let mut lines: Vec<OrderLineState> = ordered
                .iter()
                .enumerate()
                .map(|(i, qty)| line(i as i64 + 1, *qty))
                .collect();
            let mut stock = 0;

            for batch in batches {
                let requests: Vec<ReceiptRequest> = batch
                    .iter()
                    .map(|(idx, qty)| request((idx % lines.len()) as i64 + 1, *qty))
                    .collect();
                let before = lines.clone();

                let result = receive(&mut lines, &mut stock, &config, &requests);
                if result.is_err() {
                    prop_assert_eq!(&lines, &before);
                }

                for (now, then) in lines.iter().zip(&before) {
                    prop_assert!(now.received_qty >= then.received_qty);
                    prop_assert!(now.received_qty <= now.qty);
                }
            }

            let all_in = lines.iter().all(|l| l.received_qty == l.qty);
            prop_assert_eq!(status_after(&lines) == PurchaseStatus::Received, all_in);
        }

        /// Stock credited equals the converted quantity received on the lines
        #[test]
        fn prop_stock_matches_received_quantity(
            ordered in prop::collection::vec(1i64..100, 1..5),
            batches in prop::collection::vec(batch_strategy(), 1..8)
        ) {
            let config = PackagingConfig::new(3, 2, 5);
            let mut lines: Vec<OrderLineState> = ordered
                .iter()
                .enumerate()
                .map(|(i, qty)| line(i as i64 + 1, *qty))
                .collect();
            let mut stock = 0;

            for batch in batches {
                let requests: Vec<ReceiptRequest> = batch
                    .iter()
                    .map(|(idx, qty)| request((idx % lines.len()) as i64 + 1, *qty))
                    .collect();
                let _ = receive(&mut lines, &mut stock, &config, &requests);
            }

            let received: i64 = lines.iter().map(|l| l.received_qty).sum();
            prop_assert_eq!(stock, received * 30);
            prop_assert_eq!(
                remaining_quantity(&lines),
                lines.iter().map(|l| l.qty - l.received_qty).sum::<i64>()
            );
        }
    }
}
