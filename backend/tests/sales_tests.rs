//! Sale posting and return tests

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::models::{PaymentMethod, SaleStatus};
use shared::sales::{
    plan_payments, plan_return, plan_sale, PaymentInput, ReturnLineRequest, ReturnTarget,
    SaleError, SaleLineInput, SoldLine, StockSnapshot,
};
use shared::stock::{project, StockPolicy};
use shared::{PackagingConfig, UnitType};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn snapshot(id: i64, stock: i64, config: PackagingConfig) -> StockSnapshot {
    StockSnapshot {
        medicine_id: id,
        name: format!("medicine-{}", id),
        stock_base_qty: stock,
        packaging: config,
    }
}

fn sale_line(id: i64, qty: i64, unit: UnitType, price: &str) -> SaleLineInput {
    SaleLineInput {
        medicine_id: id,
        qty,
        unit_type: unit,
        unit_price: dec(price),
    }
}

fn sold(sale_item_id: i64, medicine_id: i64, qty: i64, base_per_unit: i64) -> SoldLine {
    SoldLine {
        sale_item_id,
        medicine_id,
        qty,
        unit_type: UnitType::Blister,
        base_qty: qty * base_per_unit,
        returned_qty: 0,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 5 blisters of 10 tablets need 50 tablets, only 20 on hand
    #[test]
    fn test_blister_sale_beyond_stock_is_rejected() {
        let stock = vec![snapshot(1, 20, PackagingConfig::new(1, 1, 10))];
        let err = plan_sale(&[sale_line(1, 5, UnitType::Blister, "3")], &stock, true).unwrap_err();

        assert_eq!(
            err,
            SaleError::InsufficientStock {
                medicine_id: 1,
                name: "medicine-1".to_string(),
                available: 20,
                requested: 50,
            }
        );
        assert_eq!(stock[0].stock_base_qty, 20);
    }

    /// Lines for the same medicine are checked against stock together
    #[test]
    fn test_lines_are_aggregated_per_medicine() {
        let config = PackagingConfig::new(10, 2, 10);
        let stock = vec![snapshot(1, 30, config)];
        let lines = [
            sale_line(1, 1, UnitType::Pack, "40"),
            sale_line(1, 1, UnitType::Pack, "40"),
        ];

        let err = plan_sale(&lines, &stock, true).unwrap_err();
        assert!(matches!(err, SaleError::InsufficientStock { requested: 40, .. }));
    }

    #[test]
    fn test_sale_plan_totals_and_debits() {
        let config = PackagingConfig::new(10, 2, 10);
        let stock = vec![snapshot(2, 500, config), snapshot(1, 500, config)];
        let lines = [
            sale_line(2, 3, UnitType::Blister, "4.50"),
            sale_line(1, 1, UnitType::Pack, "40"),
            sale_line(2, 5, UnitType::Tablet, "0.50"),
        ];

        let plan = plan_sale(&lines, &stock, true).unwrap();

        assert_eq!(plan.total, dec("56"));
        assert_eq!(plan.lines.len(), 3);
        let debits: Vec<(i64, i64)> = plan.debits.iter().map(|d| (d.medicine_id, d.base_qty)).collect();
        assert_eq!(debits, vec![(1, 20), (2, 35)]);
    }

    #[test]
    fn test_drafts_skip_the_stock_check() {
        let stock = vec![snapshot(1, 0, PackagingConfig::default())];
        let plan = plan_sale(&[sale_line(1, 9, UnitType::Tablet, "1")], &stock, false).unwrap();
        assert_eq!(plan.debits[0].base_qty, 9);
    }

    #[test]
    fn test_unknown_medicine_is_rejected() {
        let err = plan_sale(&[sale_line(9, 1, UnitType::Pack, "1")], &[], true).unwrap_err();
        assert_eq!(err, SaleError::UnknownMedicine { medicine_id: 9 });
    }

    #[test]
    fn test_payments_default_to_full_cash() {
        let payments = plan_payments(dec("56"), &[]).unwrap();
        assert_eq!(
            payments,
            vec![PaymentInput {
                method: PaymentMethod::Cash,
                amount: dec("56"),
            }]
        );
    }

    #[test]
    fn test_overpayment_is_rejected() {
        let payments = [
            PaymentInput {
                method: PaymentMethod::Card,
                amount: dec("50"),
            },
            PaymentInput {
                method: PaymentMethod::Cash,
                amount: dec("10"),
            },
        ];
        assert!(matches!(
            plan_payments(dec("56"), &payments),
            Err(SaleError::PaymentExceedsTotal { .. })
        ));
    }

    /// A full return succeeds once; the returned sale cannot be returned again
    #[test]
    fn test_second_return_is_rejected() {
        let lines = vec![sold(1, 5, 2, 10), sold(2, 6, 1, 10)];

        let planned = plan_return(SaleStatus::Posted, &lines, &[]).unwrap();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned.iter().map(|p| p.base_qty).sum::<i64>(), 30);

        assert_eq!(
            plan_return(SaleStatus::Returned, &lines, &[]),
            Err(SaleError::AlreadyReturned)
        );
    }

    #[test]
    fn test_draft_cannot_be_returned() {
        let lines = vec![sold(1, 5, 2, 10)];
        assert_eq!(
            plan_return(SaleStatus::Draft, &lines, &[]),
            Err(SaleError::NotReturnable {
                status: SaleStatus::Draft
            })
        );
    }

    /// Returning by medicine spreads the quantity over its lines in order
    #[test]
    fn test_return_by_medicine_spreads_over_lines() {
        let lines = vec![sold(1, 5, 2, 10), sold(2, 5, 3, 10), sold(3, 6, 1, 10)];
        let planned = plan_return(
            SaleStatus::Posted,
            &lines,
            &[ReturnLineRequest {
                target: ReturnTarget::Medicine(5),
                qty: Some(4),
            }],
        )
        .unwrap();

        let parts: Vec<(i64, i64, i64)> = planned
            .iter()
            .map(|p| (p.sale_item_id, p.qty, p.base_qty))
            .collect();
        assert_eq!(parts, vec![(1, 2, 20), (2, 2, 20)]);
    }

    #[test]
    fn test_return_cannot_exceed_sold_quantity() {
        let lines = vec![sold(1, 5, 2, 10)];
        assert_eq!(
            plan_return(
                SaleStatus::Posted,
                &lines,
                &[ReturnLineRequest {
                    target: ReturnTarget::SaleItem(1),
                    qty: Some(3),
                }],
            ),
            Err(SaleError::ReturnExceedsSold {
                requested: 3,
                returnable: 2
            })
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn unit_strategy() -> impl Strategy<Value = UnitType> {
        prop_oneof![
            Just(UnitType::Carton),
            Just(UnitType::Pack),
            Just(UnitType::Blister),
            Just(UnitType::Tablet),
        ]
    }

    fn line_strategy() -> impl Strategy<Value = SaleLineInput> {
        (1i64..4, 1i64..6, unit_strategy(), 0i64..10_000).prop_map(|(id, qty, unit, cents)| {
            SaleLineInput {
                medicine_id: id,
                qty,
                unit_type: unit,
                unit_price: Decimal::new(cents, 2),
            }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// An accepted sale never drives any balance negative; a rejected
        /// one asked for more than was on hand
        #[test]
        fn prop_posted_sale_never_goes_negative(
            stocks in prop::collection::vec(0i64..600, 3),
            lines in prop::collection::vec(line_strategy(), 1..6)
        ) {
            let config = PackagingConfig::new(2, 3, 5);
            let snapshots: Vec<StockSnapshot> = stocks
                .iter()
                .enumerate()
                .map(|(i, s)| snapshot(i as i64 + 1, *s, config))
                .collect();

            match plan_sale(&lines, &snapshots, true) {
                Ok(plan) => {
                    for debit in &plan.debits {
                        let available = snapshots[(debit.medicine_id - 1) as usize].stock_base_qty;
                        let change = project(debit.medicine_id, available, -debit.base_qty, StockPolicy::NonNegative);
                        prop_assert!(change.is_ok());
                        prop_assert!(change.unwrap().new_balance >= 0);
                    }
                    let line_total: Decimal = plan.lines.iter().map(|l| l.line_total).sum();
                    prop_assert_eq!(plan.total, line_total);
                }
                Err(SaleError::InsufficientStock { available, requested, .. }) => {
                    prop_assert!(requested > available);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        /// A full return puts back exactly the base units that were sold
        #[test]
        fn prop_full_return_restores_sold_quantity(
            qtys in prop::collection::vec((1i64..20, 1i64..30), 1..6)
        ) {
            let lines: Vec<SoldLine> = qtys
                .iter()
                .enumerate()
                .map(|(i, (qty, per))| sold(i as i64 + 1, (i % 2) as i64 + 1, *qty, *per))
                .collect();

            let planned = plan_return(SaleStatus::Posted, &lines, &[]).unwrap();
            let sold_base: i64 = lines.iter().map(|l| l.base_qty).sum();
            let returned_base: i64 = planned.iter().map(|p| p.base_qty).sum();

            prop_assert_eq!(sold_base, returned_base);
        }
    }
}
