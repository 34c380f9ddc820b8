//! Purchase order receiving rules
//!
//! Receiving is validated as a whole before anything is written: a request
//! either passes for every line or is rejected without mutating any line.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PurchaseStatus;

/// Current receiving state of one order line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineState {
    pub id: i64,
    pub name: String,
    pub qty: i64,
    pub received_qty: i64,
}

impl OrderLineState {
    /// Quantity not yet received, never negative
    pub fn outstanding(&self) -> i64 {
        (self.qty - self.received_qty).max(0)
    }
}

/// One requested receipt entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRequest {
    pub purchase_item_id: i64,
    pub received_qty: i64,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// A validated receipt against one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReceipt {
    pub line_id: i64,
    /// Quantity in the line's own unit
    pub qty: i64,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Receipts to apply, in the order the lines were first requested
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptPlan {
    pub receipts: Vec<PlannedReceipt>,
}

impl ReceiptPlan {
    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptError {
    #[error("purchase order is {status}, only ordered purchases can be received")]
    OrderNotOpen { status: PurchaseStatus },

    #[error("purchase item {purchase_item_id} does not belong to this order")]
    UnknownLine { purchase_item_id: i64 },

    #[error("received quantity for purchase item {purchase_item_id} cannot be negative")]
    NegativeQuantity { purchase_item_id: i64 },

    #[error("received quantities for purchase item {purchase_item_id} are too large")]
    QuantityOverflow { purchase_item_id: i64 },

    #[error("cannot receive {requested} of \"{name}\", only {outstanding} outstanding")]
    ExceedsOutstanding {
        purchase_item_id: i64,
        name: String,
        requested: i64,
        outstanding: i64,
    },
}

/// Validate every entry of a receive request against the order's lines.
///
/// Entries for the same line are summed before the outstanding check. Zero
/// quantities pass validation but produce no receipt.
pub fn plan_receipt(
    status: PurchaseStatus,
    lines: &[OrderLineState],
    requests: &[ReceiptRequest],
) -> Result<ReceiptPlan, ReceiptError> {
    if status != PurchaseStatus::Ordered {
        return Err(ReceiptError::OrderNotOpen { status });
    }

    let by_id: HashMap<i64, &OrderLineState> = lines.iter().map(|l| (l.id, l)).collect();
    let mut receipts: Vec<PlannedReceipt> = Vec::new();
    let mut slot: HashMap<i64, usize> = HashMap::new();

    for request in requests {
        let line = by_id
            .get(&request.purchase_item_id)
            .ok_or(ReceiptError::UnknownLine {
                purchase_item_id: request.purchase_item_id,
            })?;

        if request.received_qty < 0 {
            return Err(ReceiptError::NegativeQuantity {
                purchase_item_id: line.id,
            });
        }

        let idx = *slot.entry(line.id).or_insert_with(|| {
            receipts.push(PlannedReceipt {
                line_id: line.id,
                qty: 0,
                batch_no: None,
                expiry_date: None,
            });
            receipts.len() - 1
        });

        let receipt = &mut receipts[idx];
        receipt.qty = receipt
            .qty
            .checked_add(request.received_qty)
            .ok_or(ReceiptError::QuantityOverflow {
                purchase_item_id: line.id,
            })?;
        if request.batch_no.is_some() {
            receipt.batch_no = request.batch_no.clone();
        }
        if request.expiry_date.is_some() {
            receipt.expiry_date = request.expiry_date;
        }

        if receipt.qty > line.outstanding() {
            return Err(ReceiptError::ExceedsOutstanding {
                purchase_item_id: line.id,
                name: line.name.clone(),
                requested: receipt.qty,
                outstanding: line.outstanding(),
            });
        }
    }

    receipts.retain(|r| r.qty > 0);
    Ok(ReceiptPlan { receipts })
}

/// Apply a validated plan to in-memory line state
pub fn apply_plan(lines: &mut [OrderLineState], plan: &ReceiptPlan) {
    for receipt in &plan.receipts {
        if let Some(line) = lines.iter_mut().find(|l| l.id == receipt.line_id) {
            line.received_qty += receipt.qty;
        }
    }
}

/// Total outstanding quantity over all lines
pub fn remaining_quantity(lines: &[OrderLineState]) -> i64 {
    lines.iter().map(OrderLineState::outstanding).sum()
}

/// Order status implied by its lines
pub fn status_after(lines: &[OrderLineState]) -> PurchaseStatus {
    if remaining_quantity(lines) == 0 {
        PurchaseStatus::Received
    } else {
        PurchaseStatus::Ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i64, qty: i64, received_qty: i64) -> OrderLineState {
        OrderLineState {
            id,
            name: format!("item-{}", id),
            qty,
            received_qty,
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

    #[test]
    fn test_partial_receipt_keeps_order_open() {
        let mut lines = vec![line(1, 100, 0)];
        let plan = plan_receipt(PurchaseStatus::Ordered, &lines, &[request(1, 40)]).unwrap();
        apply_plan(&mut lines, &plan);

        assert_eq!(lines[0].received_qty, 40);
        assert_eq!(status_after(&lines), PurchaseStatus::Ordered);
        assert_eq!(remaining_quantity(&lines), 60);
    }

    #[test]
    fn test_full_receipt_closes_order() {
        let mut lines = vec![line(1, 100, 40), line(2, 5, 5)];
        let plan = plan_receipt(PurchaseStatus::Ordered, &lines, &[request(1, 60)]).unwrap();
        apply_plan(&mut lines, &plan);

        assert_eq!(status_after(&lines), PurchaseStatus::Received);
    }

    #[test]
    fn test_over_receipt_rejects_whole_request() {
        let lines = vec![line(1, 10, 0), line(2, 10, 8)];
        let err = plan_receipt(
            PurchaseStatus::Ordered,
            &lines,
            &[request(1, 10), request(2, 3)],
        )
        .unwrap_err();

        assert_eq!(
            err,
            ReceiptError::ExceedsOutstanding {
                purchase_item_id: 2,
                name: "item-2".to_string(),
                requested: 3,
                outstanding: 2,
            }
        );
    }

    #[test]
    fn test_fully_received_line_rejects_more() {
        let lines = vec![line(1, 10, 10)];
        let err = plan_receipt(PurchaseStatus::Ordered, &lines, &[request(1, 1)]).unwrap_err();
        assert!(matches!(err, ReceiptError::ExceedsOutstanding { outstanding: 0, .. }));
    }

    #[test]
    fn test_duplicate_entries_are_summed() {
        let lines = vec![line(1, 10, 0)];
        let err = plan_receipt(
            PurchaseStatus::Ordered,
            &lines,
            &[request(1, 6), request(1, 6)],
        )
        .unwrap_err();
        assert!(matches!(err, ReceiptError::ExceedsOutstanding { requested: 12, .. }));

        let plan = plan_receipt(
            PurchaseStatus::Ordered,
            &lines,
            &[request(1, 4), request(1, 6)],
        )
        .unwrap();
        assert_eq!(plan.receipts.len(), 1);
        assert_eq!(plan.receipts[0].qty, 10);
    }

    #[test]
    fn test_zero_quantity_is_skipped() {
        let lines = vec![line(1, 10, 10), line(2, 10, 0)];
        let plan = plan_receipt(
            PurchaseStatus::Ordered,
            &lines,
            &[request(1, 0), request(2, 0)],
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_line_and_negative_quantity() {
        let lines = vec![line(1, 10, 0)];
        assert_eq!(
            plan_receipt(PurchaseStatus::Ordered, &lines, &[request(9, 1)]),
            Err(ReceiptError::UnknownLine { purchase_item_id: 9 })
        );
        assert_eq!(
            plan_receipt(PurchaseStatus::Ordered, &lines, &[request(1, -1)]),
            Err(ReceiptError::NegativeQuantity { purchase_item_id: 1 })
        );
    }

    #[test]
    fn test_received_order_cannot_be_received() {
        let lines = vec![line(1, 10, 10)];
        assert_eq!(
            plan_receipt(PurchaseStatus::Received, &lines, &[request(1, 0)]),
            Err(ReceiptError::OrderNotOpen {
                status: PurchaseStatus::Received
            })
        );
    }

    #[test]
    fn test_later_batch_wins() {
        let lines = vec![line(1, 10, 0)];
        let mut first = request(1, 2);
        first.batch_no = Some("B1".to_string());
        let mut second = request(1, 3);
        second.batch_no = Some("B2".to_string());
        let third = request(1, 1);

        let plan = plan_receipt(PurchaseStatus::Ordered, &lines, &[first, second, third]).unwrap();
        assert_eq!(plan.receipts[0].batch_no.as_deref(), Some("B2"));
        assert_eq!(plan.receipts[0].qty, 6);
    }

    #[test]
    fn test_summed_quantities_that_overflow_are_rejected() {
        let lines = vec![line(1, 10, 0)];

        assert_eq!(
            plan_receipt(
                PurchaseStatus::Ordered,
                &lines,
                &[request(1, 1), request(1, i64::MAX)]
            ),
            Err(ReceiptError::QuantityOverflow {
                purchase_item_id: 1
            })
        );

        // Would wrap back to 3 without the checked sum
        assert!(plan_receipt(
            PurchaseStatus::Ordered,
            &lines,
            &[request(1, 5), request(1, i64::MAX), request(1, i64::MAX)]
        )
        .is_err());
    }
}
