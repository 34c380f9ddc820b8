//! Purchase order receiving
//!
//! One transaction per request: the order row is locked, the whole request is
//! validated against the current lines, then every accepted line credits stock
//! and writes one ledger movement before the order status is recomputed.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{DocumentRef, MovementReason, PurchaseStatus};
use shared::receiving::{
    apply_plan, plan_receipt, remaining_quantity, status_after, OrderLineState, ReceiptRequest,
};
use shared::stock::StockPolicy;
use shared::{compute_base_quantity, is_expired, validate_batch_no, UnitType};
use sqlx::PgPool;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, NewMovement};
use crate::services::medicine::{self, ReceivedMedicine};
use crate::services::purchase::{self, PurchaseOrderItem};
use crate::services::stock;

/// Receiving service for purchase orders
#[derive(Clone)]
pub struct ReceivingService {
    db: PgPool,
}

/// Input for receiving against an order
#[derive(Debug, Deserialize, Validate)]
pub struct ReceiveInput {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<ReceiveItemInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveItemInput {
    pub purchase_item_id: i64,
    pub received_qty: i64,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Result of a receive request
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveOutcome {
    pub id: i64,
    pub status: PurchaseStatus,
    pub received_items: usize,
    pub remaining_quantity: i64,
}

/// A receipt with its medicine resolved and quantity converted
struct ResolvedReceipt<'a> {
    item: &'a PurchaseOrderItem,
    medicine_id: i64,
    unit: UnitType,
    qty: i64,
    base_qty: i64,
    batch_no: Option<String>,
    expiry_date: Option<NaiveDate>,
}

impl ReceivingService {
    /// Create a new ReceivingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Receive some or all outstanding quantities of an order.
    ///
    /// Either every entry is applied or none is.
    pub async fn receive(
        &self,
        pharmacy_id: i64,
        order_id: i64,
        input: ReceiveInput,
    ) -> AppResult<ReceiveOutcome> {
        let requests = to_requests(input)?;

        let mut tx = self.db.begin().await?;

        let order = purchase::lock_order(&mut tx, pharmacy_id, order_id).await?;
        let items = purchase::load_items(&mut tx, order_id).await?;
        let mut states: Vec<OrderLineState> =
            items.iter().map(PurchaseOrderItem::line_state).collect();

        let plan = plan_receipt(order.status()?, &states, &requests)?;

        let by_id: HashMap<i64, &PurchaseOrderItem> = items.iter().map(|i| (i.id, i)).collect();
        let mut resolved = Vec::with_capacity(plan.receipts.len());

        for receipt in &plan.receipts {
            let item = *by_id.get(&receipt.line_id).ok_or_else(|| {
                AppError::Internal(format!("planned line {} missing from order", receipt.line_id))
            })?;

            let medicine_id = match item.medicine_id {
                Some(id) => id,
                None => {
                    let received = ReceivedMedicine {
                        identity: item.identity(),
                        packaging: item.packaging(),
                        retail_price: item.retail_price,
                        purchase_price: item.unit_cost,
                        batch_no: receipt.batch_no.as_deref(),
                        expiry_date: receipt.expiry_date,
                    };
                    medicine::resolve_or_create(&mut tx, pharmacy_id, &received).await?
                }
            };

            let unit = item.unit();
            let base_qty = compute_base_quantity(unit, receipt.qty, &item.packaging())?;

            resolved.push(ResolvedReceipt {
                item,
                medicine_id,
                unit,
                qty: receipt.qty,
                base_qty,
                batch_no: receipt.batch_no.clone(),
                expiry_date: receipt.expiry_date,
            });
        }

        let mut locked =
            stock::lock_medicines(&mut tx, pharmacy_id, resolved.iter().map(|r| r.medicine_id))
                .await?;

        let document = DocumentRef::PurchaseOrder(order_id);
        let today = Utc::now().date_naive();

        for r in &resolved {
            let medicine = locked
                .get_mut(&r.medicine_id)
                .ok_or_else(|| AppError::NotFound("Medicine".to_string()))?;

            let change =
                stock::apply_delta(&mut tx, medicine, r.base_qty, StockPolicy::Additive).await?;

            ledger::write_movement(
                &mut tx,
                NewMovement {
                    pharmacy_id,
                    medicine_id: r.medicine_id,
                    base_qty_change: r.base_qty,
                    reason: MovementReason::Purchase,
                    document,
                    unit_type: r.unit,
                    unit_qty: r.qty,
                    balance_after_base: change.new_balance,
                    note: None,
                },
            )
            .await?;

            sqlx::query(
                r#"
                UPDATE purchase_order_items
                SET received_qty = received_qty + $1,
                    batch_no = COALESCE($2, batch_no),
                    expiry_date = COALESCE($3, expiry_date),
                    medicine_id = $4
                WHERE id = $5
                "#,
            )
            .bind(r.qty)
            .bind(&r.batch_no)
            .bind(r.expiry_date)
            .bind(r.medicine_id)
            .bind(r.item.id)
            .execute(&mut *tx)
            .await?;

            medicine::record_batch(&mut tx, r.medicine_id, r.batch_no.as_deref(), r.expiry_date)
                .await?;

            if let Some(expiry) = r.expiry_date {
                if is_expired(expiry, today) {
                    tracing::warn!(
                        order_id,
                        medicine_id = r.medicine_id,
                        %expiry,
                        "received stock is already expired"
                    );
                }
            }
        }

        apply_plan(&mut states, &plan);
        let status = status_after(&states);
        let remaining = remaining_quantity(&states);

        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $1,
                received_at = CASE WHEN $1 = 'received' THEN NOW() ELSE received_at END,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(status.as_str())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id,
            pharmacy_id,
            received_items = resolved.len(),
            remaining_quantity = remaining,
            status = status.as_str(),
            "purchase order received"
        );

        Ok(ReceiveOutcome {
            id: order_id,
            status,
            received_items: resolved.len(),
            remaining_quantity: remaining,
        })
    }
}

fn to_requests(input: ReceiveInput) -> AppResult<Vec<ReceiptRequest>> {
    input
        .items
        .into_iter()
        .map(|item| {
            let batch_no = item
                .batch_no
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty());
            if let Some(batch) = batch_no.as_deref() {
                validate_batch_no(batch).map_err(|m| {
                    AppError::validation("batch_no", m, "رقم التشغيلة غير صالح")
                })?;
            }
            Ok(ReceiptRequest {
                purchase_item_id: item.purchase_item_id,
                received_qty: item.received_qty,
                batch_no,
                expiry_date: item.expiry_date,
            })
        })
        .collect()
}
