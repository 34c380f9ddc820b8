//! Inventory service: manual adjustments, ledger history and reconciliation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{DocumentRef, MovementReason};
use shared::stock::{detect_drift, LedgerDrift, StockPolicy};
use shared::types::{PaginatedResponse, Pagination};
use shared::{base_to_display, compute_base_quantity, UnitType};
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, InventoryMovement, NewMovement};
use crate::services::{medicine, stock};

/// Inventory service for stock corrections and audits
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
    default_unit: UnitType,
}

/// Signed stock correction, e.g. `-2` packs for breakage
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustmentInput {
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_type: Option<String>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/// Result of an adjustment
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    pub medicine_id: i64,
    pub base_qty_change: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    /// New balance in packs
    pub stock_qty: Decimal,
}

/// Result of comparing cached balances with the ledger
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub medicines_checked: usize,
    pub drifted: Vec<LedgerDrift>,
}

#[derive(Debug, FromRow)]
struct BalanceRow {
    id: i64,
    name: String,
    stock_base_qty: i64,
    ledger_base_qty: i64,
}

impl InventoryService {
    /// Create a new InventoryService instance
    pub fn new(db: PgPool, default_unit: UnitType) -> Self {
        Self { db, default_unit }
    }

    /// Apply a manual stock correction. Negative adjustments may not take the
    /// balance below zero.
    pub async fn adjust(
        &self,
        pharmacy_id: i64,
        input: AdjustmentInput,
    ) -> AppResult<AdjustmentOutcome> {
        if input.qty == 0 {
            return Err(AppError::validation(
                "qty",
                "Adjustment quantity cannot be zero",
                "كمية التسوية لا يمكن أن تكون صفراً",
            ));
        }
        let unit = UnitType::parse_or(input.unit_type.as_deref(), self.default_unit);
        let note = input
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let mut tx = self.db.begin().await?;

        let mut locked = stock::lock_medicines(&mut tx, pharmacy_id, [input.medicine_id]).await?;
        let medicine = locked
            .get_mut(&input.medicine_id)
            .ok_or_else(|| AppError::NotFound("Medicine".to_string()))?;

        let packaging = medicine.packaging();
        let delta = compute_base_quantity(unit, input.qty, &packaging)?;
        let change = stock::apply_delta(&mut tx, medicine, delta, StockPolicy::NonNegative).await?;

        ledger::write_movement(
            &mut tx,
            NewMovement {
                pharmacy_id,
                medicine_id: input.medicine_id,
                base_qty_change: delta,
                reason: MovementReason::Adjustment,
                document: DocumentRef::Adjustment(input.medicine_id),
                unit_type: unit,
                unit_qty: input.qty,
                balance_after_base: change.new_balance,
                note,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            medicine_id = input.medicine_id,
            pharmacy_id,
            delta,
            new_balance = change.new_balance,
            "stock adjusted"
        );

        Ok(AdjustmentOutcome {
            medicine_id: input.medicine_id,
            base_qty_change: delta,
            previous_balance: change.previous_balance,
            new_balance: change.new_balance,
            stock_qty: base_to_display(change.new_balance, &packaging),
        })
    }

    /// Ledger history for one medicine, newest first
    pub async fn movements(
        &self,
        pharmacy_id: i64,
        medicine_id: i64,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryMovement>> {
        {
            let mut conn = self.db.acquire().await?;
            medicine::ensure_owned(&mut conn, pharmacy_id, medicine_id).await?;
        }

        let (data, total) =
            ledger::list_for_medicine(&self.db, pharmacy_id, medicine_id, &pagination).await?;

        Ok(PaginatedResponse {
            data,
            pagination: pagination.meta(total),
        })
    }

    /// Recompute every balance of the pharmacy from the ledger and report
    /// medicines whose cached balance disagrees
    pub async fn reconcile(&self, pharmacy_id: i64) -> AppResult<ReconciliationReport> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT m.id, m.name, m.stock_base_qty,
                   COALESCE(SUM(im.base_qty_change), 0)::BIGINT AS ledger_base_qty
            FROM medicines m
            LEFT JOIN inventory_movements im ON im.medicine_id = m.id
            WHERE m.pharmacy_id = $1
            GROUP BY m.id, m.name, m.stock_base_qty
            ORDER BY m.id
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&self.db)
        .await?;

        let drifted: Vec<LedgerDrift> = rows
            .iter()
            .filter_map(|r| detect_drift(r.id, &r.name, r.stock_base_qty, r.ledger_base_qty))
            .collect();

        for d in &drifted {
            tracing::warn!(
                medicine_id = d.medicine_id,
                cached = d.cached_base_qty,
                ledger = d.ledger_base_qty,
                drift = d.drift,
                "stock cache drifted from ledger"
            );
        }

        Ok(ReconciliationReport {
            medicines_checked: rows.len(),
            drifted,
        })
    }
}
