//! Inventory movement ledger
//!
//! Rows are only ever inserted. Writers run inside the caller's transaction
//! after the medicine row has been locked and its new balance computed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::models::{DocumentRef, MovementReason};
use shared::types::Pagination;
use shared::UnitType;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::error::AppResult;

/// One stock-affecting event as stored
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InventoryMovement {
    pub id: i64,
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    pub base_qty_change: i64,
    pub reason: String,
    pub ref_type: String,
    pub ref_id: String,
    pub unit_type: String,
    pub unit_label: String,
    pub unit_qty: i64,
    pub balance_after_base: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Movement to append
#[derive(Debug, Clone)]
pub struct NewMovement<'a> {
    pub pharmacy_id: i64,
    pub medicine_id: i64,
    /// Signed, in base units
    pub base_qty_change: i64,
    pub reason: MovementReason,
    pub document: DocumentRef,
    /// Unit and quantity as the user entered them
    pub unit_type: UnitType,
    pub unit_qty: i64,
    /// Balance after this movement, already computed by the stock projector
    pub balance_after_base: i64,
    pub note: Option<&'a str>,
}

/// Append one movement and return the balance it records
pub async fn write_movement(conn: &mut PgConnection, movement: NewMovement<'_>) -> AppResult<i64> {
    let balance_after_base = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO inventory_movements (
            pharmacy_id, medicine_id, base_qty_change, reason, ref_type, ref_id,
            unit_type, unit_label, unit_qty, balance_after_base, note
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING balance_after_base
        "#,
    )
    .bind(movement.pharmacy_id)
    .bind(movement.medicine_id)
    .bind(movement.base_qty_change)
    .bind(movement.reason.as_str())
    .bind(movement.document.ref_type())
    .bind(movement.document.ref_id())
    .bind(movement.unit_type.as_str())
    .bind(movement.unit_type.label_ar())
    .bind(movement.unit_qty)
    .bind(movement.balance_after_base)
    .bind(movement.note)
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(
        medicine_id = movement.medicine_id,
        change = movement.base_qty_change,
        reason = movement.reason.as_str(),
        balance_after_base,
        "ledger movement written"
    );

    Ok(balance_after_base)
}

/// Movements for a medicine, newest first
pub async fn list_for_medicine(
    db: &PgPool,
    pharmacy_id: i64,
    medicine_id: i64,
    pagination: &Pagination,
) -> AppResult<(Vec<InventoryMovement>, u64)> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM inventory_movements WHERE medicine_id = $1 AND pharmacy_id = $2",
    )
    .bind(medicine_id)
    .bind(pharmacy_id)
    .fetch_one(db)
    .await?;

    let movements = sqlx::query_as::<_, InventoryMovement>(
        r#"
        SELECT id, pharmacy_id, medicine_id, base_qty_change, reason, ref_type, ref_id,
               unit_type, unit_label, unit_qty, balance_after_base, note, created_at
        FROM inventory_movements
        WHERE medicine_id = $1 AND pharmacy_id = $2
        ORDER BY id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(medicine_id)
    .bind(pharmacy_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(db)
    .await?;

    Ok((movements, total.max(0) as u64))
}

/// Movements written for one document, e.g. every line of `PO-12`
pub async fn list_for_document(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    document: DocumentRef,
) -> AppResult<Vec<InventoryMovement>> {
    let movements = sqlx::query_as::<_, InventoryMovement>(
        r#"
        SELECT id, pharmacy_id, medicine_id, base_qty_change, reason, ref_type, ref_id,
               unit_type, unit_label, unit_qty, balance_after_base, note, created_at
        FROM inventory_movements
        WHERE pharmacy_id = $1 AND ref_type = $2 AND ref_id = $3
        ORDER BY id
        "#,
    )
    .bind(pharmacy_id)
    .bind(document.ref_type())
    .bind(document.ref_id())
    .fetch_all(&mut *conn)
    .await?;

    Ok(movements)
}
