//! Medicine stock projector
//!
//! Keeps the cached balance on `medicines` in step with the ledger. Rows are
//! locked with `SELECT ... FOR UPDATE` in ascending id order and mutated in
//! the same transaction as the ledger insert.

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::stock::{lock_order, project, StockChange, StockPolicy};
use shared::{base_to_display, PackagingConfig};
use sqlx::{FromRow, PgConnection};

use crate::error::AppResult;

/// Medicine row held under lock for the rest of the transaction
#[derive(Debug, Clone, FromRow)]
pub struct LockedMedicine {
    pub id: i64,
    pub name: String,
    pub stock_base_qty: i64,
    pub packs_per_carton: i64,
    pub blisters_per_pack: i64,
    pub tablets_per_blister: i64,
}

impl LockedMedicine {
    pub fn packaging(&self) -> PackagingConfig {
        PackagingConfig::new(
            self.packs_per_carton,
            self.blisters_per_pack,
            self.tablets_per_blister,
        )
    }
}

/// Lock the given medicines of a pharmacy, one row at a time in ascending id
/// order. Ids that do not exist for the pharmacy are absent from the result.
pub async fn lock_medicines<I>(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    ids: I,
) -> AppResult<HashMap<i64, LockedMedicine>>
where
    I: IntoIterator<Item = i64>,
{
    let mut locked = HashMap::new();

    for id in lock_order(ids) {
        let row = sqlx::query_as::<_, LockedMedicine>(
            r#"
            SELECT id, name, stock_base_qty, packs_per_carton, blisters_per_pack, tablets_per_blister
            FROM medicines
            WHERE id = $1 AND pharmacy_id = $2
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(pharmacy_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = row {
            locked.insert(row.id, row);
        }
    }

    Ok(locked)
}

/// Apply `delta` base units to a locked medicine and persist both cached
/// balances. The in-memory row is updated so later lines see the new balance.
pub async fn apply_delta(
    conn: &mut PgConnection,
    medicine: &mut LockedMedicine,
    delta: i64,
    policy: StockPolicy,
) -> AppResult<StockChange> {
    let change = project(medicine.id, medicine.stock_base_qty, delta, policy)?;
    let display_qty: Decimal = base_to_display(change.new_balance, &medicine.packaging());

    sqlx::query(
        r#"
        UPDATE medicines
        SET stock_base_qty = $1, stock_qty = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(change.new_balance)
    .bind(display_qty)
    .bind(medicine.id)
    .execute(&mut *conn)
    .await?;

    medicine.stock_base_qty = change.new_balance;
    Ok(change)
}
