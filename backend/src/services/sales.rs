//! Point-of-sale service
//!
//! Posting debits stock under the non-negative policy and returning credits it
//! back. Both run in one transaction with medicine rows locked in ascending id
//! order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{DocumentRef, MovementReason, SaleStatus};
use shared::sales::{
    plan_payments, plan_return, plan_sale, PaymentInput, PlannedReturn, ReturnLineRequest,
    ReturnTarget, SaleError, SaleLineInput, SalePlan, SoldLine, StockSnapshot,
};
use shared::stock::StockPolicy;
use shared::UnitType;
use sqlx::{FromRow, PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, NewMovement};
use crate::services::stock::{self, LockedMedicine};

/// Sales service for POS invoices
#[derive(Clone)]
pub struct SalesService {
    db: PgPool,
    default_unit: UnitType,
}

/// Sale header
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Sale {
    pub id: i64,
    pub pharmacy_id: i64,
    pub invoice_no: Option<String>,
    pub customer_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub notes: Option<String>,
    pub status: String,
    pub total: Decimal,
    pub return_note: Option<String>,
    pub created_by: Option<i64>,
    pub posted_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn status(&self) -> AppResult<SaleStatus> {
        SaleStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("sale {} has unknown status {}", self.id, self.status))
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_type: String,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub base_qty: i64,
    pub returned_qty: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SalePayment {
    pub id: i64,
    pub sale_id: i64,
    pub method: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Invoice with its lines and payments
#[derive(Debug, Clone, Serialize)]
pub struct SaleReceipt {
    pub invoice: Sale,
    pub items: Vec<SaleItem>,
    pub payments: Vec<SalePayment>,
}

/// Input for a new sale or draft
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSaleInput {
    #[validate(length(min = 1, message = "a sale needs at least one item"))]
    pub items: Vec<SaleItemInput>,
    pub customer_id: Option<i64>,
    pub branch_id: Option<i64>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub payments: Vec<PaymentInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaleItemInput {
    pub medicine_id: i64,
    pub qty: i64,
    pub unit_price: Decimal,
    pub unit_type: Option<String>,
}

/// Input for posting a stored draft
#[derive(Debug, Deserialize)]
pub struct PostDraftInput {
    #[serde(default)]
    pub payments: Vec<PaymentInput>,
}

/// Input for returning a sale; omitting `items` returns the whole sale
#[derive(Debug, Deserialize, Validate)]
pub struct ReturnSaleInput {
    #[validate(length(min = 1, message = "omit items to return the whole sale"))]
    pub items: Option<Vec<ReturnItemInput>>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/// A line to return, addressed by sale item or by medicine
#[derive(Debug, Serialize, Deserialize)]
pub struct ReturnItemInput {
    pub sale_item_id: Option<i64>,
    pub medicine_id: Option<i64>,
    pub qty: Option<i64>,
}

impl ReturnItemInput {
    fn to_request(&self) -> AppResult<ReturnLineRequest> {
        let target = match (self.sale_item_id, self.medicine_id) {
            (Some(id), _) => ReturnTarget::SaleItem(id),
            (None, Some(id)) => ReturnTarget::Medicine(id),
            (None, None) => {
                return Err(AppError::validation(
                    "items",
                    "each returned item needs sale_item_id or medicine_id",
                    "يجب تحديد البند أو الصنف المراد إرجاعه",
                ))
            }
        };
        Ok(ReturnLineRequest {
            target,
            qty: self.qty,
        })
    }
}

/// Result of a return
#[derive(Debug, Clone, Serialize)]
pub struct ReturnOutcome {
    pub ok: bool,
    pub sale_id: i64,
    pub new_status: SaleStatus,
    pub returned_items: Vec<PlannedReturn>,
}

impl SalesService {
    /// Create a new SalesService instance; `default_unit` applies to lines
    /// without a recognised unit type
    pub fn new(db: PgPool, default_unit: UnitType) -> Self {
        Self { db, default_unit }
    }

    /// Post a sale, or store it as a draft without touching stock
    pub async fn create_sale(
        &self,
        pharmacy_id: i64,
        user_id: i64,
        input: CreateSaleInput,
        draft: bool,
    ) -> AppResult<SaleReceipt> {
        let lines: Vec<SaleLineInput> = input
            .items
            .iter()
            .map(|item| SaleLineInput {
                medicine_id: item.medicine_id,
                qty: item.qty,
                unit_type: UnitType::parse_or(item.unit_type.as_deref(), self.default_unit),
                unit_price: item.unit_price,
            })
            .collect();

        let mut tx = self.db.begin().await?;

        let mut locked =
            stock::lock_medicines(&mut tx, pharmacy_id, lines.iter().map(|l| l.medicine_id))
                .await?;
        let plan = plan_sale(&lines, &snapshots(&locked), !draft)?;
        let payments = if draft {
            Vec::new()
        } else {
            plan_payments(plan.total, &input.payments)?
        };

        let status = if draft {
            SaleStatus::Draft
        } else {
            SaleStatus::Posted
        };

        let sale_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sales (
                pharmacy_id, customer_id, branch_id, notes, status, total, created_by, posted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $5 = 'posted' THEN NOW() END)
            RETURNING id
            "#,
        )
        .bind(pharmacy_id)
        .bind(input.customer_id)
        .bind(input.branch_id)
        .bind(&input.notes)
        .bind(status.as_str())
        .bind(plan.total)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE sales SET invoice_no = $1 WHERE id = $2")
            .bind(DocumentRef::Sale(sale_id).ref_id())
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;

        for line in &plan.lines {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    sale_id, medicine_id, qty, unit_type, unit_price, line_total, base_qty
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(sale_id)
            .bind(line.medicine_id)
            .bind(line.qty)
            .bind(line.unit_type.as_str())
            .bind(line.unit_price)
            .bind(line.line_total)
            .bind(line.base_qty)
            .execute(&mut *tx)
            .await?;
        }

        if !draft {
            debit_stock(&mut tx, pharmacy_id, sale_id, &plan, &mut locked).await?;
            insert_payments(&mut tx, sale_id, &payments).await?;
        }

        let receipt = load_receipt(&mut tx, pharmacy_id, sale_id).await?;
        tx.commit().await?;

        tracing::info!(
            sale_id,
            pharmacy_id,
            lines = plan.lines.len(),
            total = %plan.total,
            status = status.as_str(),
            "sale saved"
        );

        Ok(receipt)
    }

    /// Post a stored draft through the same debit path as a new sale
    pub async fn post_draft(
        &self,
        pharmacy_id: i64,
        sale_id: i64,
        input: PostDraftInput,
    ) -> AppResult<SaleReceipt> {
        let mut tx = self.db.begin().await?;

        let sale = lock_sale(&mut tx, pharmacy_id, sale_id).await?;
        let status = sale.status()?;
        if status != SaleStatus::Draft {
            return Err(SaleError::NotDraft { status }.into());
        }

        let items = load_items(&mut tx, sale_id).await?;
        let lines: Vec<SaleLineInput> = items
            .iter()
            .map(|item| SaleLineInput {
                medicine_id: item.medicine_id,
                qty: item.qty,
                unit_type: UnitType::parse_or(Some(&item.unit_type), self.default_unit),
                unit_price: item.unit_price,
            })
            .collect();

        let mut locked =
            stock::lock_medicines(&mut tx, pharmacy_id, lines.iter().map(|l| l.medicine_id))
                .await?;
        let plan = plan_sale(&lines, &snapshots(&locked), true)?;
        let payments = plan_payments(plan.total, &input.payments)?;

        // Packaging may have changed since the draft was saved
        for (item, line) in items.iter().zip(&plan.lines) {
            sqlx::query("UPDATE sale_items SET base_qty = $1, line_total = $2 WHERE id = $3")
                .bind(line.base_qty)
                .bind(line.line_total)
                .bind(item.id)
                .execute(&mut *tx)
                .await?;
        }

        debit_stock(&mut tx, pharmacy_id, sale_id, &plan, &mut locked).await?;
        insert_payments(&mut tx, sale_id, &payments).await?;

        sqlx::query(
            r#"
            UPDATE sales
            SET status = $1, total = $2, posted_at = NOW(), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(SaleStatus::Posted.as_str())
        .bind(plan.total)
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

        let receipt = load_receipt(&mut tx, pharmacy_id, sale_id).await?;
        tx.commit().await?;

        tracing::info!(sale_id, pharmacy_id, total = %plan.total, "draft sale posted");

        Ok(receipt)
    }

    /// Get a sale with its lines and payments
    pub async fn get_sale(&self, pharmacy_id: i64, sale_id: i64) -> AppResult<SaleReceipt> {
        let mut conn = self.db.acquire().await?;
        load_receipt(&mut conn, pharmacy_id, sale_id).await
    }

    /// Return part or all of a posted sale. The sale is marked `returned`
    /// afterwards and cannot be returned again.
    pub async fn return_sale(
        &self,
        pharmacy_id: i64,
        sale_id: i64,
        input: ReturnSaleInput,
    ) -> AppResult<ReturnOutcome> {
        let requests = input
            .items
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(ReturnItemInput::to_request)
            .collect::<AppResult<Vec<_>>>()?;
        let note = input
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let mut tx = self.db.begin().await?;

        let sale = lock_sale(&mut tx, pharmacy_id, sale_id).await?;
        let items = load_items(&mut tx, sale_id).await?;
        let sold: Vec<SoldLine> = items
            .iter()
            .map(|item| SoldLine {
                sale_item_id: item.id,
                medicine_id: item.medicine_id,
                qty: item.qty,
                unit_type: UnitType::parse_or(Some(&item.unit_type), self.default_unit),
                base_qty: item.base_qty,
                returned_qty: item.returned_qty,
            })
            .collect();

        let planned = plan_return(sale.status()?, &sold, &requests)?;

        let mut locked =
            stock::lock_medicines(&mut tx, pharmacy_id, planned.iter().map(|p| p.medicine_id))
                .await?;
        let document = DocumentRef::Sale(sale_id);

        for line in &planned {
            let medicine = locked
                .get_mut(&line.medicine_id)
                .ok_or_else(|| AppError::NotFound("Medicine".to_string()))?;
            let change =
                stock::apply_delta(&mut tx, medicine, line.base_qty, StockPolicy::Additive).await?;

            ledger::write_movement(
                &mut tx,
                NewMovement {
                    pharmacy_id,
                    medicine_id: line.medicine_id,
                    base_qty_change: line.base_qty,
                    reason: MovementReason::Return,
                    document,
                    unit_type: line.unit_type,
                    unit_qty: line.qty,
                    balance_after_base: change.new_balance,
                    note,
                },
            )
            .await?;

            sqlx::query("UPDATE sale_items SET returned_qty = returned_qty + $1 WHERE id = $2")
                .bind(line.qty)
                .bind(line.sale_item_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE sales
            SET status = $1, return_note = $2, returned_at = NOW(), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(SaleStatus::Returned.as_str())
        .bind(note)
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            sale_id,
            pharmacy_id,
            returned_lines = planned.len(),
            "sale returned"
        );

        Ok(ReturnOutcome {
            ok: true,
            sale_id,
            new_status: SaleStatus::Returned,
            returned_items: planned,
        })
    }
}

fn snapshots(locked: &HashMap<i64, LockedMedicine>) -> Vec<StockSnapshot> {
    locked
        .values()
        .map(|m| StockSnapshot {
            medicine_id: m.id,
            name: m.name.clone(),
            stock_base_qty: m.stock_base_qty,
            packaging: m.packaging(),
        })
        .collect()
}

/// Debit every planned line and write one sale movement per line
async fn debit_stock(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    sale_id: i64,
    plan: &SalePlan,
    locked: &mut HashMap<i64, LockedMedicine>,
) -> AppResult<()> {
    let document = DocumentRef::Sale(sale_id);

    for line in &plan.lines {
        let medicine = locked
            .get_mut(&line.medicine_id)
            .ok_or_else(|| AppError::NotFound("Medicine".to_string()))?;
        let change =
            stock::apply_delta(conn, medicine, -line.base_qty, StockPolicy::NonNegative).await?;

        ledger::write_movement(
            conn,
            NewMovement {
                pharmacy_id,
                medicine_id: line.medicine_id,
                base_qty_change: -line.base_qty,
                reason: MovementReason::Sale,
                document,
                unit_type: line.unit_type,
                unit_qty: line.qty,
                balance_after_base: change.new_balance,
                note: None,
            },
        )
        .await?;
    }

    Ok(())
}

async fn insert_payments(
    conn: &mut PgConnection,
    sale_id: i64,
    payments: &[PaymentInput],
) -> AppResult<()> {
    for payment in payments.iter().filter(|p| p.amount > Decimal::ZERO) {
        sqlx::query("INSERT INTO sale_payments (sale_id, method, amount) VALUES ($1, $2, $3)")
            .bind(sale_id)
            .bind(payment.method.as_str())
            .bind(payment.amount)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

const SALE_COLUMNS: &str = "id, pharmacy_id, invoice_no, customer_id, branch_id, notes, status, \
    total, return_note, created_by, posted_at, returned_at, created_at, updated_at";

async fn lock_sale(conn: &mut PgConnection, pharmacy_id: i64, sale_id: i64) -> AppResult<Sale> {
    sqlx::query_as::<_, Sale>(&format!(
        "SELECT {} FROM sales WHERE id = $1 AND pharmacy_id = $2 FOR UPDATE",
        SALE_COLUMNS
    ))
    .bind(sale_id)
    .bind(pharmacy_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Sale".to_string()))
}

async fn load_items(conn: &mut PgConnection, sale_id: i64) -> AppResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT id, sale_id, medicine_id, qty, unit_type, unit_price, line_total, base_qty, returned_qty
        FROM sale_items
        WHERE sale_id = $1
        ORDER BY id
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

async fn load_receipt(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    sale_id: i64,
) -> AppResult<SaleReceipt> {
    let invoice = sqlx::query_as::<_, Sale>(&format!(
        "SELECT {} FROM sales WHERE id = $1 AND pharmacy_id = $2",
        SALE_COLUMNS
    ))
    .bind(sale_id)
    .bind(pharmacy_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

    let items = load_items(conn, sale_id).await?;

    let payments = sqlx::query_as::<_, SalePayment>(
        "SELECT id, sale_id, method, amount, created_at FROM sale_payments WHERE sale_id = $1 ORDER BY id",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(SaleReceipt {
        invoice,
        items,
        payments,
    })
}
