//! Purchase order service: ordering, lookup and supplier payments

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{DocumentRef, MedicineIdentity, PurchaseStatus};
use shared::receiving::{remaining_quantity, OrderLineState};
use shared::{
    derive_unit_prices, validate_barcode, validate_currency_code, validate_exchange_rate,
    validate_medicine_name, validate_order_quantity, validate_packaging, validate_payment_amount,
    validate_price,
    PackagingConfig, UnitType,
};
use sqlx::{FromRow, PgConnection, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, InventoryMovement};

/// Unit assumed for purchase lines without a recognised unit type
pub const DEFAULT_PURCHASE_UNIT: UnitType = UnitType::Carton;

/// Purchase service for supplier orders
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

/// Purchase order header
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseOrder {
    pub id: i64,
    pub pharmacy_id: i64,
    pub supplier_id: Option<i64>,
    pub supplier_name: Option<String>,
    pub status: String,
    pub total: Decimal,
    pub amount_received: Decimal,
    pub amount_remaining: Decimal,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub received_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn status(&self) -> AppResult<PurchaseStatus> {
        PurchaseStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!(
                "purchase order {} has unknown status {}",
                self.id, self.status
            ))
        })
    }
}

/// One ordered line
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseOrderItem {
    pub id: i64,
    pub purchase_order_id: i64,
    pub medicine_id: Option<i64>,
    pub name: String,
    pub barcode: Option<String>,
    pub unit_type: String,
    pub qty: i64,
    pub received_qty: i64,
    pub packs_per_carton: i64,
    pub blisters_per_pack: i64,
    pub tablets_per_blister: i64,
    pub unit_cost: Decimal,
    pub wholesale_price: Decimal,
    pub retail_price: Decimal,
    pub blister_price: Decimal,
    pub tablet_price: Decimal,
    pub line_total: Decimal,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl PurchaseOrderItem {
    pub fn packaging(&self) -> PackagingConfig {
        PackagingConfig::new(
            self.packs_per_carton,
            self.blisters_per_pack,
            self.tablets_per_blister,
        )
    }

    pub fn unit(&self) -> UnitType {
        UnitType::parse_or(Some(&self.unit_type), DEFAULT_PURCHASE_UNIT)
    }

    pub fn identity(&self) -> MedicineIdentity {
        MedicineIdentity::new(&self.name, self.barcode.as_deref())
    }

    pub fn line_state(&self) -> OrderLineState {
        OrderLineState {
            id: self.id,
            name: self.name.clone(),
            qty: self.qty,
            received_qty: self.received_qty,
        }
    }
}

/// Line with its outstanding quantity, for display
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderLine {
    #[serde(flatten)]
    pub item: PurchaseOrderItem,
    pub outstanding_qty: i64,
}

/// Order with lines and the stock movements it produced
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderLine>,
    pub remaining_quantity: i64,
    pub movements: Vec<InventoryMovement>,
}

/// Input for creating a purchase order
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseInput {
    pub supplier_id: Option<i64>,
    #[validate(length(max = 255))]
    pub supplier_name: Option<String>,
    pub currency: Option<String>,
    pub exchange_rate: Option<Decimal>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "a purchase order needs at least one item"))]
    pub items: Vec<CreatePurchaseItemInput>,
}

/// One line of a new purchase order.
///
/// Missing packaging factors default to 1; factors supplied as zero or
/// negative are rejected.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePurchaseItemInput {
    pub name: String,
    pub barcode: Option<String>,
    pub unit_type: Option<String>,
    pub qty: i64,
    pub unit_cost: Decimal,
    pub packs_per_carton: Option<i64>,
    pub blisters_per_pack: Option<i64>,
    pub tablets_per_blister: Option<i64>,
    pub batch_no: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl CreatePurchaseItemInput {
    fn packaging(&self) -> PackagingConfig {
        PackagingConfig::new(
            self.packs_per_carton.unwrap_or(1),
            self.blisters_per_pack.unwrap_or(1),
            self.tablets_per_blister.unwrap_or(1),
        )
    }
}

/// Supplier payment against an order
#[derive(Debug, Deserialize)]
pub struct RecordPaymentInput {
    pub amount: Decimal,
}

fn field_error(field: &str, message: &'static str, message_ar: &str) -> AppError {
    AppError::validation(field, message, message_ar)
}

impl PurchaseService {
    /// Create a new PurchaseService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create an order in `ordered` status with derived unit prices per line
    pub async fn create_order(
        &self,
        pharmacy_id: i64,
        user_id: i64,
        input: CreatePurchaseInput,
    ) -> AppResult<PurchaseOrderDetail> {
        let currency = input
            .currency
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| "EGP".to_string());
        validate_currency_code(&currency)
            .map_err(|m| field_error("currency", m, "رمز العملة غير صالح"))?;

        let exchange_rate = input.exchange_rate.unwrap_or(Decimal::ONE);
        validate_exchange_rate(exchange_rate)
            .map_err(|m| field_error("exchange_rate", m, "سعر الصرف يجب أن يكون أكبر من صفر"))?;

        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let identity = MedicineIdentity::new(&item.name, item.barcode.as_deref());
            validate_medicine_name(&identity.name)
                .map_err(|m| field_error("name", m, "اسم الصنف مطلوب"))?;
            if let Some(barcode) = identity.barcode.as_deref() {
                validate_barcode(barcode)
                    .map_err(|m| field_error("barcode", m, "الباركود غير صالح"))?;
            }
            validate_order_quantity(item.qty)
                .map_err(|m| field_error("qty", m, "الكمية يجب أن تكون أكبر من صفر"))?;
            validate_price(item.unit_cost)
                .map_err(|m| field_error("unit_cost", m, "السعر لا يمكن أن يكون سالباً"))?;

            let unit = UnitType::parse_or(item.unit_type.as_deref(), DEFAULT_PURCHASE_UNIT);
            let packaging = item.packaging();
            validate_packaging(&packaging).map_err(|m| {
                field_error(
                    packaging.first_invalid_factor().unwrap_or("packaging"),
                    m,
                    "عوامل التعبئة يجب أن تكون أكبر من صفر",
                )
            })?;
            let prices = derive_unit_prices(item.unit_cost, unit, &packaging)?;
            let line_total = item.unit_cost * Decimal::from(item.qty);

            lines.push((item, identity, unit, packaging, prices, line_total));
        }

        let total: Decimal = lines.iter().map(|l| l.5).sum();

        let mut tx = self.db.begin().await?;

        let order_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO purchase_orders (
                pharmacy_id, supplier_id, supplier_name, status, total,
                amount_received, amount_remaining, currency, exchange_rate,
                order_date, expected_date, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, 0, $5, $6, $7, COALESCE($8, CURRENT_DATE), $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(pharmacy_id)
        .bind(input.supplier_id)
        .bind(&input.supplier_name)
        .bind(PurchaseStatus::Ordered.as_str())
        .bind(total)
        .bind(&currency)
        .bind(exchange_rate)
        .bind(input.order_date)
        .bind(input.expected_date)
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        for (item, identity, unit, packaging, prices, line_total) in &lines {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items (
                    purchase_order_id, name, barcode, unit_type, qty,
                    packs_per_carton, blisters_per_pack, tablets_per_blister,
                    unit_cost, wholesale_price, retail_price, blister_price, tablet_price,
                    line_total, batch_no, expiry_date
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(order_id)
            .bind(&identity.name)
            .bind(identity.barcode.as_deref())
            .bind(unit.as_str())
            .bind(item.qty)
            .bind(packaging.packs_per_carton)
            .bind(packaging.blisters_per_pack)
            .bind(packaging.tablets_per_blister)
            .bind(item.unit_cost)
            .bind(prices.wholesale_price)
            .bind(prices.retail_price)
            .bind(prices.blister_price)
            .bind(prices.tablet_price)
            .bind(line_total)
            .bind(&item.batch_no)
            .bind(item.expiry_date)
            .execute(&mut *tx)
            .await?;
        }

        let detail = load_detail(&mut tx, pharmacy_id, order_id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id,
            pharmacy_id,
            lines = lines.len(),
            %total,
            "purchase order created"
        );

        Ok(detail)
    }

    /// Get an order with its lines and movements
    pub async fn get_order(&self, pharmacy_id: i64, order_id: i64) -> AppResult<PurchaseOrderDetail> {
        let mut conn = self.db.acquire().await?;
        load_detail(&mut conn, pharmacy_id, order_id).await
    }

    /// Record a supplier payment; the amount must not exceed what is owed
    pub async fn record_payment(
        &self,
        pharmacy_id: i64,
        order_id: i64,
        input: RecordPaymentInput,
    ) -> AppResult<PurchaseOrder> {
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut tx, pharmacy_id, order_id).await?;
        validate_payment_amount(input.amount, order.amount_remaining).map_err(|m| {
            field_error(
                "amount",
                m,
                "مبلغ الدفع يجب أن يكون أكبر من صفر ولا يتجاوز المتبقي",
            )
        })?;

        let updated = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            UPDATE purchase_orders
            SET amount_received = amount_received + $1,
                amount_remaining = amount_remaining - $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(input.amount)
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id,
            amount = %input.amount,
            remaining = %updated.amount_remaining,
            "supplier payment recorded"
        );

        Ok(updated)
    }
}

const ORDER_COLUMNS: &str = "id, pharmacy_id, supplier_id, supplier_name, status, total, \
    amount_received, amount_remaining, currency, exchange_rate, order_date, expected_date, \
    received_at, notes, created_by, created_at, updated_at";

/// Lock an order row of the pharmacy for the rest of the transaction
pub async fn lock_order(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    order_id: i64,
) -> AppResult<PurchaseOrder> {
    sqlx::query_as::<_, PurchaseOrder>(&format!(
        "SELECT {} FROM purchase_orders WHERE id = $1 AND pharmacy_id = $2 FOR UPDATE",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(pharmacy_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))
}

/// All lines of an order, in entry order
pub async fn load_items(conn: &mut PgConnection, order_id: i64) -> AppResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        r#"
        SELECT id, purchase_order_id, medicine_id, name, barcode, unit_type, qty, received_qty,
               packs_per_carton, blisters_per_pack, tablets_per_blister,
               unit_cost, wholesale_price, retail_price, blister_price, tablet_price,
               line_total, batch_no, expiry_date
        FROM purchase_order_items
        WHERE purchase_order_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

async fn load_detail(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    order_id: i64,
) -> AppResult<PurchaseOrderDetail> {
    let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
        "SELECT {} FROM purchase_orders WHERE id = $1 AND pharmacy_id = $2",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(pharmacy_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

    let items = load_items(conn, order_id).await?;
    let states: Vec<OrderLineState> = items.iter().map(PurchaseOrderItem::line_state).collect();
    let movements =
        ledger::list_for_document(conn, pharmacy_id, DocumentRef::PurchaseOrder(order_id)).await?;

    Ok(PurchaseOrderDetail {
        order,
        remaining_quantity: remaining_quantity(&states),
        items: items
            .into_iter()
            .zip(states.iter())
            .map(|(item, state)| PurchaseOrderLine {
                outstanding_qty: state.outstanding(),
                item,
            })
            .collect(),
        movements,
    })
}
