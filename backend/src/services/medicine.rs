//! Medicine matching for received purchase lines

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::models::{BarcodeOwner, MedicineIdentity};
use shared::PackagingConfig;
use sqlx::PgConnection;

use crate::error::{AppError, AppResult};

/// Catalog data carried by a purchase line
#[derive(Debug, Clone)]
pub struct ReceivedMedicine<'a> {
    pub identity: MedicineIdentity,
    pub packaging: PackagingConfig,
    pub retail_price: Decimal,
    pub purchase_price: Decimal,
    pub batch_no: Option<&'a str>,
    pub expiry_date: Option<NaiveDate>,
}

/// Find the pharmacy's medicine for a received line, creating it when none
/// matches. Barcode is tried first, then the name.
///
/// Barcodes are unique across all pharmacies. If a concurrent insert claims
/// the barcode first, the row is reused when it belongs to the same pharmacy
/// and rejected otherwise.
pub async fn resolve_or_create(
    conn: &mut PgConnection,
    pharmacy_id: i64,
    item: &ReceivedMedicine<'_>,
) -> AppResult<i64> {
    if let Some(barcode) = item.identity.barcode.as_deref() {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM medicines WHERE pharmacy_id = $1 AND barcode = $2",
        )
        .bind(pharmacy_id)
        .bind(barcode)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(id) = found {
            return Ok(id);
        }
    }

    let by_name = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id FROM medicines
        WHERE pharmacy_id = $1 AND LOWER(name) = LOWER($2)
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(pharmacy_id)
    .bind(&item.identity.name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = by_name {
        return Ok(id);
    }

    let packaging = item.packaging.normalized();
    let inserted = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO medicines (
            pharmacy_id, name, barcode, price, purchase_price,
            packs_per_carton, blisters_per_pack, tablets_per_blister, batch_no, expiry_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (barcode) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(pharmacy_id)
    .bind(&item.identity.name)
    .bind(item.identity.barcode.as_deref())
    .bind(item.retail_price)
    .bind(item.purchase_price)
    .bind(packaging.packs_per_carton)
    .bind(packaging.blisters_per_pack)
    .bind(packaging.tablets_per_blister)
    .bind(item.batch_no)
    .bind(item.expiry_date)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = inserted {
        tracing::info!(medicine_id = id, pharmacy_id, name = %item.identity.name, "medicine created from purchase");
        return Ok(id);
    }

    // Barcode taken between lookup and insert
    let barcode = item.identity.barcode.clone().unwrap_or_default();
    let (existing_id, existing_pharmacy) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, pharmacy_id FROM medicines WHERE barcode = $1",
    )
    .bind(&barcode)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::Internal(format!("barcode {} conflicted but no row exists", barcode)))?;

    match BarcodeOwner::classify(existing_id, existing_pharmacy, pharmacy_id) {
        BarcodeOwner::SamePharmacy(id) => {
            tracing::warn!(medicine_id = id, %barcode, "duplicate barcode merged into existing medicine");
            Ok(id)
        }
        BarcodeOwner::OtherPharmacy => Err(AppError::BarcodeOwnedElsewhere(barcode)),
    }
}

/// Record the last-known batch and expiry; missing values keep the old ones
pub async fn record_batch(
    conn: &mut PgConnection,
    medicine_id: i64,
    batch_no: Option<&str>,
    expiry_date: Option<NaiveDate>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE medicines
        SET batch_no = COALESCE($1, batch_no),
            expiry_date = COALESCE($2, expiry_date),
            updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(batch_no)
    .bind(expiry_date)
    .bind(medicine_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Confirm a medicine belongs to the pharmacy
pub async fn ensure_owned(conn: &mut PgConnection, pharmacy_id: i64, medicine_id: i64) -> AppResult<()> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM medicines WHERE id = $1 AND pharmacy_id = $2)",
    )
    .bind(medicine_id)
    .bind(pharmacy_id)
    .fetch_one(&mut *conn)
    .await?;

    if !exists {
        return Err(AppError::NotFound("Medicine".to_string()));
    }
    Ok(())
}
