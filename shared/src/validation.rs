//! Validation utilities for the pharmacy management platform

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::units::PackagingConfig;

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate a medicine display name
pub fn validate_medicine_name(name: &str) -> Result<(), &'static str> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Medicine name is required");
    }
    if name.chars().count() > 255 {
        return Err("Medicine name must be at most 255 characters");
    }
    Ok(())
}

/// Validate barcode format (4-64 characters, alphanumeric or dash)
pub fn validate_barcode(barcode: &str) -> Result<(), &'static str> {
    let barcode = barcode.trim();
    if barcode.len() < 4 || barcode.len() > 64 {
        return Err("Barcode must be between 4 and 64 characters");
    }
    if !barcode.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err("Barcode may only contain letters, digits and dashes");
    }
    Ok(())
}

/// Validate that every packaging factor is positive
pub fn validate_packaging(config: &PackagingConfig) -> Result<(), &'static str> {
    match config.first_invalid_factor() {
        Some("packs_per_carton") => Err("packs_per_carton must be greater than zero"),
        Some("blisters_per_pack") => Err("blisters_per_pack must be greater than zero"),
        Some(_) => Err("tablets_per_blister must be greater than zero"),
        None => Ok(()),
    }
}

/// Validate batch number length
pub fn validate_batch_no(batch_no: &str) -> Result<(), &'static str> {
    if batch_no.trim().is_empty() || batch_no.len() > 64 {
        return Err("Batch number must be between 1 and 64 characters");
    }
    Ok(())
}

/// Whether stock with this expiry date is already expired on `today`
pub fn is_expired(expiry_date: NaiveDate, today: NaiveDate) -> bool {
    expiry_date < today
}

// ============================================================================
// Purchasing Validations
// ============================================================================

/// Validate ordered quantity
pub fn validate_order_quantity(qty: i64) -> Result<(), &'static str> {
    if qty <= 0 {
        return Err("Ordered quantity must be greater than zero");
    }
    Ok(())
}

/// Validate a unit cost or sale price
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    Ok(())
}

/// Validate ISO 4217 style currency code
pub fn validate_currency_code(code: &str) -> Result<(), &'static str> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err("Currency must be a 3-letter uppercase code");
    }
    Ok(())
}

/// Validate exchange rate against the base currency
pub fn validate_exchange_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate <= Decimal::ZERO {
        return Err("Exchange rate must be greater than zero");
    }
    Ok(())
}

/// Validate a supplier payment against what is still owed
pub fn validate_payment_amount(amount: Decimal, remaining: Decimal) -> Result<(), &'static str> {
    if amount <= Decimal::ZERO {
        return Err("Payment amount must be greater than zero");
    }
    if amount > remaining {
        return Err("Payment amount exceeds the remaining balance");
    }
    Ok(())
}
