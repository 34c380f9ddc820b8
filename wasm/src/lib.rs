//! WebAssembly module for the pharmacy purchase form
//!
//! Exposes the shared unit conversion and price derivation so the form can
//! show base quantities and per-tier prices while lines are being entered.
//! Packaging is passed as JSON:
//! `{"packs_per_carton": 10, "blisters_per_pack": 2, "tablets_per_blister": 10}`

use std::str::FromStr;

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

use shared::{PackagingConfig, UnitType};

fn parse_packaging(packaging_json: &str) -> Result<PackagingConfig, JsValue> {
    serde_json::from_str(packaging_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid packaging JSON: {}", e)))
}

fn parse_unit(unit_type: &str) -> UnitType {
    UnitType::parse_or(Some(unit_type), UnitType::Carton)
}

/// Base units (tablets) in one `unit_type`
#[wasm_bindgen]
pub fn base_units_per_unit(unit_type: &str, packaging_json: &str) -> Result<f64, JsValue> {
    let config = parse_packaging(packaging_json)?;
    Ok(shared::base_units_per_unit(parse_unit(unit_type), &config) as f64)
}

/// Base units in `qty` of `unit_type`
#[wasm_bindgen]
pub fn compute_base_quantity(
    unit_type: &str,
    qty: i32,
    packaging_json: &str,
) -> Result<f64, JsValue> {
    let config = parse_packaging(packaging_json)?;
    shared::compute_base_quantity(parse_unit(unit_type), i64::from(qty), &config)
        .map(|base| base as f64)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Per-tier prices for a line priced at `unit_price` per `unit_type`.
///
/// `unit_price` is a decimal string; the result is JSON with
/// `wholesale_price`, `retail_price`, `blister_price` and `tablet_price`.
#[wasm_bindgen]
pub fn derive_unit_prices(
    unit_price: &str,
    unit_type: &str,
    packaging_json: &str,
) -> Result<String, JsValue> {
    let price = Decimal::from_str(unit_price.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid price: {}", e)))?;
    let config = parse_packaging(packaging_json)?;

    let prices = shared::derive_unit_prices(price, parse_unit(unit_type), &config)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    serde_json::to_string(&prices).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGING: &str =
        r#"{"packs_per_carton": 10, "blisters_per_pack": 2, "tablets_per_blister": 10}"#;

    #[test]
    fn test_base_units_per_unit() {
        assert_eq!(base_units_per_unit("carton", PACKAGING).unwrap(), 200.0);
        assert_eq!(base_units_per_unit("Blister", PACKAGING).unwrap(), 10.0);
    }

    #[test]
    fn test_unknown_unit_is_a_carton() {
        assert_eq!(base_units_per_unit("box", PACKAGING).unwrap(), 200.0);
    }

    #[test]
    fn test_missing_factors_default_to_one() {
        assert_eq!(compute_base_quantity("carton", 3, "{}").unwrap(), 3.0);
    }

    #[test]
    fn test_derive_unit_prices_json() {
        let json = derive_unit_prices("400", "carton", PACKAGING).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let price = |key: &str| Decimal::from_str(value[key].as_str().unwrap()).unwrap();
        assert_eq!(price("wholesale_price"), Decimal::from(400));
        assert_eq!(price("retail_price"), Decimal::from(40));
        assert_eq!(price("tablet_price"), Decimal::from(2));
    }
}
