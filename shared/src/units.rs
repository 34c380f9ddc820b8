//! Packaging units and conversion into base units
//!
//! Every stock balance is kept in base units (tablets). Purchases and sales are
//! entered in any packaging tier and converted here before touching stock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Packaging tier a quantity is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Carton,
    Pack,
    Blister,
    Tablet,
}

impl UnitType {
    pub const ALL: [UnitType; 4] = [
        UnitType::Carton,
        UnitType::Pack,
        UnitType::Blister,
        UnitType::Tablet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Carton => "carton",
            UnitType::Pack => "pack",
            UnitType::Blister => "blister",
            UnitType::Tablet => "tablet",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "carton" => Some(UnitType::Carton),
            "pack" => Some(UnitType::Pack),
            "blister" => Some(UnitType::Blister),
            "tablet" => Some(UnitType::Tablet),
            _ => None,
        }
    }

    /// Parse a unit string, falling back to `default` for missing or unknown values
    pub fn parse_or(s: Option<&str>, default: UnitType) -> Self {
        s.and_then(Self::from_str).unwrap_or(default)
    }

    /// Arabic label recorded on ledger rows
    pub fn label_ar(&self) -> &'static str {
        match self {
            UnitType::Carton => "كرتونة",
            UnitType::Pack => "علبة",
            UnitType::Blister => "شريط",
            UnitType::Tablet => "حبة",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packaging multipliers between tiers.
///
/// A zero or negative factor counts as 1 for conversion, so conversion never
/// divides by zero. Price derivation is stricter, see [`derive_unit_prices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingConfig {
    #[serde(default)]
    pub packs_per_carton: i64,
    #[serde(default)]
    pub blisters_per_pack: i64,
    #[serde(default)]
    pub tablets_per_blister: i64,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

fn factor(value: i64) -> i64 {
    if value > 0 {
        value
    } else {
        1
    }
}

impl PackagingConfig {
    pub fn new(packs_per_carton: i64, blisters_per_pack: i64, tablets_per_blister: i64) -> Self {
        Self {
            packs_per_carton,
            blisters_per_pack,
            tablets_per_blister,
        }
    }

    /// Copy with every non-positive factor replaced by 1
    pub fn normalized(&self) -> Self {
        Self::new(
            factor(self.packs_per_carton),
            factor(self.blisters_per_pack),
            factor(self.tablets_per_blister),
        )
    }

    /// First factor that is zero or negative, by field name
    pub fn first_invalid_factor(&self) -> Option<&'static str> {
        if self.packs_per_carton <= 0 {
            Some("packs_per_carton")
        } else if self.blisters_per_pack <= 0 {
            Some("blisters_per_pack")
        } else if self.tablets_per_blister <= 0 {
            Some("tablets_per_blister")
        } else {
            None
        }
    }
}

/// Unit conversion and price derivation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("quantity {qty} {unit} overflows the base unit range")]
    Overflow { unit: UnitType, qty: i64 },

    #[error("packaging factor {field} must be greater than zero")]
    ZeroPackagingFactor { field: &'static str },
}

/// Number of base units in one `unit`
pub fn base_units_per_unit(unit: UnitType, config: &PackagingConfig) -> i64 {
    let c = config.normalized();
    match unit {
        UnitType::Carton => c.packs_per_carton * c.blisters_per_pack * c.tablets_per_blister,
        UnitType::Pack => c.blisters_per_pack * c.tablets_per_blister,
        UnitType::Blister => c.tablets_per_blister,
        UnitType::Tablet => 1,
    }
}

/// Convert `qty` of `unit` into base units
pub fn compute_base_quantity(
    unit: UnitType,
    qty: i64,
    config: &PackagingConfig,
) -> Result<i64, UnitError> {
    qty.checked_mul(base_units_per_unit(unit, config))
        .ok_or(UnitError::Overflow { unit, qty })
}

/// Express a base-unit balance in packs, the display unit
pub fn base_to_display(base_qty: i64, config: &PackagingConfig) -> Decimal {
    let per_pack = base_units_per_unit(UnitType::Pack, config);
    (Decimal::from(base_qty) / Decimal::from(per_pack)).round_dp(4)
}

/// Prices at every packaging tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPrices {
    /// Per carton
    pub wholesale_price: Decimal,
    /// Per pack
    pub retail_price: Decimal,
    pub blister_price: Decimal,
    pub tablet_price: Decimal,
}

/// Derive per-tier prices from the price of one `unit`.
///
/// The carton price is scaled up from the entered unit and every smaller tier
/// is obtained by dividing down. Any zero factor is rejected instead of
/// producing a zero price.
pub fn derive_unit_prices(
    unit_price: Decimal,
    unit: UnitType,
    config: &PackagingConfig,
) -> Result<UnitPrices, UnitError> {
    if let Some(field) = config.first_invalid_factor() {
        return Err(UnitError::ZeroPackagingFactor { field });
    }

    let per_carton = Decimal::from(base_units_per_unit(UnitType::Carton, config));
    let per_unit = Decimal::from(base_units_per_unit(unit, config));

    let wholesale_price = unit_price * per_carton / per_unit;
    let retail_price = wholesale_price / Decimal::from(config.packs_per_carton);
    let blister_price = retail_price / Decimal::from(config.blisters_per_pack);
    let tablet_price = blister_price / Decimal::from(config.tablets_per_blister);

    Ok(UnitPrices {
        wholesale_price: wholesale_price.round_dp(4),
        retail_price: retail_price.round_dp(4),
        blister_price: blister_price.round_dp(4),
        tablet_price: tablet_price.round_dp(4),
    })
}
