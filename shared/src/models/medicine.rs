//! Medicine catalog models

use serde::{Deserialize, Serialize};

/// Keys used to find an existing medicine for a received purchase line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineIdentity {
    pub name: String,
    pub barcode: Option<String>,
}

impl MedicineIdentity {
    pub fn new(name: &str, barcode: Option<&str>) -> Self {
        let barcode = barcode
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);

        Self {
            name: name.split_whitespace().collect::<Vec<_>>().join(" "),
            barcode,
        }
    }
}

/// Outcome of looking up a barcode that collided on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeOwner {
    /// Barcode belongs to this pharmacy; merge into the existing medicine
    SamePharmacy(i64),
    OtherPharmacy,
}

impl BarcodeOwner {
    pub fn classify(existing_medicine_id: i64, existing_pharmacy_id: i64, pharmacy_id: i64) -> Self {
        if existing_pharmacy_id == pharmacy_id {
            BarcodeOwner::SamePharmacy(existing_medicine_id)
        } else {
            BarcodeOwner::OtherPharmacy
        }
    }
}
