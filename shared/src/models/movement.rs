//! Inventory ledger models

use serde::{Deserialize, Serialize};

/// Why stock moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Purchase,
    Sale,
    Return,
    Adjustment,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Sale => "sale",
            MovementReason::Return => "return",
            MovementReason::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(MovementReason::Purchase),
            "sale" => Some(MovementReason::Sale),
            "return" => Some(MovementReason::Return),
            "adjustment" => Some(MovementReason::Adjustment),
            _ => None,
        }
    }
}

/// Document a movement points back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRef {
    PurchaseOrder(i64),
    Sale(i64),
    /// Adjustments reference the medicine they correct
    Adjustment(i64),
}

impl DocumentRef {
    pub fn ref_type(&self) -> &'static str {
        match self {
            DocumentRef::PurchaseOrder(_) => "purchase_order",
            DocumentRef::Sale(_) => "sale",
            DocumentRef::Adjustment(_) => "adjustment",
        }
    }

    /// Human-facing reference, e.g. `PO-42`
    pub fn ref_id(&self) -> String {
        match self {
            DocumentRef::PurchaseOrder(id) => format!("PO-{}", id),
            DocumentRef::Sale(id) => format!("SO-{}", id),
            DocumentRef::Adjustment(id) => format!("ADJ-{}", id),
        }
    }
}
