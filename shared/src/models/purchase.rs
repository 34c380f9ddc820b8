//! Purchase order models

use serde::{Deserialize, Serialize};

/// Purchase order status
///
/// An order stays `Ordered` while any line has an outstanding quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Ordered,
    Received,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Ordered => "ordered",
            PurchaseStatus::Received => "received",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(PurchaseStatus::Ordered),
            "received" => Some(PurchaseStatus::Received),
            _ => None,
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
