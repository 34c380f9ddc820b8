//! Shared domain logic for the pharmacy management platform
//!
//! Pure, I/O-free rules for unit conversion, receiving, stock projection and
//! sales. The backend executes these plans inside database transactions and the
//! WASM build reuses the pricing helpers in the purchase form.

pub mod models;
pub mod receiving;
pub mod sales;
pub mod stock;
pub mod types;
pub mod units;
pub mod validation;

pub use models::*;
pub use types::*;
pub use units::*;
pub use validation::*;
