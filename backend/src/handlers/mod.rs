//! HTTP request handlers

pub mod health;
pub mod inventory;
pub mod purchases;
pub mod sales;

pub use health::health_check;
