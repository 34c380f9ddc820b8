//! Business logic services for the pharmacy inventory core

pub mod inventory;
pub mod ledger;
pub mod medicine;
pub mod purchase;
pub mod receiving;
pub mod sales;
pub mod stock;

