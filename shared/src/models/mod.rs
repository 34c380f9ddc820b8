//! Domain models for the pharmacy inventory core

mod medicine;
mod movement;
mod purchase;
mod sale;

pub use medicine::*;
pub use movement::*;
pub use purchase::*;
pub use sale::*;
