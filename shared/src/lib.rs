//! Shared ledger core for the fire-safety stock system
//!
//! Models and the pure ledger rules (conversion, direction, batch allocation,
//! stock aggregation, delivery-note composition) shared by the backend and
//! the browser bindings.

pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;

pub use ledger::*;
pub use models::*;
pub use types::*;
pub use validation::*;
