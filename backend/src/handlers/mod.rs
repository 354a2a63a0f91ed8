//! HTTP handlers

pub mod delivery_notes;
pub mod health;
pub mod items;
pub mod jobs;
pub mod movements;
pub mod purchases;
pub mod reports;

pub use delivery_notes::*;
pub use health::*;
pub use items::*;
pub use jobs::*;
pub use movements::*;
pub use purchases::*;
pub use reports::*;
