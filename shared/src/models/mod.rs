//! Domain models for the fire-safety stock platform

mod batch;
mod delivery_note;
mod item;
mod job;
mod movement;
mod purchase;
mod user;

pub use batch::*;
pub use delivery_note::*;
pub use item::*;
pub use job::*;
pub use movement::*;
pub use purchase::*;
pub use user::*;
