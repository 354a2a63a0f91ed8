//! The stock ledger core
//!
//! Every quantity shown to a user is derived here by replaying movements.
//! Nothing in this module trusts a stored counter.

pub mod aggregator;
pub mod allocator;
pub mod composer;
pub mod conversion;
pub mod direction;
pub mod error;
pub mod purchase_ledger;
pub mod recording;

pub use aggregator::*;
pub use allocator::*;
pub use composer::*;
pub use conversion::*;
pub use direction::*;
pub use error::*;
pub use purchase_ledger::*;
pub use recording::*;
