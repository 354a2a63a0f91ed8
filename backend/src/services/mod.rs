//! Business logic services for the fire-safety stock ledger

pub mod autosave;
pub mod batches;
pub mod delivery_notes;
pub mod items;
pub mod jobs;
pub mod ledger_store;
pub mod movements;
pub mod purchases;
pub mod reporting;

pub use autosave::FictitiousPriceAutosave;
pub use batches::BatchService;
pub use delivery_notes::DeliveryNoteService;
pub use items::ItemService;
pub use jobs::JobService;
pub use movements::MovementService;
pub use purchases::PurchaseService;
pub use reporting::ReportingService;
