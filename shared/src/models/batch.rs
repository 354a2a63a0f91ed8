//! Purchase batch (lot) views
//!
//! A batch is not stored on its own: it is a purchase line seen as a
//! consumable lot, with its remaining quantity always derived by replay.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One purchase line tracked as a consumable lot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseBatch {
    /// Id of the purchase line, used as the batch id
    pub purchase_item_id: Uuid,
    pub purchase_id: Uuid,
    pub item_id: Uuid,
    /// Supplier delivery-note number of the purchase
    pub reference: String,
    pub purchase_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
    pub original_quantity: Decimal,
    pub original_pieces: Option<Decimal>,
    pub coefficient: Decimal,
    pub unit_price: Decimal,
    pub job_id: Option<Uuid>,
}

/// Remaining stock of a batch at the warehouse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchAvailability {
    #[serde(flatten)]
    pub batch: PurchaseBatch,
    pub remaining_quantity: Decimal,
    pub remaining_pieces: Decimal,
}

/// Material of a batch currently located at a job site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobBatchAvailability {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub batch: PurchaseBatch,
    pub quantity_at_site: Decimal,
    pub pieces_at_site: Decimal,
}
