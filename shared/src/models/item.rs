//! Inventory item catalogue models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stockable material or tool definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    /// Sequential catalogue code (e.g., "ART-000042")
    pub code: String,
    pub name: String,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub item_type: Option<String>,
    pub supplier_code: Option<String>,
    pub unit: String,
    /// Pieces to quantity multiplier, always > 0
    pub coefficient: Decimal,
    pub min_stock: Decimal,
    /// Generic price, used when a stock line has no batch price
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Advisory cache of the replayed ledger. Never read by ledger rules.
    pub quantity: Decimal,
    /// Advisory cache of the replayed ledger. Never read by ledger rules.
    pub pieces: Decimal,
    /// Manually audited count, independent of the ledger
    pub real_quantity: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or updating a catalogue item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInput {
    pub name: String,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub item_type: Option<String>,
    pub supplier_code: Option<String>,
    pub unit: Option<String>,
    pub coefficient: Option<Decimal>,
    pub min_stock: Option<Decimal>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Format a catalogue code from its sequence number
pub fn format_item_code(sequence: i64) -> String {
    format!("ART-{:06}", sequence)
}
