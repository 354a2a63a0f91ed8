//! Purchase (goods receipt) models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerResult};

/// Lifecycle of a purchase or delivery note
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Finalized,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Finalized => "finalized",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentStatus::Draft),
            "finalized" => Some(DocumentStatus::Finalized),
            _ => None,
        }
    }

    /// Fails with `DocumentLocked` once the document has been finalized
    pub fn ensure_editable(&self, document: &str) -> LedgerResult<()> {
        match self {
            DocumentStatus::Draft => Ok(()),
            DocumentStatus::Finalized => Err(LedgerError::DocumentLocked(document.to_string())),
        }
    }

    /// Draft -> Finalized. Finalizing twice is rejected.
    pub fn finalize(&self, document: &str) -> LedgerResult<DocumentStatus> {
        self.ensure_editable(document)?;
        Ok(DocumentStatus::Finalized)
    }
}

/// A supplier goods-receipt document (bolla)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: Uuid,
    pub supplier: String,
    pub delivery_note_number: String,
    pub delivery_note_date: NaiveDate,
    /// Job earmark applied to lines that do not set their own
    pub job_id: Option<Uuid>,
    pub document_url: Option<String>,
    pub notes: Option<String>,
    pub status: DocumentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// A purchase line; each line is a consumable batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseItem {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub pieces: Option<Decimal>,
    pub coefficient: Decimal,
    /// Unit price; zero means "not invoiced yet"
    pub price: Decimal,
    pub job_id: Option<Uuid>,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// A purchase with its lines and the standing warnings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseSummary {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub lines: Vec<PurchaseItem>,
    pub total_value: Decimal,
    pub has_missing_prices: bool,
}
