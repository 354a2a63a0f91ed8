//! Delivery note (DDT) models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{DocumentStatus, MovementType};

/// Kind of transport document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryNoteType {
    Entry,
    Exit,
    Sale,
}

impl DeliveryNoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryNoteType::Entry => "entry",
            DeliveryNoteType::Exit => "exit",
            DeliveryNoteType::Sale => "sale",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(DeliveryNoteType::Entry),
            "exit" => Some(DeliveryNoteType::Exit),
            "sale" => Some(DeliveryNoteType::Sale),
            _ => None,
        }
    }

    /// Movement kind generated by each line of the note
    pub fn movement_type(&self) -> MovementType {
        match self {
            DeliveryNoteType::Entry => MovementType::Entry,
            DeliveryNoteType::Exit => MovementType::Exit,
            DeliveryNoteType::Sale => MovementType::Sale,
        }
    }

    /// Exit and sale lines draw on warehouse batches
    pub fn is_outbound(&self) -> bool {
        matches!(self, DeliveryNoteType::Exit | DeliveryNoteType::Sale)
    }
}

/// Editable header fields of a delivery note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct DeliveryNoteHeader {
    pub note_type: DeliveryNoteType,
    /// Sequential number within the year; assigned on save when absent
    #[validate(range(min = 1))]
    pub number: Option<i32>,
    pub date: Option<NaiveDate>,
    pub job_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub causal: Option<String>,
    #[validate(length(max = 1000))]
    pub pickup_location: Option<String>,
    #[validate(length(max = 1000))]
    pub delivery_location: Option<String>,
    #[validate(length(max = 255))]
    pub transport_means: Option<String>,
    #[validate(length(max = 64))]
    pub transport_time: Option<String>,
    #[validate(length(max = 255))]
    pub goods_appearance: Option<String>,
    #[validate(range(min = 0))]
    pub package_count: Option<i32>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl DeliveryNoteHeader {
    pub fn new(note_type: DeliveryNoteType) -> Self {
        Self {
            note_type,
            number: None,
            date: None,
            job_id: None,
            causal: None,
            pickup_location: None,
            delivery_location: None,
            transport_means: None,
            transport_time: None,
            goods_appearance: None,
            package_count: None,
            notes: None,
        }
    }
}

/// A persisted delivery note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryNote {
    pub id: Uuid,
    pub note_type: DeliveryNoteType,
    pub number: i32,
    pub year: i32,
    pub date: NaiveDate,
    pub job_id: Option<Uuid>,
    pub causal: Option<String>,
    pub pickup_location: Option<String>,
    pub delivery_location: Option<String>,
    pub transport_means: Option<String>,
    pub transport_time: Option<String>,
    pub goods_appearance: Option<String>,
    pub package_count: Option<i32>,
    pub notes: Option<String>,
    pub status: DocumentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl DeliveryNote {
    /// Display number, e.g. "12/2024"
    pub fn display_number(&self) -> String {
        format_delivery_note_number(self.number, self.year)
    }
}

/// A persisted delivery-note line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryNoteItem {
    pub id: Uuid,
    pub delivery_note_id: Uuid,
    pub position: i32,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub pieces: Option<Decimal>,
    pub coefficient: Decimal,
    pub purchase_item_id: Option<Uuid>,
    pub is_fictitious: bool,
}

/// A delivery note with its lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryNoteWithLines {
    #[serde(flatten)]
    pub note: DeliveryNote,
    pub lines: Vec<DeliveryNoteItem>,
}

/// Format a delivery-note number with its year suffix
pub fn format_delivery_note_number(number: i32, year: i32) -> String {
    format!("{}/{}", number, year)
}

/// Parse "N/YYYY" back into its parts
pub fn parse_delivery_note_number(display: &str) -> Option<(i32, i32)> {
    let (number, year) = display.trim().split_once('/')?;
    let number: i32 = number.trim().parse().ok()?;
    let year: i32 = year.trim().parse().ok()?;
    if number < 1 || !(1900..=9999).contains(&year) {
        return None;
    }
    Some((number, year))
}
