//! Stock movement models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ledger entry. Direction is derived from the kind and the observer,
/// never from the sign of the stored quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Material loaded back into the warehouse
    Load,
    /// Material unloaded from the warehouse to a site
    Unload,
    /// Goods receipt from a supplier
    Purchase,
    /// Entry delivery note
    Entry,
    /// Exit delivery note
    Exit,
    /// Sale delivery note
    Sale,
}

impl MovementType {
    pub const ALL: [MovementType; 6] = [
        MovementType::Load,
        MovementType::Unload,
        MovementType::Purchase,
        MovementType::Entry,
        MovementType::Exit,
        MovementType::Sale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Load => "load",
            MovementType::Unload => "unload",
            MovementType::Purchase => "purchase",
            MovementType::Entry => "entry",
            MovementType::Exit => "exit",
            MovementType::Sale => "sale",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "load" => Some(MovementType::Load),
            "unload" => Some(MovementType::Unload),
            "purchase" => Some(MovementType::Purchase),
            "entry" => Some(MovementType::Entry),
            "exit" => Some(MovementType::Exit),
            "sale" => Some(MovementType::Sale),
            _ => None,
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovementType::Load => write!(f, "Carico"),
            MovementType::Unload => write!(f, "Scarico"),
            MovementType::Purchase => write!(f, "Acquisto"),
            MovementType::Entry => write!(f, "Entrata"),
            MovementType::Exit => write!(f, "Uscita"),
            MovementType::Sale => write!(f, "Vendita"),
        }
    }
}

/// An immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movement {
    pub id: Uuid,
    /// Insertion sequence, breaks ties between equal timestamps
    pub seq: i64,
    pub item_id: Uuid,
    pub movement_type: MovementType,
    /// Always positive; see [`crate::direction`]
    pub quantity: Decimal,
    pub pieces: Option<Decimal>,
    /// Coefficient captured when the movement was written
    pub coefficient: Decimal,
    /// Free-text document number
    pub reference: String,
    pub notes: Option<String>,
    pub job_id: Option<Uuid>,
    /// Purchase line (batch) this movement draws from or creates
    pub purchase_item_id: Option<Uuid>,
    /// Purchase header of the referenced batch, resolved on read
    pub purchase_id: Option<Uuid>,
    pub delivery_note_item_id: Option<Uuid>,
    pub is_fictitious: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}
