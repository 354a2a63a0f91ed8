//! Purchase rules: line resolution, shrink checks and price warnings

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::conversion::{checked_to_pieces, checked_to_quantity, round2, MIN_QUANTITY};
use super::error::{LedgerError, LedgerResult};
use crate::models::PurchaseItem;

/// Purchase header input
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPurchase {
    #[validate(length(min = 1, max = 255))]
    pub supplier: String,
    #[validate(length(min = 1, max = 64))]
    pub delivery_note_number: String,
    pub delivery_note_date: NaiveDate,
    pub job_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub document_url: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// How far a supplied quantity may sit from pieces × coefficient
const PAIR_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// A purchase line as entered; either side of the quantity pair may be given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLineInput {
    pub item_id: Uuid,
    pub quantity: Option<Decimal>,
    pub pieces: Option<Decimal>,
    pub coefficient: Decimal,
    #[serde(default)]
    pub price: Decimal,
    pub job_id: Option<Uuid>,
}

/// A purchase line with both quantity and pieces settled
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub pieces: Decimal,
    pub coefficient: Decimal,
    pub price: Decimal,
    pub job_id: Option<Uuid>,
}

impl PurchaseLineInput {
    /// Fill the missing side through the coefficient, then validate
    pub fn resolve(&self) -> LedgerResult<ResolvedLine> {
        if self.coefficient <= Decimal::ZERO {
            return Err(LedgerError::validation("coefficient", "Coefficient must be positive"));
        }
        let overflow = || LedgerError::validation("quantity", "Quantity is out of range");
        let (quantity, pieces) = match (self.quantity, self.pieces) {
            (Some(q), Some(p)) => {
                let expected = checked_to_quantity(p, self.coefficient).ok_or_else(overflow)?;
                if (expected - q).abs() > PAIR_TOLERANCE {
                    return Err(LedgerError::validation(
                        "pieces",
                        format!("Pieces do not match quantity: {} pieces is {}", p, expected),
                    ));
                }
                (q, p)
            }
            (Some(q), None) => (q, checked_to_pieces(q, self.coefficient).ok_or_else(overflow)?),
            (None, Some(p)) => (checked_to_quantity(p, self.coefficient).ok_or_else(overflow)?, p),
            (None, None) => {
                return Err(LedgerError::validation("quantity", "Quantity or pieces is required"))
            }
        };
        if quantity < MIN_QUANTITY {
            return Err(LedgerError::validation("quantity", "Quantity must be at least 0.01"));
        }
        if pieces < Decimal::ZERO {
            return Err(LedgerError::validation("pieces", "Pieces cannot be negative"));
        }
        if self.price < Decimal::ZERO {
            return Err(LedgerError::validation("price", "Price cannot be negative"));
        }
        Ok(ResolvedLine {
            item_id: self.item_id,
            quantity,
            pieces,
            coefficient: self.coefficient,
            price: self.price,
            job_id: self.job_id,
        })
    }
}

/// True when any line still has no price
pub fn has_missing_prices(lines: &[PurchaseItem]) -> bool {
    lines.iter().any(|l| l.price == Decimal::ZERO)
}

/// Sum of quantity times price over priced lines
pub fn purchase_total(lines: &[PurchaseItem]) -> Decimal {
    round2(lines.iter().map(|l| l.quantity * l.price).sum())
}

/// A line cannot shrink below what has already left the warehouse from it
pub fn check_line_shrink(new_quantity: Decimal, consumed: Decimal) -> LedgerResult<()> {
    if new_quantity < consumed {
        return Err(LedgerError::insufficient(
            "purchase line below consumed quantity",
            consumed,
            new_quantity,
        ));
    }
    Ok(())
}
