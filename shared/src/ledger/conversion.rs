//! Pieces/quantity conversion through an item's coefficient
//!
//! All results are rounded to two decimals, midpoint away from zero, which
//! is what the persistence layer and the printed documents expect.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Round to two decimal places, midpoint away from zero
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Smallest quantity a ledger row can carry at two decimals
pub const MIN_QUANTITY: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// pieces × coefficient, for values already bounded by the database columns
pub fn to_quantity(pieces: Decimal, coefficient: Decimal) -> Decimal {
    if coefficient == Decimal::ONE {
        return pieces;
    }
    round2(pieces * coefficient)
}

/// quantity ÷ coefficient; a zero coefficient passes the quantity through
pub fn to_pieces(quantity: Decimal, coefficient: Decimal) -> Decimal {
    if coefficient == Decimal::ONE || coefficient.is_zero() {
        return quantity;
    }
    round2(quantity / coefficient)
}

/// `to_quantity` for user input; `None` when the product overflows
pub fn checked_to_quantity(pieces: Decimal, coefficient: Decimal) -> Option<Decimal> {
    if coefficient == Decimal::ONE {
        return Some(pieces);
    }
    pieces.checked_mul(coefficient).map(round2)
}

/// `to_pieces` for user input; `None` when the quotient overflows
pub fn checked_to_pieces(quantity: Decimal, coefficient: Decimal) -> Option<Decimal> {
    if coefficient == Decimal::ONE || coefficient.is_zero() {
        return Some(quantity);
    }
    quantity.checked_div(coefficient).map(round2)
}

/// Parse a user-typed number. Accepts a decimal comma.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(&trimmed.replace(',', ".")).ok()
}

/// A pieces/quantity pair kept coherent while either side is edited.
///
/// A non-numeric entry blanks both fields instead of producing a bogus
/// number on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityPair {
    pub coefficient: Decimal,
    pub pieces: Option<Decimal>,
    pub quantity: Option<Decimal>,
}

impl QuantityPair {
    pub fn new(coefficient: Decimal) -> Self {
        Self {
            coefficient,
            pieces: None,
            quantity: None,
        }
    }

    pub fn edit_pieces(&mut self, raw: &str) {
        match parse_decimal(raw) {
            Some(pieces) => match checked_to_quantity(pieces, self.coefficient) {
                Some(quantity) => {
                    self.pieces = Some(pieces);
                    self.quantity = Some(quantity);
                }
                None => self.clear(),
            },
            None => self.clear(),
        }
    }

    pub fn edit_quantity(&mut self, raw: &str) {
        match parse_decimal(raw) {
            Some(quantity) => match checked_to_pieces(quantity, self.coefficient) {
                Some(pieces) => {
                    self.quantity = Some(quantity);
                    self.pieces = Some(pieces);
                }
                None => self.clear(),
            },
            None => self.clear(),
        }
    }

    /// Switching item changes the coefficient; pieces are kept and quantity follows
    pub fn set_coefficient(&mut self, coefficient: Decimal) {
        self.coefficient = coefficient;
        if let Some(pieces) = self.pieces {
            self.quantity = checked_to_quantity(pieces, coefficient);
        }
    }

    fn clear(&mut self) {
        self.pieces = None;
        self.quantity = None;
    }
}
