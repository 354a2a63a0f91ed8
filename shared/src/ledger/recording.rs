//! Movement recording rules

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregator::ItemStock;
use super::allocator::check_allocation;
use super::conversion::MIN_QUANTITY;
use super::direction::{direction, Direction, Perspective};
use super::error::{LedgerError, LedgerResult};
use crate::models::{BatchAvailability, Capabilities, MovementType};

/// A ledger entry about to be appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub item_id: Uuid,
    pub movement_type: MovementType,
    /// Positive; the kind carries the direction
    pub quantity: Decimal,
    pub pieces: Option<Decimal>,
    pub coefficient: Decimal,
    pub reference: String,
    pub notes: Option<String>,
    pub job_id: Option<Uuid>,
    pub purchase_item_id: Option<Uuid>,
    #[serde(default)]
    pub is_fictitious: bool,
}

/// Resolve the acting user for a stock mutation. Fails closed.
pub fn authorize_mutation(capabilities: &Capabilities, user_id: Option<Uuid>) -> LedgerResult<Uuid> {
    let user_id = user_id.ok_or(LedgerError::NotAuthenticated)?;
    capabilities.require_mutate()?;
    Ok(user_id)
}

impl NewMovement {
    /// Shape and range checks; nothing is looked up
    pub fn validate(&self) -> LedgerResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(LedgerError::validation("quantity", "Quantity must be positive"));
        }
        if self.quantity < MIN_QUANTITY {
            return Err(LedgerError::validation("quantity", "Quantity must be at least 0.01"));
        }
        if let Some(pieces) = self.pieces {
            if pieces < Decimal::ZERO {
                return Err(LedgerError::validation("pieces", "Pieces cannot be negative"));
            }
        }
        if self.coefficient <= Decimal::ZERO {
            return Err(LedgerError::validation("coefficient", "Coefficient must be positive"));
        }
        Ok(())
    }

    /// `validate` for movements entered by hand. Purchase movements only
    /// come from purchase lines, which also create the batch.
    pub fn validate_manual(&self) -> LedgerResult<()> {
        self.validate()?;
        if self.movement_type == MovementType::Purchase {
            return Err(LedgerError::validation(
                "movement_type",
                "Purchase movements are created by purchase lines",
            ));
        }
        Ok(())
    }

    pub fn is_outbound(&self) -> bool {
        direction(self.movement_type, Perspective::Warehouse) == Direction::Out
    }

    /// Check the movement against replayed stock.
    ///
    /// `stock` is the item's replayed warehouse stock and `batch` the replayed
    /// availability of `purchase_item_id`, both read inside the same
    /// transaction that will append the movement.
    pub fn check_availability(
        &self,
        stock: &ItemStock,
        batch: Option<&BatchAvailability>,
    ) -> LedgerResult<()> {
        // Fictitious movements document goods without moving real stock:
        // they never draw on a batch or on the warehouse balance.
        if self.is_fictitious {
            return Ok(());
        }
        if !self.is_outbound() {
            return Ok(());
        }

        match (self.purchase_item_id, batch) {
            (Some(_), Some(availability)) => {
                if availability.batch.item_id != self.item_id {
                    return Err(LedgerError::validation(
                        "purchase_item_id",
                        "Batch belongs to a different item",
                    ));
                }
                check_allocation(availability, self.quantity, self.pieces)?;
            }
            (Some(batch_id), None) => return Err(LedgerError::NotFound(format!("Batch {}", batch_id))),
            (None, _) => {}
        }
        // A batch with units left does not mean the warehouse has them:
        // unbatched exits may already have drawn the item down.
        check_item_stock(stock, self.quantity, self.pieces)
    }
}

/// Real outbound demand against an item's replayed warehouse stock.
///
/// Pieces are compared when stated, quantity otherwise.
pub fn check_item_stock(stock: &ItemStock, quantity: Decimal, pieces: Option<Decimal>) -> LedgerResult<()> {
    let subject = format!("item {}", stock.item_id);
    match pieces {
        Some(pieces) if pieces > stock.pieces => {
            Err(LedgerError::insufficient(subject, pieces, stock.pieces.max(Decimal::ZERO)))
        }
        Some(_) => Ok(()),
        None if quantity > stock.quantity => Err(LedgerError::insufficient(
            subject,
            quantity,
            stock.quantity.max(Decimal::ZERO),
        )),
        None => Ok(()),
    }
}
