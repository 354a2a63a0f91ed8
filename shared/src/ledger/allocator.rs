//! Batch (lot) allocator
//!
//! Remaining stock per batch is `original − Σ outbound real movements
//! referencing the batch`, recomputed on every read. There is deliberately
//! no stored "remaining" counter to increment or decrement.

use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversion::to_pieces;
use super::direction::{direction, movement_pieces, signed_pieces, signed_quantity, Direction, Perspective};
use super::error::{LedgerError, LedgerResult};
use crate::models::{BatchAvailability, JobBatchAvailability, Movement, PurchaseBatch};

/// Quantities at or below this magnitude are rounding noise, not stock
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

pub fn is_exhausted(quantity: Decimal) -> bool {
    quantity.abs() <= EPSILON
}

/// Oldest first: purchase date, then creation time, then insertion sequence
pub fn fifo_order(a: &PurchaseBatch, b: &PurchaseBatch) -> Ordering {
    a.purchase_date
        .cmp(&b.purchase_date)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.seq.cmp(&b.seq))
}

/// Original pieces of a batch, derived from its coefficient when not recorded
pub fn batch_original_pieces(batch: &PurchaseBatch) -> Decimal {
    batch
        .original_pieces
        .unwrap_or_else(|| to_pieces(batch.original_quantity, batch.coefficient))
}

/// True when the movement draws real stock out of the warehouse
fn consumes_batch(movement: &Movement) -> bool {
    !movement.is_fictitious
        && direction(movement.movement_type, Perspective::Warehouse) == Direction::Out
}

/// Replay the ledger for one batch
pub fn batch_remaining(batch: &PurchaseBatch, movements: &[Movement]) -> BatchAvailability {
    let mut consumed_quantity = Decimal::ZERO;
    let mut consumed_pieces = Decimal::ZERO;

    for movement in movements
        .iter()
        .filter(|m| m.purchase_item_id == Some(batch.purchase_item_id))
        .filter(|m| consumes_batch(m))
    {
        consumed_quantity += movement.quantity;
        consumed_pieces += movement_pieces(movement);
    }

    BatchAvailability {
        batch: batch.clone(),
        remaining_quantity: batch.original_quantity - consumed_quantity,
        remaining_pieces: batch_original_pieces(batch) - consumed_pieces,
    }
}

/// Replay every batch, oldest first, without filtering exhausted ones
pub fn all_batch_remaining(batches: &[PurchaseBatch], movements: &[Movement]) -> Vec<BatchAvailability> {
    let mut ordered: Vec<&PurchaseBatch> = batches.iter().collect();
    ordered.sort_by(|a, b| fifo_order(a, b));

    ordered
        .into_iter()
        .map(|batch| batch_remaining(batch, movements))
        .collect()
}

/// Batches that can still be selected for an outbound movement, oldest first
pub fn available_batches(batches: &[PurchaseBatch], movements: &[Movement]) -> Vec<BatchAvailability> {
    all_batch_remaining(batches, movements)
        .into_iter()
        .filter(|availability| availability.remaining_quantity > EPSILON)
        .collect()
}

/// Reject a request that would take a batch below zero
pub fn check_allocation(
    availability: &BatchAvailability,
    quantity: Decimal,
    pieces: Option<Decimal>,
) -> LedgerResult<()> {
    let subject = format!(
        "batch {} ({})",
        availability.batch.purchase_item_id, availability.batch.reference
    );

    if quantity > availability.remaining_quantity {
        return Err(LedgerError::insufficient(
            subject,
            quantity,
            availability.remaining_quantity.max(Decimal::ZERO),
        ));
    }

    if let Some(pieces) = pieces {
        if pieces > availability.remaining_pieces {
            return Err(LedgerError::insufficient(
                subject,
                pieces,
                availability.remaining_pieces.max(Decimal::ZERO),
            ));
        }
    }

    Ok(())
}

/// One slice of a FIFO suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAllocation {
    pub purchase_item_id: Uuid,
    pub reference: String,
    pub quantity: Decimal,
    pub pieces: Decimal,
    pub unit_price: Decimal,
}

/// Default batch selection for an outbound quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FifoSuggestion {
    pub requested: Decimal,
    pub allocations: Vec<BatchAllocation>,
    /// Quantity that no batch could cover
    pub shortfall: Decimal,
}

/// Split a requested quantity across the oldest available batches
pub fn suggest_fifo(available: &[BatchAvailability], requested: Decimal) -> FifoSuggestion {
    let mut ordered: Vec<&BatchAvailability> = available
        .iter()
        .filter(|a| a.remaining_quantity > EPSILON)
        .collect();
    ordered.sort_by(|a, b| fifo_order(&a.batch, &b.batch));

    let mut outstanding = requested.max(Decimal::ZERO);
    let mut allocations = Vec::new();

    for availability in ordered {
        if outstanding <= Decimal::ZERO {
            break;
        }
        let take = outstanding.min(availability.remaining_quantity);
        allocations.push(BatchAllocation {
            purchase_item_id: availability.batch.purchase_item_id,
            reference: availability.batch.reference.clone(),
            quantity: take,
            pieces: to_pieces(take, availability.batch.coefficient),
            unit_price: availability.batch.unit_price,
        });
        outstanding -= take;
    }

    FifoSuggestion {
        requested,
        allocations,
        shortfall: outstanding,
    }
}

/// Batches with material physically at a job site.
///
/// Purchases earmarked for the job, unloads and exits to it add; loads and
/// entries back to the warehouse subtract. Fictitious movements are not
/// traceable lots and are ignored.
pub fn job_batch_availability(
    job_id: Uuid,
    batches: &[PurchaseBatch],
    movements: &[Movement],
) -> Vec<JobBatchAvailability> {
    let mut at_site: HashMap<Uuid, (Decimal, Decimal)> = HashMap::new();

    for movement in movements
        .iter()
        .filter(|m| m.job_id == Some(job_id) && !m.is_fictitious)
    {
        let Some(batch_id) = movement.purchase_item_id else {
            continue;
        };
        let entry = at_site.entry(batch_id).or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += signed_quantity(movement, Perspective::JobSite);
        entry.1 += signed_pieces(movement, Perspective::JobSite);
    }

    let mut ordered: Vec<&PurchaseBatch> = batches.iter().collect();
    ordered.sort_by(|a, b| fifo_order(a, b));

    ordered
        .into_iter()
        .filter_map(|batch| {
            let (quantity, pieces) = at_site.get(&batch.purchase_item_id).copied()?;
            if quantity <= EPSILON {
                return None;
            }
            Some(JobBatchAvailability {
                job_id,
                batch: batch.clone(),
                quantity_at_site: quantity,
                pieces_at_site: pieces,
            })
        })
        .collect()
}
