//! Delivery note (DDT) composer
//!
//! A draft collects header fields and lines in memory. `validate_for_save`
//! runs the checks that must be repeated inside the persisting transaction,
//! because another session may have consumed a batch since it was selected.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::aggregator::ItemStock;
use super::allocator::check_allocation;
use super::conversion::{to_pieces, MIN_QUANTITY};
use super::error::{LedgerError, LedgerResult};
use super::recording::{check_item_stock, NewMovement};
use crate::models::{
    BatchAvailability, DeliveryNoteHeader, DeliveryNoteItem, DeliveryNoteType, InventoryItem,
    JobBatchAvailability, Job,
};
use crate::validation::first_validation_error;

/// A line being composed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub pieces: Option<Decimal>,
    pub coefficient: Decimal,
    /// Batch drawn from (exit/sale) or returned to (entry)
    pub purchase_item_id: Option<Uuid>,
    #[serde(default)]
    pub is_fictitious: bool,
}

/// Header plus lines, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryNoteDraft {
    pub header: DeliveryNoteHeader,
    pub lines: Vec<DraftLine>,
}

/// Requested amounts against one batch or item, summed over lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockRequest {
    pub quantity: Decimal,
    pub pieces: Option<Decimal>,
}

impl DeliveryNoteDraft {
    pub fn new(note_type: DeliveryNoteType) -> Self {
        Self {
            header: DeliveryNoteHeader::new(note_type),
            lines: Vec::new(),
        }
    }

    pub fn add_line(&mut self, line: DraftLine) {
        self.lines.push(line);
    }

    pub fn remove_line(&mut self, index: usize) -> LedgerResult<DraftLine> {
        if index >= self.lines.len() {
            return Err(LedgerError::NotFound(format!("Line {}", index + 1)));
        }
        Ok(self.lines.remove(index))
    }

    pub fn update_line(&mut self, index: usize, line: DraftLine) -> LedgerResult<()> {
        let slot = self
            .lines
            .get_mut(index)
            .ok_or_else(|| LedgerError::NotFound(format!("Line {}", index + 1)))?;
        *slot = line;
        Ok(())
    }

    /// Link the note to a job and default the delivery location to its site
    pub fn apply_job(&mut self, job: &Job) {
        self.header.job_id = Some(job.id);
        let blank = self
            .header
            .delivery_location
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        if blank {
            if let Some(address) = job.site_address.as_ref().filter(|a| !a.trim().is_empty()) {
                self.header.delivery_location = Some(address.clone());
            }
        }
    }

    /// Step 1: number and date are required, text fields bounded
    pub fn validate_header(&self) -> LedgerResult<()> {
        if self.header.number.is_none() {
            return Err(LedgerError::validation("number", "Delivery note number is required"));
        }
        if self.header.date.is_none() {
            return Err(LedgerError::validation("date", "Delivery note date is required"));
        }
        self.header.validate().map_err(first_validation_error)
    }

    /// Step 2: at least one well-formed line
    pub fn validate_lines(&self) -> LedgerResult<()> {
        if self.lines.is_empty() {
            return Err(LedgerError::validation("lines", "At least one line is required"));
        }
        for (index, line) in self.lines.iter().enumerate() {
            let field = format!("lines[{}]", index);
            if line.quantity < MIN_QUANTITY {
                return Err(LedgerError::validation(field, "Quantity must be at least 0.01"));
            }
            if line.coefficient <= Decimal::ZERO {
                return Err(LedgerError::validation(field, "Coefficient must be positive"));
            }
            if line.pieces.map(|p| p < Decimal::ZERO).unwrap_or(false) {
                return Err(LedgerError::validation(field, "Pieces cannot be negative"));
            }
            if self.header.note_type.is_outbound() && !line.is_fictitious && line.purchase_item_id.is_none() {
                return Err(LedgerError::validation(
                    field,
                    "Real exit and sale lines must reference a batch",
                ));
            }
        }
        Ok(())
    }

    /// Real outbound demand per batch. Only lines that state pieces add to
    /// the pieces total.
    pub fn batch_requests(&self) -> BTreeMap<Uuid, StockRequest> {
        let mut requests: BTreeMap<Uuid, StockRequest> = BTreeMap::new();
        if !self.header.note_type.is_outbound() {
            return requests;
        }
        for line in self.lines.iter().filter(|l| !l.is_fictitious) {
            let Some(batch_id) = line.purchase_item_id else {
                continue;
            };
            let request = requests.entry(batch_id).or_default();
            request.quantity += line.quantity;
            if let Some(pieces) = line.pieces {
                request.pieces = Some(request.pieces.unwrap_or(Decimal::ZERO) + pieces);
            }
        }
        requests
    }

    /// Real outbound demand per item. Pieces are summed only when every line
    /// of the item states them; otherwise the item is checked on quantity.
    pub fn item_requests(&self) -> BTreeMap<Uuid, StockRequest> {
        let mut requests: BTreeMap<Uuid, StockRequest> = BTreeMap::new();
        if !self.header.note_type.is_outbound() {
            return requests;
        }
        let mut without_pieces: BTreeSet<Uuid> = BTreeSet::new();
        for line in self.lines.iter().filter(|l| !l.is_fictitious) {
            let request = requests.entry(line.item_id).or_default();
            request.quantity += line.quantity;
            match line.pieces {
                Some(pieces) => request.pieces = Some(request.pieces.unwrap_or(Decimal::ZERO) + pieces),
                None => {
                    without_pieces.insert(line.item_id);
                }
            }
        }
        for item_id in without_pieces {
            if let Some(request) = requests.get_mut(&item_id) {
                request.pieces = None;
            }
        }
        requests
    }

    /// Items whose warehouse stock must be replayed before saving
    pub fn outbound_items(&self) -> Vec<Uuid> {
        self.item_requests().into_keys().collect()
    }

    /// Batch ids whose availability must be read before saving
    pub fn referenced_batches(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.lines.iter().filter_map(|l| l.purchase_item_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Step 3: every real exit/sale line fits its batch's current remainder
    pub fn check_batches(&self, availability: &HashMap<Uuid, BatchAvailability>) -> LedgerResult<()> {
        for (batch_id, request) in self.batch_requests() {
            let batch = availability
                .get(&batch_id)
                .ok_or_else(|| LedgerError::NotFound(format!("Batch {}", batch_id)))?;
            for line in self.lines.iter().filter(|l| l.purchase_item_id == Some(batch_id)) {
                if line.item_id != batch.batch.item_id {
                    return Err(LedgerError::validation(
                        "purchase_item_id",
                        "Batch belongs to a different item",
                    ));
                }
            }
            check_allocation(batch, request.quantity, request.pieces)?;
        }
        Ok(())
    }

    /// Step 3b: the warehouse still holds what the real exit/sale lines take.
    /// An item missing from `stocks` counts as empty.
    pub fn check_items(&self, stocks: &HashMap<Uuid, ItemStock>) -> LedgerResult<()> {
        for (item_id, request) in self.item_requests() {
            let stock = stocks
                .get(&item_id)
                .cloned()
                .unwrap_or_else(|| ItemStock::empty(item_id));
            check_item_stock(&stock, request.quantity, request.pieces)?;
        }
        Ok(())
    }

    /// Entry lines returning a lot from a job cannot exceed what is at the site
    pub fn check_job_returns(&self, at_site: &[JobBatchAvailability]) -> LedgerResult<()> {
        if self.header.note_type != DeliveryNoteType::Entry || self.header.job_id.is_none() {
            return Ok(());
        }
        let mut returned: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for line in self.lines.iter().filter(|l| !l.is_fictitious) {
            if let Some(batch_id) = line.purchase_item_id {
                *returned.entry(batch_id).or_insert(Decimal::ZERO) += line.quantity;
            }
        }
        for (batch_id, quantity) in returned {
            let available = at_site
                .iter()
                .find(|a| a.batch.purchase_item_id == batch_id)
                .map(|a| a.quantity_at_site)
                .unwrap_or(Decimal::ZERO);
            if quantity > available {
                return Err(LedgerError::insufficient(
                    format!("batch {} at job site", batch_id),
                    quantity,
                    available,
                ));
            }
        }
        Ok(())
    }

    /// Steps 1 to 3 of the save sequence
    pub fn validate_for_save(
        &self,
        stocks: &HashMap<Uuid, ItemStock>,
        availability: &HashMap<Uuid, BatchAvailability>,
        at_site: &[JobBatchAvailability],
    ) -> LedgerResult<()> {
        self.validate_header()?;
        self.validate_lines()?;
        self.check_batches(availability)?;
        self.check_items(stocks)?;
        self.check_job_returns(at_site)
    }

    /// Movements generated by the saved lines, in line order
    pub fn movements(&self, reference: &str) -> Vec<NewMovement> {
        self.lines
            .iter()
            .map(|line| NewMovement {
                item_id: line.item_id,
                movement_type: self.header.note_type.movement_type(),
                quantity: line.quantity,
                pieces: line.pieces,
                coefficient: line.coefficient,
                reference: reference.to_string(),
                notes: None,
                job_id: self.header.job_id,
                purchase_item_id: line.purchase_item_id,
                is_fictitious: line.is_fictitious,
            })
            .collect()
    }
}

/// A row of the printed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintableLine {
    pub item_id: Uuid,
    pub item_code: String,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub pieces: Decimal,
}

/// Lines grouped by item with summed quantities, in first-appearance order
pub fn printable_lines(
    lines: &[DeliveryNoteItem],
    catalog: &HashMap<Uuid, InventoryItem>,
) -> Vec<PrintableLine> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: HashMap<Uuid, PrintableLine> = HashMap::new();

    let mut sorted: Vec<&DeliveryNoteItem> = lines.iter().collect();
    sorted.sort_by_key(|l| l.position);

    for line in sorted {
        let pieces = line
            .pieces
            .unwrap_or_else(|| to_pieces(line.quantity, line.coefficient));
        let entry = grouped.entry(line.item_id).or_insert_with(|| {
            order.push(line.item_id);
            let item = catalog.get(&line.item_id);
            PrintableLine {
                item_id: line.item_id,
                item_code: item.map(|i| i.code.clone()).unwrap_or_default(),
                description: item.map(describe_item).unwrap_or_default(),
                unit: item.map(|i| i.unit.clone()).unwrap_or_default(),
                quantity: Decimal::ZERO,
                pieces: Decimal::ZERO,
            }
        });
        entry.quantity += line.quantity;
        entry.pieces += pieces;
    }

    order
        .into_iter()
        .filter_map(|id| grouped.remove(&id))
        .collect()
}

fn describe_item(item: &InventoryItem) -> String {
    [Some(item.name.as_str()), item.brand.as_deref(), item.model.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
