//! Stock aggregation by ledger replay
//!
//! One fold serves both observers; only the direction table differs. Job-site
//! lines are grouped by `(item code, fictitious, source document)` so that
//! different lots of the same item stay traceable to their paperwork.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::allocator::{all_batch_remaining, is_exhausted, EPSILON};
use super::conversion::round2;
use super::direction::{signed_pieces, signed_quantity, Perspective};
use crate::models::{InventoryItem, Movement, PurchaseBatch};

/// Replayed warehouse stock of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStock {
    pub item_id: Uuid,
    /// Real on-hand quantity
    pub quantity: Decimal,
    pub pieces: Decimal,
    /// Documentary-only stock, never part of the real balance
    pub fictitious_quantity: Decimal,
    pub fictitious_pieces: Decimal,
}

impl ItemStock {
    pub fn empty(item_id: Uuid) -> Self {
        Self {
            item_id,
            quantity: Decimal::ZERO,
            pieces: Decimal::ZERO,
            fictitious_quantity: Decimal::ZERO,
            fictitious_pieces: Decimal::ZERO,
        }
    }

    fn apply(&mut self, movement: &Movement) {
        let quantity = signed_quantity(movement, Perspective::Warehouse);
        let pieces = signed_pieces(movement, Perspective::Warehouse);
        if movement.is_fictitious {
            self.fictitious_quantity += quantity;
            self.fictitious_pieces += pieces;
        } else {
            self.quantity += quantity;
            self.pieces += pieces;
        }
    }

    /// Nothing real or fictitious left beyond rounding noise
    pub fn is_empty(&self) -> bool {
        is_exhausted(self.quantity) && is_exhausted(self.fictitious_quantity)
    }
}

/// Warehouse stock of a single item
pub fn item_stock(item_id: Uuid, movements: &[Movement]) -> ItemStock {
    let mut stock = ItemStock::empty(item_id);
    for movement in movements.iter().filter(|m| m.item_id == item_id) {
        stock.apply(movement);
    }
    stock
}

/// Current warehouse stock for every item in the ledger, exhausted rows dropped
pub fn warehouse_stock(movements: &[Movement]) -> Vec<ItemStock> {
    let mut by_item: BTreeMap<Uuid, ItemStock> = BTreeMap::new();
    for movement in movements {
        by_item
            .entry(movement.item_id)
            .or_insert_with(|| ItemStock::empty(movement.item_id))
            .apply(movement);
    }
    by_item.into_values().filter(|stock| !stock.is_empty()).collect()
}

/// Where a line's unit price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Batch,
    Item,
    Override,
    None,
}

/// Prices known to a job valuation
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    /// Purchase line id -> unit price
    pub batch_prices: HashMap<Uuid, Decimal>,
    /// Item id -> override used only for this job's fictitious lines
    pub fictitious_overrides: HashMap<Uuid, Decimal>,
}

/// Grouping key of a job-site stock line
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockLineKey {
    pub item_code: String,
    pub is_fictitious: bool,
    pub source_key: String,
}

/// Document a movement came from: purchase header, else its reference
pub fn source_key(movement: &Movement) -> String {
    if let Some(purchase_id) = movement.purchase_id {
        return purchase_id.to_string();
    }
    let reference = movement.reference.trim();
    if reference.is_empty() {
        "unknown".to_string()
    } else {
        reference.to_string()
    }
}

/// Stock of one item from one source document at a job site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStockLine {
    pub item_id: Uuid,
    pub item_code: String,
    pub item_name: String,
    pub is_fictitious: bool,
    pub source_key: String,
    pub quantity: Decimal,
    pub pieces: Decimal,
    pub unit_price: Option<Decimal>,
    pub value: Option<Decimal>,
    pub price_source: PriceSource,
    /// Real line with no resolvable price
    pub price_missing: bool,
}

/// Everything currently at a job site, valued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStockView {
    pub job_id: Uuid,
    pub lines: Vec<JobStockLine>,
    pub total_value: Option<Decimal>,
    /// A real line lacks a price, so the total is a lower bound
    pub incomplete: bool,
}

impl JobStockView {
    /// Strip every cost figure for callers without cost visibility
    pub fn redacted(mut self) -> Self {
        for line in &mut self.lines {
            line.unit_price = None;
            line.value = None;
            line.price_source = PriceSource::None;
        }
        self.total_value = None;
        self
    }
}

struct LineAccumulator {
    item_id: Uuid,
    quantity: Decimal,
    pieces: Decimal,
    /// (seq, price) of the earliest referenced batch with a positive price
    batch_price: Option<(i64, Decimal)>,
}

fn resolve_price(
    key: &StockLineKey,
    acc: &LineAccumulator,
    item: Option<&InventoryItem>,
    prices: &PriceBook,
) -> (Option<Decimal>, PriceSource, bool) {
    if key.is_fictitious {
        return match prices.fictitious_overrides.get(&acc.item_id) {
            Some(price) => (Some(*price), PriceSource::Override, false),
            None => (None, PriceSource::None, false),
        };
    }

    if let Some((_, price)) = acc.batch_price {
        return (Some(price), PriceSource::Batch, false);
    }

    match item.and_then(|i| i.price).filter(|p| *p > Decimal::ZERO) {
        Some(price) => (Some(price), PriceSource::Item, false),
        None => (None, PriceSource::None, true),
    }
}

/// Replay a job's movements into valued stock lines
pub fn job_stock(
    job_id: Uuid,
    movements: &[Movement],
    catalog: &HashMap<Uuid, InventoryItem>,
    prices: &PriceBook,
) -> JobStockView {
    let mut groups: BTreeMap<StockLineKey, LineAccumulator> = BTreeMap::new();

    for movement in movements.iter().filter(|m| m.job_id == Some(job_id)) {
        let item_code = catalog
            .get(&movement.item_id)
            .map(|item| item.code.clone())
            .unwrap_or_else(|| movement.item_id.to_string());
        let key = StockLineKey {
            item_code,
            is_fictitious: movement.is_fictitious,
            source_key: source_key(movement),
        };

        let acc = groups.entry(key).or_insert_with(|| LineAccumulator {
            item_id: movement.item_id,
            quantity: Decimal::ZERO,
            pieces: Decimal::ZERO,
            batch_price: None,
        });
        acc.quantity += signed_quantity(movement, Perspective::JobSite);
        acc.pieces += signed_pieces(movement, Perspective::JobSite);

        let batch_price = movement
            .purchase_item_id
            .and_then(|id| prices.batch_prices.get(&id).copied())
            .filter(|price| *price > Decimal::ZERO);
        if let Some(price) = batch_price {
            match acc.batch_price {
                Some((seq, _)) if seq <= movement.seq => {}
                _ => acc.batch_price = Some((movement.seq, price)),
            }
        }
    }

    let mut lines = Vec::new();
    let mut total = Decimal::ZERO;
    let mut incomplete = false;

    for (key, acc) in groups {
        if is_exhausted(acc.quantity) {
            continue;
        }
        let item = catalog.get(&acc.item_id);
        let (unit_price, price_source, price_missing) = resolve_price(&key, &acc, item, prices);
        let value = unit_price.map(|price| round2(acc.quantity * price));

        if let Some(value) = value {
            total += value;
        }
        incomplete |= price_missing;

        lines.push(JobStockLine {
            item_id: acc.item_id,
            item_code: key.item_code,
            item_name: item.map(|i| i.name.clone()).unwrap_or_default(),
            is_fictitious: key.is_fictitious,
            source_key: key.source_key,
            quantity: acc.quantity,
            pieces: acc.pieces,
            unit_price,
            value,
            price_source,
            price_missing,
        });
    }

    JobStockView {
        job_id,
        lines,
        total_value: Some(total),
        incomplete,
    }
}

/// Value of an item's real warehouse stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseValuation {
    pub item_id: Uuid,
    pub on_hand: Decimal,
    /// Part of the on-hand quantity attributed to batches
    pub batch_tracked: Decimal,
    pub value: Decimal,
    /// Quantity that could not be priced
    pub unpriced_quantity: Decimal,
    pub incomplete: bool,
}

/// Value real on-hand stock from batch prices.
///
/// Outbound movements without a batch link consume the oldest batches
/// first. Stock not covered by any batch is valued at the item price.
pub fn warehouse_valuation(
    item: &InventoryItem,
    batches: &[PurchaseBatch],
    movements: &[Movement],
) -> WarehouseValuation {
    let stock = item_stock(item.id, movements);
    let on_hand = stock.quantity.max(Decimal::ZERO);

    let item_batches: Vec<PurchaseBatch> = batches
        .iter()
        .filter(|b| b.item_id == item.id)
        .cloned()
        .collect();
    let mut remaining: Vec<(Decimal, Decimal)> = all_batch_remaining(&item_batches, movements)
        .into_iter()
        .map(|a| (a.remaining_quantity.max(Decimal::ZERO), a.batch.unit_price))
        .collect();

    let tracked: Decimal = remaining.iter().map(|(quantity, _)| *quantity).sum();
    let mut unattributed_out = (tracked - on_hand).max(Decimal::ZERO);
    for (quantity, _) in remaining.iter_mut() {
        if unattributed_out <= Decimal::ZERO {
            break;
        }
        let take = unattributed_out.min(*quantity);
        *quantity -= take;
        unattributed_out -= take;
    }

    let mut value = Decimal::ZERO;
    let mut unpriced = Decimal::ZERO;
    let mut batch_tracked = Decimal::ZERO;
    for (quantity, price) in &remaining {
        batch_tracked += *quantity;
        if *price > Decimal::ZERO {
            value += *quantity * *price;
        } else {
            unpriced += *quantity;
        }
    }

    let untracked = on_hand - batch_tracked;
    if untracked > EPSILON {
        match item.price.filter(|p| *p > Decimal::ZERO) {
            Some(price) => value += untracked * price,
            None => unpriced += untracked,
        }
    }

    WarehouseValuation {
        item_id: item.id,
        on_hand,
        batch_tracked,
        value: round2(value),
        unpriced_quantity: unpriced,
        incomplete: unpriced > EPSILON,
    }
}
