//! Row types and loaders feeding the ledger replay
//!
//! Every stock figure is computed by `shared::ledger` from rows loaded here.
//! Loaders take any executor so they can run inside a write transaction.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::ledger::{all_batch_remaining, item_stock, ItemStock};
use shared::models::{BatchAvailability, InventoryItem, Movement, MovementType, PurchaseBatch};
use sqlx::{FromRow, PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub(crate) const MOVEMENT_COLUMNS: &str = r#"
    m.id, m.seq, m.item_id, m.movement_type, m.quantity, m.pieces, m.coefficient,
    m.reference, m.notes, m.job_id, m.purchase_item_id, pi.purchase_id,
    m.delivery_note_item_id, m.is_fictitious, m.created_at, m.created_by
"#;

pub(crate) const ITEM_COLUMNS: &str = r#"
    id, code, name, model, brand, item_type, supplier_code, unit, coefficient,
    min_stock, price, description, image_url, quantity, pieces, real_quantity,
    created_at, updated_at
"#;

const BATCH_SELECT: &str = r#"
    SELECT pi.id AS purchase_item_id, pi.purchase_id, pi.item_id,
           p.delivery_note_number AS reference, p.delivery_note_date AS purchase_date,
           pi.created_at, pi.seq, pi.quantity AS original_quantity,
           pi.pieces AS original_pieces, pi.coefficient, pi.price AS unit_price,
           COALESCE(pi.job_id, p.job_id) AS job_id
    FROM purchase_items pi
    JOIN purchases p ON p.id = pi.purchase_id
"#;

#[derive(Debug, FromRow)]
pub(crate) struct MovementRow {
    id: Uuid,
    seq: i64,
    item_id: Uuid,
    movement_type: String,
    quantity: Decimal,
    pieces: Option<Decimal>,
    coefficient: Decimal,
    reference: String,
    notes: Option<String>,
    job_id: Option<Uuid>,
    purchase_item_id: Option<Uuid>,
    purchase_id: Option<Uuid>,
    delivery_note_item_id: Option<Uuid>,
    is_fictitious: bool,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
}

impl TryFrom<MovementRow> for Movement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        let movement_type = MovementType::from_str(&row.movement_type).ok_or_else(|| {
            AppError::Internal(format!("unknown movement type '{}'", row.movement_type))
        })?;
        Ok(Movement {
            id: row.id,
            seq: row.seq,
            item_id: row.item_id,
            movement_type,
            quantity: row.quantity,
            pieces: row.pieces,
            coefficient: row.coefficient,
            reference: row.reference,
            notes: row.notes,
            job_id: row.job_id,
            purchase_item_id: row.purchase_item_id,
            purchase_id: row.purchase_id,
            delivery_note_item_id: row.delivery_note_item_id,
            is_fictitious: row.is_fictitious,
            created_at: row.created_at,
            created_by: row.created_by,
        })
    }
}

pub(crate) fn into_movements(rows: Vec<MovementRow>) -> AppResult<Vec<Movement>> {
    rows.into_iter().map(Movement::try_from).collect()
}

#[derive(Debug, FromRow)]
pub(crate) struct ItemRow {
    id: Uuid,
    code: String,
    name: String,
    model: Option<String>,
    brand: Option<String>,
    item_type: Option<String>,
    supplier_code: Option<String>,
    unit: String,
    coefficient: Decimal,
    min_stock: Decimal,
    price: Option<Decimal>,
    description: Option<String>,
    image_url: Option<String>,
    quantity: Decimal,
    pieces: Decimal,
    real_quantity: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for InventoryItem {
    fn from(row: ItemRow) -> Self {
        InventoryItem {
            id: row.id,
            code: row.code,
            name: row.name,
            model: row.model,
            brand: row.brand,
            item_type: row.item_type,
            supplier_code: row.supplier_code,
            unit: row.unit,
            coefficient: row.coefficient,
            min_stock: row.min_stock,
            price: row.price,
            description: row.description,
            image_url: row.image_url,
            quantity: row.quantity,
            pieces: row.pieces,
            real_quantity: row.real_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct BatchRow {
    purchase_item_id: Uuid,
    purchase_id: Uuid,
    item_id: Uuid,
    reference: String,
    purchase_date: NaiveDate,
    created_at: DateTime<Utc>,
    seq: i64,
    original_quantity: Decimal,
    original_pieces: Option<Decimal>,
    coefficient: Decimal,
    unit_price: Decimal,
    job_id: Option<Uuid>,
}

impl From<BatchRow> for PurchaseBatch {
    fn from(row: BatchRow) -> Self {
        PurchaseBatch {
            purchase_item_id: row.purchase_item_id,
            purchase_id: row.purchase_id,
            item_id: row.item_id,
            reference: row.reference,
            purchase_date: row.purchase_date,
            created_at: row.created_at,
            seq: row.seq,
            original_quantity: row.original_quantity,
            original_pieces: row.original_pieces,
            coefficient: row.coefficient,
            unit_price: row.unit_price,
            job_id: row.job_id,
        }
    }
}

pub async fn movements_for_item<'e>(exec: impl PgExecutor<'e>, item_id: Uuid) -> AppResult<Vec<Movement>> {
    let rows = sqlx::query_as::<_, MovementRow>(&format!(
        "SELECT {} FROM movements m LEFT JOIN purchase_items pi ON pi.id = m.purchase_item_id
         WHERE m.item_id = $1 ORDER BY m.seq",
        MOVEMENT_COLUMNS
    ))
    .bind(item_id)
    .fetch_all(exec)
    .await?;
    into_movements(rows)
}

pub async fn movements_for_job<'e>(exec: impl PgExecutor<'e>, job_id: Uuid) -> AppResult<Vec<Movement>> {
    let rows = sqlx::query_as::<_, MovementRow>(&format!(
        "SELECT {} FROM movements m LEFT JOIN purchase_items pi ON pi.id = m.purchase_item_id
         WHERE m.job_id = $1 ORDER BY m.seq",
        MOVEMENT_COLUMNS
    ))
    .bind(job_id)
    .fetch_all(exec)
    .await?;
    into_movements(rows)
}

pub async fn movements_for_batches<'e>(
    exec: impl PgExecutor<'e>,
    batch_ids: &[Uuid],
) -> AppResult<Vec<Movement>> {
    let rows = sqlx::query_as::<_, MovementRow>(&format!(
        "SELECT {} FROM movements m LEFT JOIN purchase_items pi ON pi.id = m.purchase_item_id
         WHERE m.purchase_item_id = ANY($1) ORDER BY m.seq",
        MOVEMENT_COLUMNS
    ))
    .bind(batch_ids)
    .fetch_all(exec)
    .await?;
    into_movements(rows)
}

pub async fn all_movements<'e>(exec: impl PgExecutor<'e>) -> AppResult<Vec<Movement>> {
    let rows = sqlx::query_as::<_, MovementRow>(&format!(
        "SELECT {} FROM movements m LEFT JOIN purchase_items pi ON pi.id = m.purchase_item_id
         ORDER BY m.seq",
        MOVEMENT_COLUMNS
    ))
    .fetch_all(exec)
    .await?;
    into_movements(rows)
}

pub async fn batches_for_item<'e>(exec: impl PgExecutor<'e>, item_id: Uuid) -> AppResult<Vec<PurchaseBatch>> {
    let rows = sqlx::query_as::<_, BatchRow>(&format!("{} WHERE pi.item_id = $1", BATCH_SELECT))
        .bind(item_id)
        .fetch_all(exec)
        .await?;
    Ok(rows.into_iter().map(PurchaseBatch::from).collect())
}

pub async fn batches_by_ids<'e>(exec: impl PgExecutor<'e>, ids: &[Uuid]) -> AppResult<Vec<PurchaseBatch>> {
    let rows = sqlx::query_as::<_, BatchRow>(&format!("{} WHERE pi.id = ANY($1)", BATCH_SELECT))
        .bind(ids)
        .fetch_all(exec)
        .await?;
    Ok(rows.into_iter().map(PurchaseBatch::from).collect())
}

pub async fn all_batches<'e>(exec: impl PgExecutor<'e>) -> AppResult<Vec<PurchaseBatch>> {
    let rows = sqlx::query_as::<_, BatchRow>(BATCH_SELECT)
        .fetch_all(exec)
        .await?;
    Ok(rows.into_iter().map(PurchaseBatch::from).collect())
}

pub async fn item_by_id<'e>(exec: impl PgExecutor<'e>, item_id: Uuid) -> AppResult<InventoryItem> {
    sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {} FROM inventory_items WHERE id = $1",
        ITEM_COLUMNS
    ))
    .bind(item_id)
    .fetch_optional(exec)
    .await?
    .map(InventoryItem::from)
    .ok_or_else(|| AppError::NotFound("Item".to_string()))
}

/// Catalogue rows keyed by id; ids that do not exist are skipped
pub async fn catalog<'e>(exec: impl PgExecutor<'e>, ids: &[Uuid]) -> AppResult<HashMap<Uuid, InventoryItem>> {
    let rows = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {} FROM inventory_items WHERE id = ANY($1)",
        ITEM_COLUMNS
    ))
    .bind(ids)
    .fetch_all(exec)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let item = InventoryItem::from(row);
            (item.id, item)
        })
        .collect())
}

/// Row-lock the item so concurrent writers for it queue up
pub async fn lock_item(conn: &mut PgConnection, item_id: Uuid) -> AppResult<()> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM inventory_items WHERE id = $1 FOR UPDATE")
        .bind(item_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Item".to_string()))?;
    Ok(())
}

/// Row-lock purchase lines in a stable order to avoid lock cycles
pub async fn lock_batches(conn: &mut PgConnection, batch_ids: &[Uuid]) -> AppResult<()> {
    if batch_ids.is_empty() {
        return Ok(());
    }
    let locked = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM purchase_items WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(batch_ids)
    .fetch_all(conn)
    .await?;
    if let Some(missing) = batch_ids.iter().find(|id| !locked.contains(id)) {
        return Err(AppError::NotFound(format!("Batch {}", missing)));
    }
    Ok(())
}

/// A row taken with `FOR UPDATE` while writing the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LedgerLock {
    Item(Uuid),
    Batch(Uuid),
}

/// Items before batches, each in id order, no repeats. Every ledger writer
/// acquires its locks in this order.
pub fn lock_order(items: &[Uuid], batches: &[Uuid]) -> Vec<LedgerLock> {
    let mut locks: Vec<LedgerLock> = items
        .iter()
        .map(|id| LedgerLock::Item(*id))
        .chain(batches.iter().map(|id| LedgerLock::Batch(*id)))
        .collect();
    locks.sort();
    locks.dedup();
    locks
}

/// Lock items and batches in `lock_order`
pub async fn lock_rows(conn: &mut PgConnection, items: &[Uuid], batches: &[Uuid]) -> AppResult<()> {
    let mut batch_ids = Vec::new();
    for lock in lock_order(items, batches) {
        match lock {
            LedgerLock::Item(item_id) => lock_item(&mut *conn, item_id).await?,
            LedgerLock::Batch(batch_id) => batch_ids.push(batch_id),
        }
    }
    lock_batches(conn, &batch_ids).await
}

/// Replay the item's ledger and store the result in the advisory columns
pub async fn refresh_item_cache(conn: &mut PgConnection, item_id: Uuid) -> AppResult<ItemStock> {
    let movements = movements_for_item(&mut *conn, item_id).await?;
    let stock = item_stock(item_id, &movements);
    sqlx::query("UPDATE inventory_items SET quantity = $1, pieces = $2, updated_at = NOW() WHERE id = $3")
        .bind(stock.quantity)
        .bind(stock.pieces)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    Ok(stock)
}

/// Replayed availability of the given batches, keyed by batch id
pub async fn batch_availability(
    conn: &mut PgConnection,
    batch_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, BatchAvailability>> {
    if batch_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let batches = batches_by_ids(&mut *conn, batch_ids).await?;
    let movements = movements_for_batches(&mut *conn, batch_ids).await?;
    Ok(all_batch_remaining(&batches, &movements)
        .into_iter()
        .map(|a| (a.batch.purchase_item_id, a))
        .collect())
}

pub async fn ensure_job_exists<'e>(exec: impl PgExecutor<'e>, job_id: Uuid) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM jobs WHERE id = $1)")
        .bind(job_id)
        .fetch_one(exec)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Job".to_string()));
    }
    Ok(())
}
