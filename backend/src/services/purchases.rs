//! Purchase ledger service
//!
//! Each purchase line is a batch. Writing a line also writes its `purchase`
//! movement in the same transaction, so a batch never exists without the
//! stock it brought in.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::ledger::{
    authorize_mutation, check_line_shrink, has_missing_prices, purchase_total, NewMovement,
    NewPurchase, PurchaseLineInput, ResolvedLine,
};
use shared::models::{Capabilities, DocumentStatus, MovementType, Purchase, PurchaseItem, PurchaseSummary};
use shared::validation::first_validation_error;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::ledger_store;
use super::movements::insert_movement;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseFilter {
    pub status: Option<DocumentStatus>,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
    id: Uuid,
    supplier: String,
    delivery_note_number: String,
    delivery_note_date: NaiveDate,
    job_id: Option<Uuid>,
    document_url: Option<String>,
    notes: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = AppError;

    fn try_from(row: PurchaseRow) -> AppResult<Self> {
        let status = DocumentStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unknown document status '{}'", row.status)))?;
        Ok(Purchase {
            id: row.id,
            supplier: row.supplier,
            delivery_note_number: row.delivery_note_number,
            delivery_note_date: row.delivery_note_date,
            job_id: row.job_id,
            document_url: row.document_url,
            notes: row.notes,
            status,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            finalized_at: row.finalized_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PurchaseItemRow {
    id: Uuid,
    purchase_id: Uuid,
    item_id: Uuid,
    quantity: Decimal,
    pieces: Option<Decimal>,
    coefficient: Decimal,
    price: Decimal,
    job_id: Option<Uuid>,
    seq: i64,
    created_at: DateTime<Utc>,
}

impl From<PurchaseItemRow> for PurchaseItem {
    fn from(row: PurchaseItemRow) -> Self {
        PurchaseItem {
            id: row.id,
            purchase_id: row.purchase_id,
            item_id: row.item_id,
            quantity: row.quantity,
            pieces: row.pieces,
            coefficient: row.coefficient,
            price: row.price,
            job_id: row.job_id,
            seq: row.seq,
            created_at: row.created_at,
        }
    }
}

const PURCHASE_COLUMNS: &str = r#"
    id, supplier, delivery_note_number, delivery_note_date, job_id, document_url, notes,
    status, created_by, created_at, updated_at, finalized_at
"#;

const LINE_COLUMNS: &str =
    "id, purchase_id, item_id, quantity, pieces, coefficient, price, job_id, seq, created_at";

async fn purchase_for_update(conn: &mut PgConnection, purchase_id: Uuid) -> AppResult<Purchase> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        "SELECT {} FROM purchases WHERE id = $1 FOR UPDATE",
        PURCHASE_COLUMNS
    ))
    .bind(purchase_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;
    Purchase::try_from(row)
}

/// Read a line without locking it. Lines only change under their purchase's
/// row lock, and the line row itself is locked after its items, in the same
/// item-then-batch order movement recording uses.
async fn line_in_purchase(conn: &mut PgConnection, purchase_id: Uuid, line_id: Uuid) -> AppResult<PurchaseItem> {
    sqlx::query_as::<_, PurchaseItemRow>(&format!(
        "SELECT {} FROM purchase_items WHERE id = $1 AND purchase_id = $2",
        LINE_COLUMNS
    ))
    .bind(line_id)
    .bind(purchase_id)
    .fetch_optional(conn)
    .await?
    .map(PurchaseItem::from)
    .ok_or_else(|| AppError::NotFound("Purchase line".to_string()))
}

/// The `purchase` movement minting a line's stock
fn purchase_movement(purchase: &Purchase, line_id: Uuid, line: &ResolvedLine) -> NewMovement {
    NewMovement {
        item_id: line.item_id,
        movement_type: MovementType::Purchase,
        quantity: line.quantity,
        pieces: Some(line.pieces),
        coefficient: line.coefficient,
        reference: purchase.delivery_note_number.clone(),
        notes: Some(purchase.supplier.clone()),
        job_id: line.job_id.or(purchase.job_id),
        purchase_item_id: Some(line_id),
        is_fictitious: false,
    }
}

impl PurchaseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        input: NewPurchase,
    ) -> AppResult<Purchase> {
        let user_id = authorize_mutation(capabilities, user_id)?;
        input.validate().map_err(first_validation_error)?;
        if let Some(job_id) = input.job_id {
            ledger_store::ensure_job_exists(&self.db, job_id).await?;
        }

        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            r#"
            INSERT INTO purchases (supplier, delivery_note_number, delivery_note_date, job_id,
                                   document_url, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(input.supplier.trim())
        .bind(input.delivery_note_number.trim())
        .bind(input.delivery_note_date)
        .bind(input.job_id)
        .bind(&input.document_url)
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let purchase = Purchase::try_from(row)?;
        tracing::info!(purchase_id = %purchase.id, number = %purchase.delivery_note_number, "purchase created");
        Ok(purchase)
    }

    pub async fn list(&self, filter: PurchaseFilter) -> AppResult<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            r#"
            SELECT {} FROM purchases
            WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR job_id = $2)
            ORDER BY delivery_note_date DESC, created_at DESC
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.job_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Purchase::try_from).collect()
    }

    /// Header, lines, total and the standing missing-price warning
    pub async fn summary(&self, purchase_id: Uuid) -> AppResult<PurchaseSummary> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {} FROM purchases WHERE id = $1",
            PURCHASE_COLUMNS
        ))
        .bind(purchase_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;
        let purchase = Purchase::try_from(row)?;

        let lines: Vec<PurchaseItem> = sqlx::query_as::<_, PurchaseItemRow>(&format!(
            "SELECT {} FROM purchase_items WHERE purchase_id = $1 ORDER BY seq",
            LINE_COLUMNS
        ))
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(PurchaseItem::from)
        .collect();

        Ok(PurchaseSummary {
            total_value: purchase_total(&lines),
            has_missing_prices: has_missing_prices(&lines),
            purchase,
            lines,
        })
    }

    /// Add a line: mints a batch and its purchase movement
    pub async fn add_item(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        purchase_id: Uuid,
        input: PurchaseLineInput,
    ) -> AppResult<PurchaseItem> {
        let user_id = authorize_mutation(capabilities, user_id)?;
        let line = input.resolve()?;

        let mut tx = self.db.begin().await?;
        let purchase = purchase_for_update(&mut tx, purchase_id).await?;
        purchase.status.ensure_editable("purchase")?;
        ledger_store::lock_item(&mut tx, line.item_id).await?;
        if let Some(job_id) = line.job_id {
            ledger_store::ensure_job_exists(&mut *tx, job_id).await?;
        }

        let item = sqlx::query_as::<_, PurchaseItemRow>(&format!(
            r#"
            INSERT INTO purchase_items (purchase_id, item_id, quantity, pieces, coefficient, price, job_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(purchase_id)
        .bind(line.item_id)
        .bind(line.quantity)
        .bind(line.pieces)
        .bind(line.coefficient)
        .bind(line.price)
        .bind(line.job_id)
        .fetch_one(&mut *tx)
        .await?;
        let item = PurchaseItem::from(item);

        insert_movement(&mut tx, &purchase_movement(&purchase, item.id, &line), user_id, None).await?;
        touch(&mut tx, purchase_id).await?;
        ledger_store::refresh_item_cache(&mut tx, line.item_id).await?;
        tx.commit().await?;

        if line.price == Decimal::ZERO {
            tracing::warn!(purchase_id = %purchase_id, line_id = %item.id, "purchase line saved without price");
        }
        Ok(item)
    }

    /// Edit a line and regenerate its purchase movement.
    ///
    /// The line cannot drop below what has already been drawn from its batch,
    /// and a consumed line cannot switch item.
    pub async fn update_item(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        purchase_id: Uuid,
        line_id: Uuid,
        input: PurchaseLineInput,
    ) -> AppResult<PurchaseItem> {
        let user_id = authorize_mutation(capabilities, user_id)?;
        let line = input.resolve()?;

        let mut tx = self.db.begin().await?;
        let purchase = purchase_for_update(&mut tx, purchase_id).await?;
        purchase.status.ensure_editable("purchase")?;
        let existing = line_in_purchase(&mut tx, purchase_id, line_id).await?;

        let mut items = vec![existing.item_id, line.item_id];
        items.dedup();
        ledger_store::lock_rows(&mut tx, &items, &[line_id]).await?;
        if let Some(job_id) = line.job_id {
            ledger_store::ensure_job_exists(&mut *tx, job_id).await?;
        }

        let consumed = ledger_store::batch_availability(&mut tx, &[line_id])
            .await?
            .remove(&line_id)
            .map(|a| a.batch.original_quantity - a.remaining_quantity)
            .unwrap_or(Decimal::ZERO);
        if consumed > Decimal::ZERO && existing.item_id != line.item_id {
            return Err(AppError::ConstraintViolation(
                "stock has already been drawn from this line; the item cannot change".to_string(),
            ));
        }
        check_line_shrink(line.quantity, consumed)?;

        let updated = sqlx::query_as::<_, PurchaseItemRow>(&format!(
            r#"
            UPDATE purchase_items
            SET item_id = $1, quantity = $2, pieces = $3, coefficient = $4, price = $5, job_id = $6
            WHERE id = $7
            RETURNING {}
            "#,
            LINE_COLUMNS
        ))
        .bind(line.item_id)
        .bind(line.quantity)
        .bind(line.pieces)
        .bind(line.coefficient)
        .bind(line.price)
        .bind(line.job_id)
        .bind(line_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM movements WHERE purchase_item_id = $1 AND movement_type = 'purchase'")
            .bind(line_id)
            .execute(&mut *tx)
            .await?;
        insert_movement(&mut tx, &purchase_movement(&purchase, line_id, &line), user_id, None).await?;
        touch(&mut tx, purchase_id).await?;
        for item_id in &items {
            ledger_store::refresh_item_cache(&mut tx, *item_id).await?;
        }
        tx.commit().await?;

        Ok(updated.into())
    }

    /// Remove a line whose batch nothing else has drawn on
    pub async fn delete_item(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        purchase_id: Uuid,
        line_id: Uuid,
    ) -> AppResult<()> {
        authorize_mutation(capabilities, user_id)?;

        let mut tx = self.db.begin().await?;
        let purchase = purchase_for_update(&mut tx, purchase_id).await?;
        purchase.status.ensure_editable("purchase")?;
        let existing = line_in_purchase(&mut tx, purchase_id, line_id).await?;
        ledger_store::lock_rows(&mut tx, &[existing.item_id], &[line_id]).await?;

        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM movements WHERE purchase_item_id = $1 AND movement_type <> 'purchase')
                OR EXISTS(SELECT 1 FROM delivery_note_items WHERE purchase_item_id = $1)
            "#,
        )
        .bind(line_id)
        .fetch_one(&mut *tx)
        .await?;
        if in_use {
            return Err(AppError::ConstraintViolation(
                "batch is referenced by other movements or delivery notes".to_string(),
            ));
        }

        sqlx::query("DELETE FROM movements WHERE purchase_item_id = $1")
            .bind(line_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM purchase_items WHERE id = $1")
            .bind(line_id)
            .execute(&mut *tx)
            .await?;
        touch(&mut tx, purchase_id).await?;
        ledger_store::refresh_item_cache(&mut tx, existing.item_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Lock the purchase against further edits. Missing prices stay flagged.
    pub async fn finalize(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        purchase_id: Uuid,
    ) -> AppResult<PurchaseSummary> {
        authorize_mutation(capabilities, user_id)?;

        let mut tx = self.db.begin().await?;
        let purchase = purchase_for_update(&mut tx, purchase_id).await?;
        let status = purchase.status.finalize("purchase")?;
        sqlx::query("UPDATE purchases SET status = $1, finalized_at = NOW(), updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(purchase_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let summary = self.summary(purchase_id).await?;
        if summary.has_missing_prices {
            tracing::warn!(purchase_id = %purchase_id, "purchase finalized with missing prices");
        }
        Ok(summary)
    }
}

async fn touch(conn: &mut PgConnection, purchase_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE purchases SET updated_at = NOW() WHERE id = $1")
        .bind(purchase_id)
        .execute(conn)
        .await?;
    Ok(())
}
