//! Delivery note (DDT) service
//!
//! Saving runs the composer's validation again inside the transaction, after
//! row-locking every item and referenced batch, then writes header, lines and
//! the lines' movements together.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::ledger::{
    authorize_mutation, item_stock, job_batch_availability, printable_lines, DeliveryNoteDraft,
    DraftLine, LedgerError, PrintableLine,
};
use shared::models::{
    format_delivery_note_number, Capabilities, DeliveryNote, DeliveryNoteHeader, DeliveryNoteItem,
    DeliveryNoteType, DeliveryNoteWithLines, DocumentStatus, Job, JobBatchAvailability,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::jobs::job_by_id;
use super::ledger_store;
use super::movements::insert_movement;
use crate::config::CompanyConfig;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct DeliveryNoteService {
    db: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryNoteFilter {
    pub note_type: Option<DeliveryNoteType>,
    pub year: Option<i32>,
    pub job_id: Option<Uuid>,
}

/// Everything the printed layout needs
#[derive(Debug, Clone, Serialize)]
pub struct PrintableDeliveryNote {
    pub company_name: String,
    pub company_address: String,
    pub company_vat_number: String,
    pub number: String,
    pub note_type: DeliveryNoteType,
    pub date: NaiveDate,
    pub job_code: Option<String>,
    pub job_name: Option<String>,
    pub causal: Option<String>,
    pub pickup_location: Option<String>,
    pub delivery_location: Option<String>,
    pub transport_means: Option<String>,
    pub transport_time: Option<String>,
    pub goods_appearance: Option<String>,
    pub package_count: Option<i32>,
    pub notes: Option<String>,
    pub lines: Vec<PrintableLine>,
}

#[derive(Debug, FromRow)]
struct NoteRow {
    id: Uuid,
    note_type: String,
    number: i32,
    year: i32,
    date: NaiveDate,
    job_id: Option<Uuid>,
    causal: Option<String>,
    pickup_location: Option<String>,
    delivery_location: Option<String>,
    transport_means: Option<String>,
    transport_time: Option<String>,
    goods_appearance: Option<String>,
    package_count: Option<i32>,
    notes: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<NoteRow> for DeliveryNote {
    type Error = AppError;

    fn try_from(row: NoteRow) -> AppResult<Self> {
        let note_type = DeliveryNoteType::from_str(&row.note_type)
            .ok_or_else(|| AppError::Internal(format!("unknown delivery note type '{}'", row.note_type)))?;
        let status = DocumentStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("unknown document status '{}'", row.status)))?;
        Ok(DeliveryNote {
            id: row.id,
            note_type,
            number: row.number,
            year: row.year,
            date: row.date,
            job_id: row.job_id,
            causal: row.causal,
            pickup_location: row.pickup_location,
            delivery_location: row.delivery_location,
            transport_means: row.transport_means,
            transport_time: row.transport_time,
            goods_appearance: row.goods_appearance,
            package_count: row.package_count,
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
struct NoteItemRow {
    id: Uuid,
    delivery_note_id: Uuid,
    position: i32,
    item_id: Uuid,
    quantity: Decimal,
    pieces: Option<Decimal>,
    coefficient: Decimal,
    purchase_item_id: Option<Uuid>,
    is_fictitious: bool,
}

impl From<NoteItemRow> for DeliveryNoteItem {
    fn from(row: NoteItemRow) -> Self {
        DeliveryNoteItem {
            id: row.id,
            delivery_note_id: row.delivery_note_id,
            position: row.position,
            item_id: row.item_id,
            quantity: row.quantity,
            pieces: row.pieces,
            coefficient: row.coefficient,
            purchase_item_id: row.purchase_item_id,
            is_fictitious: row.is_fictitious,
        }
    }
}

const NOTE_COLUMNS: &str = r#"
    id, note_type, number, year, date, job_id, causal, pickup_location, delivery_location,
    transport_means, transport_time, goods_appearance, package_count, notes, status,
    created_by, created_at, updated_at, finalized_at
"#;

const NOTE_ITEM_COLUMNS: &str =
    "id, delivery_note_id, position, item_id, quantity, pieces, coefficient, purchase_item_id, is_fictitious";

fn header_of(note: &DeliveryNote) -> DeliveryNoteHeader {
    DeliveryNoteHeader {
        note_type: note.note_type,
        number: Some(note.number),
        date: Some(note.date),
        job_id: note.job_id,
        causal: note.causal.clone(),
        pickup_location: note.pickup_location.clone(),
        delivery_location: note.delivery_location.clone(),
        transport_means: note.transport_means.clone(),
        transport_time: note.transport_time.clone(),
        goods_appearance: note.goods_appearance.clone(),
        package_count: note.package_count,
        notes: note.notes.clone(),
    }
}

fn movement_reference(number: i32, year: i32) -> String {
    format!("DDT {}", format_delivery_note_number(number, year))
}

/// Next free number for the year; callers hold the year's advisory lock
async fn next_number(conn: &mut PgConnection, year: i32) -> AppResult<i32> {
    let number: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(number), 0) + 1 FROM delivery_notes WHERE year = $1")
        .bind(year)
        .fetch_one(conn)
        .await?;
    Ok(number)
}

/// Serialize numbering per year until the transaction ends
async fn lock_numbering(conn: &mut PgConnection, year: i32) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('delivery_notes'), $1)")
        .bind(year)
        .execute(conn)
        .await?;
    Ok(())
}

async fn job_site_batches(conn: &mut PgConnection, job_id: Uuid) -> AppResult<Vec<JobBatchAvailability>> {
    let movements = ledger_store::movements_for_job(&mut *conn, job_id).await?;
    let mut ids: Vec<Uuid> = movements.iter().filter_map(|m| m.purchase_item_id).collect();
    ids.sort();
    ids.dedup();
    let batches = ledger_store::batches_by_ids(&mut *conn, &ids).await?;
    Ok(job_batch_availability(job_id, &batches, &movements))
}

/// Lock, re-check and write the draft's lines and movements
async fn write_lines(
    conn: &mut PgConnection,
    note: &DeliveryNote,
    draft: &DeliveryNoteDraft,
    user_id: Uuid,
    extra_items: &[Uuid],
) -> AppResult<Vec<DeliveryNoteItem>> {
    let mut item_ids: Vec<Uuid> = draft.lines.iter().map(|l| l.item_id).chain(extra_items.iter().copied()).collect();
    item_ids.sort();
    item_ids.dedup();
    let batch_ids = draft.referenced_batches();
    ledger_store::lock_rows(&mut *conn, &item_ids, &batch_ids).await?;
    let availability = ledger_store::batch_availability(&mut *conn, &batch_ids).await?;
    let at_site = match (draft.header.note_type, draft.header.job_id) {
        (DeliveryNoteType::Entry, Some(job_id)) => job_site_batches(&mut *conn, job_id).await?,
        _ => Vec::new(),
    };

    let mut stocks = HashMap::new();
    for item_id in draft.outbound_items() {
        let history = ledger_store::movements_for_item(&mut *conn, item_id).await?;
        stocks.insert(item_id, item_stock(item_id, &history));
    }

    if let Err(err) = draft.validate_for_save(&stocks, &availability, &at_site) {
        if matches!(err, LedgerError::InsufficientStock { .. }) {
            tracing::warn!(note = %note.display_number(), "delivery note rejected: {}", err);
        }
        return Err(err.into());
    }

    let reference = movement_reference(note.number, note.year);
    let movements = draft.movements(&reference);
    let mut lines = Vec::with_capacity(draft.lines.len());

    for (position, (line, movement)) in draft.lines.iter().zip(movements.iter()).enumerate() {
        let row = sqlx::query_as::<_, NoteItemRow>(&format!(
            r#"
            INSERT INTO delivery_note_items (delivery_note_id, position, item_id, quantity, pieces,
                                             coefficient, purchase_item_id, is_fictitious)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            NOTE_ITEM_COLUMNS
        ))
        .bind(note.id)
        .bind(position as i32 + 1)
        .bind(line.item_id)
        .bind(line.quantity)
        .bind(line.pieces)
        .bind(line.coefficient)
        .bind(line.purchase_item_id)
        .bind(line.is_fictitious)
        .fetch_one(&mut *conn)
        .await?;

        insert_movement(&mut *conn, movement, user_id, Some(row.id)).await?;
        lines.push(DeliveryNoteItem::from(row));
    }

    for item_id in &item_ids {
        ledger_store::refresh_item_cache(&mut *conn, *item_id).await?;
    }
    Ok(lines)
}

impl DeliveryNoteService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Persist a composed note with its lines and movements atomically
    pub async fn create(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        mut draft: DeliveryNoteDraft,
    ) -> AppResult<DeliveryNoteWithLines> {
        let user_id = authorize_mutation(capabilities, user_id)?;
        let date = draft.header.date.ok_or_else(|| {
            AppError::validation("date", "Delivery note date is required", "La data del DDT è obbligatoria")
        })?;
        if let Some(job_id) = draft.header.job_id {
            let job: Job = job_by_id(&self.db, job_id).await?;
            draft.apply_job(&job);
        }
        draft.validate_lines()?;

        let year = date.year();
        let mut tx = self.db.begin().await?;
        lock_numbering(&mut tx, year).await?;
        let number = match draft.header.number {
            Some(number) => number,
            None => {
                let number = next_number(&mut tx, year).await?;
                draft.header.number = Some(number);
                number
            }
        };
        draft.validate_header()?;

        let h = &draft.header;
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            r#"
            INSERT INTO delivery_notes (
                note_type, number, year, date, job_id, causal, pickup_location, delivery_location,
                transport_means, transport_time, goods_appearance, package_count, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            NOTE_COLUMNS
        ))
        .bind(h.note_type.as_str())
        .bind(number)
        .bind(year)
        .bind(date)
        .bind(h.job_id)
        .bind(&h.causal)
        .bind(&h.pickup_location)
        .bind(&h.delivery_location)
        .bind(&h.transport_means)
        .bind(&h.transport_time)
        .bind(&h.goods_appearance)
        .bind(h.package_count)
        .bind(&h.notes)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        let note = DeliveryNote::try_from(row)?;

        let lines = write_lines(&mut tx, &note, &draft, user_id, &[]).await?;
        tx.commit().await?;

        tracing::info!(
            note_id = %note.id,
            number = %note.display_number(),
            note_type = note.note_type.as_str(),
            lines = lines.len(),
            "delivery note saved"
        );
        Ok(DeliveryNoteWithLines { note, lines })
    }

    pub async fn list(&self, filter: DeliveryNoteFilter) -> AppResult<Vec<DeliveryNote>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            r#"
            SELECT {} FROM delivery_notes
            WHERE ($1::text IS NULL OR note_type = $1)
              AND ($2::int IS NULL OR year = $2)
              AND ($3::uuid IS NULL OR job_id = $3)
            ORDER BY year DESC, number DESC
            "#,
            NOTE_COLUMNS
        ))
        .bind(filter.note_type.map(|t| t.as_str()))
        .bind(filter.year)
        .bind(filter.job_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(DeliveryNote::try_from).collect()
    }

    pub async fn get(&self, note_id: Uuid) -> AppResult<DeliveryNoteWithLines> {
        let mut conn = self.db.acquire().await?;
        let note = note_by_id(&mut conn, note_id, false).await?;
        let lines = lines_of(&mut conn, note_id).await?;
        Ok(DeliveryNoteWithLines { note, lines })
    }

    /// Replace every line of a draft note, re-running the save checks
    pub async fn replace_lines(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        note_id: Uuid,
        lines: Vec<DraftLine>,
    ) -> AppResult<DeliveryNoteWithLines> {
        let user_id = authorize_mutation(capabilities, user_id)?;

        let mut tx = self.db.begin().await?;
        let note = note_by_id(&mut tx, note_id, true).await?;
        note.status.ensure_editable("delivery note")?;

        let draft = DeliveryNoteDraft {
            header: header_of(&note),
            lines,
        };
        draft.validate_lines()?;

        let previous = lines_of(&mut tx, note_id).await?;
        let previous_items: Vec<Uuid> = previous.iter().map(|l| l.item_id).collect();
        // Line movements cascade with their lines
        sqlx::query("DELETE FROM delivery_note_items WHERE delivery_note_id = $1")
            .bind(note_id)
            .execute(&mut *tx)
            .await?;

        let lines = write_lines(&mut tx, &note, &draft, user_id, &previous_items).await?;
        sqlx::query("UPDATE delivery_notes SET updated_at = NOW() WHERE id = $1")
            .bind(note_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(note_id = %note_id, lines = lines.len(), "delivery note lines replaced");
        Ok(DeliveryNoteWithLines { note, lines })
    }

    pub async fn finalize(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        note_id: Uuid,
    ) -> AppResult<DeliveryNote> {
        authorize_mutation(capabilities, user_id)?;

        let mut tx = self.db.begin().await?;
        let note = note_by_id(&mut tx, note_id, true).await?;
        let status = note.status.finalize("delivery note")?;
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "UPDATE delivery_notes SET status = $1, finalized_at = NOW(), updated_at = NOW() WHERE id = $2 RETURNING {}",
            NOTE_COLUMNS
        ))
        .bind(status.as_str())
        .bind(note_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        DeliveryNote::try_from(row)
    }

    /// Fields for the printed document, lines grouped by item
    pub async fn printable(&self, note_id: Uuid, company: &CompanyConfig) -> AppResult<PrintableDeliveryNote> {
        let DeliveryNoteWithLines { note, lines } = self.get(note_id).await?;

        let mut item_ids: Vec<Uuid> = lines.iter().map(|l| l.item_id).collect();
        item_ids.sort();
        item_ids.dedup();
        let catalog = ledger_store::catalog(&self.db, &item_ids).await?;
        let job = match note.job_id {
            Some(job_id) => Some(job_by_id(&self.db, job_id).await?),
            None => None,
        };

        Ok(PrintableDeliveryNote {
            company_name: company.name.clone(),
            company_address: company.address.clone(),
            company_vat_number: company.vat_number.clone(),
            number: note.display_number(),
            note_type: note.note_type,
            date: note.date,
            job_code: job.as_ref().map(|j| j.code.clone()),
            job_name: job.as_ref().map(|j| j.name.clone()),
            causal: note.causal,
            pickup_location: note.pickup_location,
            delivery_location: note.delivery_location,
            transport_means: note.transport_means,
            transport_time: note.transport_time,
            goods_appearance: note.goods_appearance,
            package_count: note.package_count,
            notes: note.notes,
            lines: printable_lines(&lines, &catalog),
        })
    }
}

async fn note_by_id(conn: &mut PgConnection, note_id: Uuid, for_update: bool) -> AppResult<DeliveryNote> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, NoteRow>(&format!(
        "SELECT {} FROM delivery_notes WHERE id = $1 {}",
        NOTE_COLUMNS, lock
    ))
    .bind(note_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Delivery note".to_string()))?;
    DeliveryNote::try_from(row)
}

async fn lines_of(conn: &mut PgConnection, note_id: Uuid) -> AppResult<Vec<DeliveryNoteItem>> {
    let rows = sqlx::query_as::<_, NoteItemRow>(&format!(
        "SELECT {} FROM delivery_note_items WHERE delivery_note_id = $1 ORDER BY position",
        NOTE_ITEM_COLUMNS
    ))
    .bind(note_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(DeliveryNoteItem::from).collect())
}
