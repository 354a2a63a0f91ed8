//! Movement recording service
//!
//! Availability is re-checked inside the writing transaction, under a row lock
//! on the item (and on the batch when one is referenced), so two sessions
//! cannot both draw on the last units of a lot.

use rust_decimal::Decimal;
use serde::Deserialize;
use shared::ledger::{authorize_mutation, direction, item_stock, Direction, LedgerError, NewMovement, Perspective};
use shared::models::{Capabilities, Movement, MovementType};
use shared::types::{PaginatedResponse, Pagination, PaginationMeta};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::ledger_store::{self, MovementRow, MOVEMENT_COLUMNS};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct MovementService {
    db: PgPool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteMovementInput {
    pub reason: Option<String>,
}

/// Append one row to the ledger. Callers hold the relevant locks.
pub(crate) async fn insert_movement(
    conn: &mut PgConnection,
    movement: &NewMovement,
    created_by: Uuid,
    delivery_note_item_id: Option<Uuid>,
) -> AppResult<Uuid> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO movements (
            item_id, movement_type, quantity, pieces, coefficient, reference, notes,
            job_id, purchase_item_id, delivery_note_item_id, is_fictitious, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
        "#,
    )
    .bind(movement.item_id)
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.pieces)
    .bind(movement.coefficient)
    .bind(&movement.reference)
    .bind(&movement.notes)
    .bind(movement.job_id)
    .bind(movement.purchase_item_id)
    .bind(delivery_note_item_id)
    .bind(movement.is_fictitious)
    .bind(created_by)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub(crate) async fn movement_by_id(conn: &mut PgConnection, movement_id: Uuid, for_update: bool) -> AppResult<Movement> {
    let lock = if for_update { "FOR UPDATE OF m" } else { "" };
    let row = sqlx::query_as::<_, MovementRow>(&format!(
        "SELECT {} FROM movements m LEFT JOIN purchase_items pi ON pi.id = m.purchase_item_id
         WHERE m.id = $1 {}",
        MOVEMENT_COLUMNS, lock
    ))
    .bind(movement_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Movement".to_string()))?;
    Movement::try_from(row)
}

impl MovementService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Validate, check availability and append a movement atomically
    pub async fn record(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        input: NewMovement,
    ) -> AppResult<Movement> {
        let user_id = authorize_mutation(capabilities, user_id)?;
        input.validate_manual()?;

        let mut tx = self.db.begin().await?;
        let batch_ids: Vec<Uuid> = input.purchase_item_id.into_iter().collect();
        ledger_store::lock_rows(&mut tx, &[input.item_id], &batch_ids).await?;
        if let Some(job_id) = input.job_id {
            ledger_store::ensure_job_exists(&mut *tx, job_id).await?;
        }

        let batch = match input.purchase_item_id {
            Some(batch_id) => ledger_store::batch_availability(&mut tx, &[batch_id])
                .await?
                .remove(&batch_id),
            None => None,
        };

        let history = ledger_store::movements_for_item(&mut *tx, input.item_id).await?;
        let stock = item_stock(input.item_id, &history);

        if let Err(err) = input.check_availability(&stock, batch.as_ref()) {
            if matches!(err, LedgerError::InsufficientStock { .. }) {
                tracing::warn!(
                    item_id = %input.item_id,
                    batch_id = ?input.purchase_item_id,
                    requested = %input.quantity,
                    "movement rejected: {}",
                    err
                );
            }
            return Err(err.into());
        }

        let id = insert_movement(&mut tx, &input, user_id, None).await?;
        ledger_store::refresh_item_cache(&mut tx, input.item_id).await?;
        let movement = movement_by_id(&mut tx, id, false).await?;
        tx.commit().await?;

        tracing::info!(
            movement_id = %id,
            item_id = %movement.item_id,
            movement_type = movement.movement_type.as_str(),
            fictitious = movement.is_fictitious,
            "movement recorded"
        );
        Ok(movement)
    }

    pub async fn get(&self, movement_id: Uuid) -> AppResult<Movement> {
        let mut conn = self.db.acquire().await?;
        movement_by_id(&mut conn, movement_id, false).await
    }

    /// Movements newest first, one page at a time
    pub async fn list(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Movement>> {
        let movement_type = filter.movement_type.map(|t| t.as_str());
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM movements m
            WHERE ($1::uuid IS NULL OR m.item_id = $1)
              AND ($2::uuid IS NULL OR m.job_id = $2)
              AND ($3::text IS NULL OR m.movement_type = $3)
            "#,
        )
        .bind(filter.item_id)
        .bind(filter.job_id)
        .bind(movement_type)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {} FROM movements m LEFT JOIN purchase_items pi ON pi.id = m.purchase_item_id
            WHERE ($1::uuid IS NULL OR m.item_id = $1)
              AND ($2::uuid IS NULL OR m.job_id = $2)
              AND ($3::text IS NULL OR m.movement_type = $3)
            ORDER BY m.seq DESC
            LIMIT $4 OFFSET $5
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(filter.item_id)
        .bind(filter.job_id)
        .bind(movement_type)
        .bind(i64::from(pagination.limit()))
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data: ledger_store::into_movements(rows)?,
            pagination: PaginationMeta::new(&pagination, total.max(0) as u64),
        })
    }

    /// Hard-delete a manual movement as a ledger correction.
    ///
    /// A JSON snapshot goes to `movement_deletions` in the same transaction.
    /// Movements owned by a purchase line or a delivery note must be changed
    /// through their document.
    pub async fn delete(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        movement_id: Uuid,
        input: DeleteMovementInput,
    ) -> AppResult<()> {
        let user_id = authorize_mutation(capabilities, user_id)?;

        let mut tx = self.db.begin().await?;
        let movement = movement_by_id(&mut tx, movement_id, false).await?;

        if movement.delivery_note_item_id.is_some() {
            return Err(AppError::ConstraintViolation(
                "movement belongs to a delivery note; edit the note instead".to_string(),
            ));
        }
        if movement.movement_type == MovementType::Purchase {
            return Err(AppError::ConstraintViolation(
                "movement belongs to a purchase line; edit the purchase instead".to_string(),
            ));
        }

        // Item lock before the movement row lock
        ledger_store::lock_item(&mut tx, movement.item_id).await?;
        let movement = movement_by_id(&mut tx, movement_id, true).await?;

        // Removing real inbound stock must not leave the warehouse negative
        let inbound = direction(movement.movement_type, Perspective::Warehouse) == Direction::In;
        if inbound && !movement.is_fictitious {
            let history = ledger_store::movements_for_item(&mut *tx, movement.item_id).await?;
            let stock = item_stock(movement.item_id, &history);
            let after = stock.quantity - movement.quantity;
            if after < Decimal::ZERO {
                return Err(AppError::InsufficientStock {
                    subject: format!("item {}", movement.item_id),
                    requested: movement.quantity,
                    available: stock.quantity.max(Decimal::ZERO),
                });
            }
        }

        let snapshot = serde_json::to_value(&movement)
            .map_err(|e| AppError::Internal(format!("failed to snapshot movement: {}", e)))?;
        sqlx::query(
            "INSERT INTO movement_deletions (movement_id, snapshot, deleted_by, reason) VALUES ($1, $2, $3, $4)",
        )
        .bind(movement.id)
        .bind(snapshot)
        .bind(user_id)
        .bind(&input.reason)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM movements WHERE id = $1")
            .bind(movement.id)
            .execute(&mut *tx)
            .await?;
        ledger_store::refresh_item_cache(&mut tx, movement.item_id).await?;
        tx.commit().await?;

        tracing::warn!(
            movement_id = %movement.id,
            item_id = %movement.item_id,
            deleted_by = %user_id,
            "movement deleted as ledger correction"
        );
        Ok(())
    }
}
