//! Purchase batch (lot) queries

use rust_decimal::Decimal;
use shared::ledger::{all_batch_remaining, available_batches, job_batch_availability, suggest_fifo, FifoSuggestion};
use shared::models::{BatchAvailability, JobBatchAvailability};
use sqlx::PgPool;
use uuid::Uuid;

use super::ledger_store;
use crate::error::{AppError, AppResult};

/// Batch service; remaining quantities are replayed, never stored
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
}

impl BatchService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Batches of an item, oldest first
    pub async fn for_item(&self, item_id: Uuid, include_exhausted: bool) -> AppResult<Vec<BatchAvailability>> {
        let batches = ledger_store::batches_for_item(&self.db, item_id).await?;
        let ids: Vec<Uuid> = batches.iter().map(|b| b.purchase_item_id).collect();
        let movements = ledger_store::movements_for_batches(&self.db, &ids).await?;

        Ok(if include_exhausted {
            all_batch_remaining(&batches, &movements)
        } else {
            available_batches(&batches, &movements)
        })
    }

    /// Default FIFO split of an outbound quantity
    pub async fn suggest(&self, item_id: Uuid, quantity: Decimal) -> AppResult<FifoSuggestion> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::validation(
                "quantity",
                "Quantity must be positive",
                "La quantità deve essere positiva",
            ));
        }
        let available = self.for_item(item_id, false).await?;
        Ok(suggest_fifo(&available, quantity))
    }

    /// Lots physically at a job site, for return (entry) notes
    pub async fn for_job(&self, job_id: Uuid) -> AppResult<Vec<JobBatchAvailability>> {
        let movements = ledger_store::movements_for_job(&self.db, job_id).await?;
        let mut ids: Vec<Uuid> = movements.iter().filter_map(|m| m.purchase_item_id).collect();
        ids.sort();
        ids.dedup();
        let batches = ledger_store::batches_by_ids(&self.db, &ids).await?;
        Ok(job_batch_availability(job_id, &batches, &movements))
    }
}
