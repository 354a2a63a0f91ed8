//! Job (commessa) service: job-site stock and fictitious price overrides

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::ledger::{authorize_mutation, job_stock, JobStockView, PriceBook};
use shared::models::{Capabilities, FictitiousPrice, Job, JobInput};
use shared::validation::{validate_job_code, validate_non_negative};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use super::ledger_store;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct JobService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    code: String,
    name: String,
    client_name: Option<String>,
    site_address: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            code: row.code,
            name: row.name,
            client_name: row.client_name,
            site_address: row.site_address,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PriceRow {
    job_id: Uuid,
    item_id: Uuid,
    price: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<PriceRow> for FictitiousPrice {
    fn from(row: PriceRow) -> Self {
        FictitiousPrice {
            job_id: row.job_id,
            item_id: row.item_id,
            price: row.price,
            updated_at: row.updated_at,
        }
    }
}

const JOB_COLUMNS: &str = "id, code, name, client_name, site_address, is_active, created_at";

/// Upsert an override; shared by the immediate and debounced paths
pub(crate) async fn upsert_fictitious_price<'e>(
    exec: impl PgExecutor<'e>,
    job_id: Uuid,
    item_id: Uuid,
    price: Decimal,
) -> AppResult<FictitiousPrice> {
    let row = sqlx::query_as::<_, PriceRow>(
        r#"
        INSERT INTO job_fictitious_prices (job_id, item_id, price)
        VALUES ($1, $2, $3)
        ON CONFLICT (job_id, item_id) DO UPDATE SET price = EXCLUDED.price, updated_at = NOW()
        RETURNING job_id, item_id, price, updated_at
        "#,
    )
    .bind(job_id)
    .bind(item_id)
    .bind(price)
    .fetch_one(exec)
    .await?;
    Ok(row.into())
}

pub(crate) async fn job_by_id<'e>(exec: impl PgExecutor<'e>, job_id: Uuid) -> AppResult<Job> {
    sqlx::query_as::<_, JobRow>(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
        .bind(job_id)
        .fetch_optional(exec)
        .await?
        .map(Job::from)
        .ok_or_else(|| AppError::NotFound("Job".to_string()))
}

pub(crate) fn validate_override_price(price: Decimal) -> AppResult<()> {
    validate_non_negative(price)
        .map_err(|msg| AppError::validation("price", msg, "Il prezzo non può essere negativo"))
}

impl JobService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: JobInput) -> AppResult<Job> {
        let code = input.code.trim();
        validate_job_code(code)
            .map_err(|msg| AppError::validation("code", msg, "Codice commessa non valido"))?;
        if input.name.trim().is_empty() {
            return Err(AppError::validation("name", "Name is required", "Il nome è obbligatorio"));
        }

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            INSERT INTO jobs (code, name, client_name, site_address)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(code)
        .bind(input.name.trim())
        .bind(&input.client_name)
        .bind(&input.site_address)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(code = %row.code, "job created");
        Ok(row.into())
    }

    pub async fn list(&self, active_only: bool) -> AppResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE NOT $1 OR is_active ORDER BY code",
            JOB_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    pub async fn get(&self, job_id: Uuid) -> AppResult<Job> {
        job_by_id(&self.db, job_id).await
    }

    /// Valued stock at the job site; costs redacted without cost visibility
    pub async fn stock(&self, capabilities: &Capabilities, job_id: Uuid) -> AppResult<JobStockView> {
        self.get(job_id).await?;
        let movements = ledger_store::movements_for_job(&self.db, job_id).await?;

        let mut item_ids: Vec<Uuid> = movements.iter().map(|m| m.item_id).collect();
        item_ids.sort();
        item_ids.dedup();
        let mut batch_ids: Vec<Uuid> = movements.iter().filter_map(|m| m.purchase_item_id).collect();
        batch_ids.sort();
        batch_ids.dedup();

        let catalog = ledger_store::catalog(&self.db, &item_ids).await?;
        let batches = ledger_store::batches_by_ids(&self.db, &batch_ids).await?;
        let prices = PriceBook {
            batch_prices: batches
                .iter()
                .map(|b| (b.purchase_item_id, b.unit_price))
                .collect(),
            fictitious_overrides: self.override_map(job_id).await?,
        };

        let view = job_stock(job_id, &movements, &catalog, &prices);
        if view.incomplete {
            tracing::debug!(job_id = %job_id, "job valuation incomplete: unpriced real stock");
        }
        Ok(if capabilities.can_view_cost {
            view
        } else {
            view.redacted()
        })
    }

    async fn override_map(&self, job_id: Uuid) -> AppResult<HashMap<Uuid, Decimal>> {
        Ok(self
            .fictitious_prices(job_id)
            .await?
            .into_iter()
            .map(|p| (p.item_id, p.price))
            .collect())
    }

    pub async fn fictitious_prices(&self, job_id: Uuid) -> AppResult<Vec<FictitiousPrice>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT job_id, item_id, price, updated_at FROM job_fictitious_prices WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(FictitiousPrice::from).collect())
    }

    /// Persist an override immediately
    pub async fn set_fictitious_price(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        job_id: Uuid,
        item_id: Uuid,
        price: Decimal,
    ) -> AppResult<FictitiousPrice> {
        authorize_mutation(capabilities, user_id)?;
        validate_override_price(price)?;
        self.get(job_id).await?;
        ledger_store::item_by_id(&self.db, item_id).await?;
        upsert_fictitious_price(&self.db, job_id, item_id, price).await
    }

    pub async fn clear_fictitious_price(
        &self,
        capabilities: &Capabilities,
        user_id: Option<Uuid>,
        job_id: Uuid,
        item_id: Uuid,
    ) -> AppResult<bool> {
        authorize_mutation(capabilities, user_id)?;
        let result = sqlx::query("DELETE FROM job_fictitious_prices WHERE job_id = $1 AND item_id = $2")
            .bind(job_id)
            .bind(item_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
