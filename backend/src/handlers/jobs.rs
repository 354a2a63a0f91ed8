//! HTTP handlers for jobs, job-site stock and fictitious price overrides

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{FictitiousPrice, Job, JobBatchAvailability, JobInput};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::jobs::validate_override_price;
use crate::services::reporting::JobStockCsvRow;
use crate::services::{BatchService, JobService, ReportingService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub format: Option<String>, // "json" or "csv"
}

#[derive(Debug, Deserialize)]
pub struct FictitiousPriceQuery {
    /// Collapse rapid edits into one delayed write
    #[serde(default)]
    pub debounce: bool,
}

#[derive(Debug, Deserialize)]
pub struct FictitiousPriceInput {
    pub price: Decimal,
}

/// Reply to a debounced override edit
#[derive(Debug, Serialize)]
pub struct ScheduledPrice {
    pub job_id: Uuid,
    pub item_id: Uuid,
    pub price: Decimal,
    pub scheduled: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearedPrice {
    pub removed: bool,
    pub cancelled_pending: bool,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<JobListQuery>,
) -> AppResult<Json<Vec<Job>>> {
    let service = JobService::new(state.db);
    Ok(Json(service.list(query.active_only).await?))
}

pub async fn create_job(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<JobInput>,
) -> AppResult<(StatusCode, Json<Job>)> {
    current_user.0.require_mutate()?;
    let service = JobService::new(state.db);
    let job = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    let service = JobService::new(state.db);
    Ok(Json(service.get(job_id).await?))
}

/// Job-site stock, as JSON or CSV
pub async fn get_job_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(job_id): Path<Uuid>,
    Query(query): Query<StockQuery>,
) -> AppResult<impl IntoResponse> {
    let service = JobService::new(state.db);
    let view = service.stock(&current_user.0.capabilities, job_id).await?;

    if query.format.as_deref() == Some("csv") {
        let rows: Vec<JobStockCsvRow> = view.lines.iter().map(JobStockCsvRow::from).collect();
        let csv = ReportingService::export_to_csv(&rows)?;
        Ok((
            [(header::CONTENT_TYPE, "text/csv"), (header::CONTENT_DISPOSITION, "attachment; filename=\"job_stock.csv\"")],
            csv,
        ).into_response())
    } else {
        Ok(Json(view).into_response())
    }
}

/// Batches with material still at the job site
pub async fn get_job_batches(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Vec<JobBatchAvailability>>> {
    let service = BatchService::new(state.db);
    Ok(Json(service.for_job(job_id).await?))
}

pub async fn list_fictitious_prices(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Vec<FictitiousPrice>>> {
    let service = JobService::new(state.db);
    Ok(Json(service.fictitious_prices(job_id).await?))
}

/// Set a fictitious price override, immediately or debounced
pub async fn set_fictitious_price(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((job_id, item_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<FictitiousPriceQuery>,
    Json(input): Json<FictitiousPriceInput>,
) -> AppResult<axum::response::Response> {
    let user = current_user.0;

    if query.debounce {
        user.require_mutate()?;
        validate_override_price(input.price)?;
        state.autosave.schedule(job_id, item_id, input.price);
        let reply = ScheduledPrice {
            job_id,
            item_id,
            price: input.price,
            scheduled: true,
        };
        return Ok((StatusCode::ACCEPTED, Json(reply)).into_response());
    }

    // An explicit save supersedes any pending debounced write
    state.autosave.cancel(job_id, item_id);
    let service = JobService::new(state.db);
    let price = service
        .set_fictitious_price(&user.capabilities, Some(user.user_id), job_id, item_id, input.price)
        .await?;
    Ok(Json(price).into_response())
}

/// Remove an override, dropping any pending debounced write first
pub async fn clear_fictitious_price(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((job_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ClearedPrice>> {
    let user = current_user.0;
    user.require_mutate()?;
    let cancelled_pending = state.autosave.cancel(job_id, item_id);
    let service = JobService::new(state.db);
    let removed = service
        .clear_fictitious_price(&user.capabilities, Some(user.user_id), job_id, item_id)
        .await?;
    Ok(Json(ClearedPrice {
        removed,
        cancelled_pending,
    }))
}
