//! HTTP handlers for the purchase ledger

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::ledger::{NewPurchase, PurchaseLineInput};
use shared::models::{Purchase, PurchaseItem, PurchaseSummary};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::purchases::PurchaseFilter;
use crate::services::PurchaseService;
use crate::AppState;

pub async fn list_purchases(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<PurchaseFilter>,
) -> AppResult<Json<Vec<Purchase>>> {
    let service = PurchaseService::new(state.db);
    Ok(Json(service.list(filter).await?))
}

pub async fn create_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<NewPurchase>,
) -> AppResult<(StatusCode, Json<Purchase>)> {
    let user = current_user.0;
    let service = PurchaseService::new(state.db);
    let purchase = service
        .create(&user.capabilities, Some(user.user_id), input)
        .await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// Purchase header with its lines, total and missing-price flag
pub async fn get_purchase(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseSummary>> {
    let service = PurchaseService::new(state.db);
    Ok(Json(service.summary(purchase_id).await?))
}

pub async fn add_purchase_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Json(input): Json<PurchaseLineInput>,
) -> AppResult<(StatusCode, Json<PurchaseItem>)> {
    let user = current_user.0;
    let service = PurchaseService::new(state.db);
    let line = service
        .add_item(&user.capabilities, Some(user.user_id), purchase_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn update_purchase_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((purchase_id, line_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<PurchaseLineInput>,
) -> AppResult<Json<PurchaseItem>> {
    let user = current_user.0;
    let service = PurchaseService::new(state.db);
    let line = service
        .update_item(&user.capabilities, Some(user.user_id), purchase_id, line_id, input)
        .await?;
    Ok(Json(line))
}

pub async fn delete_purchase_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((purchase_id, line_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let user = current_user.0;
    let service = PurchaseService::new(state.db);
    service
        .delete_item(&user.capabilities, Some(user.user_id), purchase_id, line_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lock the purchase against further edits
pub async fn finalize_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> AppResult<Json<PurchaseSummary>> {
    let user = current_user.0;
    let service = PurchaseService::new(state.db);
    let summary = service
        .finalize(&user.capabilities, Some(user.user_id), purchase_id)
        .await?;
    Ok(Json(summary))
}
