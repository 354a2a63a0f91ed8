//! HTTP handlers for the item catalogue and per-item stock views

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::ledger::{FifoSuggestion, ItemStock, WarehouseValuation};
use shared::models::{BatchAvailability, InventoryItem, ItemInput, Movement};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::items::{LowStockItem, Reconciliation, RealQuantityInput};
use crate::services::ItemService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ItemSearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub include_exhausted: bool,
}

#[derive(Debug, Deserialize)]
pub struct FifoQuery {
    pub quantity: Option<Decimal>,
}

/// List catalogue items, optionally filtered by code or name
pub async fn list_items(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ItemSearchQuery>,
) -> AppResult<Json<Vec<InventoryItem>>> {
    let service = ItemService::new(state.db);
    let items = service.list(query.search.as_deref()).await?;
    Ok(Json(items))
}

/// Items whose on-hand stock has fallen below the configured minimum
pub async fn get_low_stock_items(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<LowStockItem>>> {
    let service = ItemService::new(state.db);
    Ok(Json(service.low_stock().await?))
}

pub async fn get_item(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<InventoryItem>> {
    let service = ItemService::new(state.db);
    Ok(Json(service.get(item_id).await?))
}

/// Create an item; the code is assigned from the catalogue sequence
pub async fn create_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ItemInput>,
) -> AppResult<(StatusCode, Json<InventoryItem>)> {
    current_user.0.require_mutate()?;
    let service = ItemService::new(state.db);
    let item = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<ItemInput>,
) -> AppResult<Json<InventoryItem>> {
    current_user.0.require_mutate()?;
    let service = ItemService::new(state.db);
    Ok(Json(service.update(item_id, input).await?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require_mutate()?;
    let service = ItemService::new(state.db);
    service.delete(item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record the manually audited count for an item
pub async fn set_real_quantity(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(input): Json<RealQuantityInput>,
) -> AppResult<Json<InventoryItem>> {
    current_user.0.require_mutate()?;
    let service = ItemService::new(state.db);
    Ok(Json(service.set_real_quantity(item_id, input.real_quantity).await?))
}

/// Rebuild the cached counter from the ledger and report drift
pub async fn reconcile_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Reconciliation>> {
    current_user.0.require_mutate()?;
    let service = ItemService::new(state.db);
    Ok(Json(service.reconcile(item_id).await?))
}

pub async fn get_item_stock(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<ItemStock>> {
    let service = ItemService::new(state.db);
    Ok(Json(service.stock(item_id).await?))
}

/// Warehouse value of the remaining batches; needs cost visibility
pub async fn get_item_valuation(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<WarehouseValuation>> {
    if !current_user.0.can_view_cost() {
        return Err(AppError::PermissionDenied("Cost figures require the admin role".to_string()));
    }
    let service = ItemService::new(state.db);
    Ok(Json(service.valuation(item_id).await?))
}

pub async fn get_item_batches(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Query(query): Query<BatchQuery>,
) -> AppResult<Json<Vec<BatchAvailability>>> {
    let service = ItemService::new(state.db);
    Ok(Json(service.batches(item_id, query.include_exhausted).await?))
}

/// Suggest a FIFO split over the item's open batches
pub async fn suggest_fifo(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Query(query): Query<FifoQuery>,
) -> AppResult<Json<FifoSuggestion>> {
    let quantity = query.quantity.ok_or_else(|| {
        AppError::validation("quantity", "Quantity is required", "La quantità è obbligatoria")
    })?;
    let service = ItemService::new(state.db);
    Ok(Json(service.suggest_fifo(item_id, quantity).await?))
}

pub async fn get_item_movements(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<Vec<Movement>>> {
    let service = ItemService::new(state.db);
    Ok(Json(service.movements(item_id).await?))
}
