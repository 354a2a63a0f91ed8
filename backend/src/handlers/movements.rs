//! HTTP handlers for manual movement recording and correction

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::ledger::NewMovement;
use shared::models::Movement;
use shared::types::{PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::movements::{DeleteMovementInput, MovementFilter};
use crate::services::MovementService;
use crate::AppState;

/// Ledger rows newest first, with page metadata
pub async fn list_movements(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<MovementFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<Movement>>> {
    let service = MovementService::new(state.db);
    Ok(Json(service.list(filter, pagination).await?))
}

/// Record a manual movement
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<NewMovement>,
) -> AppResult<(StatusCode, Json<Movement>)> {
    let user = current_user.0;
    let service = MovementService::new(state.db);
    let movement = service
        .record(&user.capabilities, Some(user.user_id), input)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn get_movement(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(movement_id): Path<Uuid>,
) -> AppResult<Json<Movement>> {
    let service = MovementService::new(state.db);
    Ok(Json(service.get(movement_id).await?))
}

/// Hard-delete a manual movement; an audit snapshot is kept
pub async fn delete_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(movement_id): Path<Uuid>,
    input: Option<Json<DeleteMovementInput>>,
) -> AppResult<StatusCode> {
    let user = current_user.0;
    let input = input.map(|Json(body)| body).unwrap_or_default();
    let service = MovementService::new(state.db);
    service
        .delete(&user.capabilities, Some(user.user_id), movement_id, input)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
