//! HTTP handlers for delivery notes (DDT)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::ledger::{DeliveryNoteDraft, DraftLine};
use shared::models::{DeliveryNote, DeliveryNoteWithLines};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::delivery_notes::{DeliveryNoteFilter, PrintableDeliveryNote};
use crate::services::DeliveryNoteService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReplaceLinesInput {
    pub lines: Vec<DraftLine>,
}

pub async fn list_delivery_notes(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<DeliveryNoteFilter>,
) -> AppResult<Json<Vec<DeliveryNote>>> {
    let service = DeliveryNoteService::new(state.db);
    Ok(Json(service.list(filter).await?))
}

/// Save a composed note: header, lines and their movements in one go
pub async fn create_delivery_note(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(draft): Json<DeliveryNoteDraft>,
) -> AppResult<(StatusCode, Json<DeliveryNoteWithLines>)> {
    let user = current_user.0;
    let service = DeliveryNoteService::new(state.db);
    let note = service
        .create(&user.capabilities, Some(user.user_id), draft)
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_delivery_note(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<Json<DeliveryNoteWithLines>> {
    let service = DeliveryNoteService::new(state.db);
    Ok(Json(service.get(note_id).await?))
}

pub async fn replace_delivery_note_lines(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(note_id): Path<Uuid>,
    Json(input): Json<ReplaceLinesInput>,
) -> AppResult<Json<DeliveryNoteWithLines>> {
    let user = current_user.0;
    let service = DeliveryNoteService::new(state.db);
    let note = service
        .replace_lines(&user.capabilities, Some(user.user_id), note_id, input.lines)
        .await?;
    Ok(Json(note))
}

pub async fn finalize_delivery_note(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<Json<DeliveryNote>> {
    let user = current_user.0;
    let service = DeliveryNoteService::new(state.db);
    let note = service
        .finalize(&user.capabilities, Some(user.user_id), note_id)
        .await?;
    Ok(Json(note))
}

/// Printable layout with the company header from configuration
pub async fn print_delivery_note(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<Json<PrintableDeliveryNote>> {
    let service = DeliveryNoteService::new(state.db.clone());
    let printable = service.printable(note_id, &state.config.company).await?;
    Ok(Json(printable))
}
