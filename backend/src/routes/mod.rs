//! Route definitions for the stock ledger API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        .merge(protected_routes(state))
}

/// Everything behind a bearer token
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/items", item_routes())
        .nest("/movements", movement_routes())
        .route("/stock", get(handlers::get_warehouse_stock))
        .nest("/jobs", job_routes())
        .nest("/purchases", purchase_routes())
        .nest("/delivery-notes", delivery_note_routes())
        .route("/reports/dashboard", get(handlers::get_dashboard))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Item catalogue and warehouse views
fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_items).post(handlers::create_item))
        .route("/low-stock", get(handlers::get_low_stock_items))
        .route(
            "/:item_id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route("/:item_id/real-quantity", put(handlers::set_real_quantity))
        .route("/:item_id/reconcile", post(handlers::reconcile_item))
        .route("/:item_id/stock", get(handlers::get_item_stock))
        .route("/:item_id/valuation", get(handlers::get_item_valuation))
        .route("/:item_id/batches", get(handlers::get_item_batches))
        .route("/:item_id/fifo", get(handlers::suggest_fifo))
        .route("/:item_id/movements", get(handlers::get_item_movements))
}

/// Manual movements
fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_movements).post(handlers::record_movement))
        .route(
            "/:movement_id",
            get(handlers::get_movement).delete(handlers::delete_movement),
        )
}

/// Jobs, job-site stock and price overrides
fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_jobs).post(handlers::create_job))
        .route("/:job_id", get(handlers::get_job))
        .route("/:job_id/stock", get(handlers::get_job_stock))
        .route("/:job_id/batches", get(handlers::get_job_batches))
        .route("/:job_id/fictitious-prices", get(handlers::list_fictitious_prices))
        .route(
            "/:job_id/fictitious-prices/:item_id",
            put(handlers::set_fictitious_price).delete(handlers::clear_fictitious_price),
        )
}

/// Purchase ledger
fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_purchases).post(handlers::create_purchase))
        .route("/:purchase_id", get(handlers::get_purchase))
        .route("/:purchase_id/items", post(handlers::add_purchase_item))
        .route(
            "/:purchase_id/items/:line_id",
            put(handlers::update_purchase_item).delete(handlers::delete_purchase_item),
        )
        .route("/:purchase_id/finalize", post(handlers::finalize_purchase))
}

/// Delivery notes
fn delivery_note_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_delivery_notes).post(handlers::create_delivery_note))
        .route("/:note_id", get(handlers::get_delivery_note))
        .route("/:note_id/lines", put(handlers::replace_delivery_note_lines))
        .route("/:note_id/finalize", post(handlers::finalize_delivery_note))
        .route("/:note_id/print", get(handlers::print_delivery_note))
}
