//! Route definitions for the pharmacy inventory API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - purchasing and receiving
        .nest("/purchases", purchase_routes(state.clone()))
        // Protected routes - point of sale
        .nest("/pos/sales", sales_routes(state.clone()))
        // Protected routes - stock adjustments and ledger
        .nest("/inventory", inventory_routes(state))
}

/// Purchase order routes (protected)
fn purchase_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::purchases::create_purchase))
        .route("/:order_id", get(handlers::purchases::get_purchase))
        .route("/:order_id/receive", post(handlers::purchases::receive_purchase))
        .route("/:order_id/payments", post(handlers::purchases::record_payment))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Sale routes (protected)
fn sales_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::sales::create_sale))
        .route("/drafts", post(handlers::sales::create_draft))
        .route("/drafts/:sale_id/post", post(handlers::sales::post_draft))
        .route("/:sale_id", get(handlers::sales::get_sale))
        .route("/:sale_id/return", post(handlers::sales::return_sale))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Inventory routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/adjustments", post(handlers::inventory::create_adjustment))
        .route(
            "/medicines/:medicine_id/movements",
            get(handlers::inventory::list_movements),
        )
        .route("/reconciliation", get(handlers::inventory::reconcile))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
