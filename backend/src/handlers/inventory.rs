//! HTTP handlers for inventory endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::types::{PaginatedResponse, Pagination};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::{
    AdjustmentInput, AdjustmentOutcome, InventoryService, ReconciliationReport,
};
use crate::services::ledger::InventoryMovement;
use crate::AppState;

fn service(state: AppState) -> InventoryService {
    let unit = state.config.inventory.sale_unit();
    InventoryService::new(state.db, unit)
}

/// Apply a manual stock adjustment
pub async fn create_adjustment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    payload: Result<Json<AdjustmentInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AdjustmentOutcome>)> {
    let Json(input) = payload?;
    input.validate()?;
    let outcome = service(state)
        .adjust(current_user.0.pharmacy_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Ledger history for a medicine
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(medicine_id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<InventoryMovement>>> {
    let movements = service(state)
        .movements(current_user.0.pharmacy_id, medicine_id, pagination)
        .await?;
    Ok(Json(movements))
}

/// Compare cached balances with the ledger
pub async fn reconcile(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ReconciliationReport>> {
    let report = service(state).reconcile(current_user.0.pharmacy_id).await?;
    Ok(Json(report))
}
