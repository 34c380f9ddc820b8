//! HTTP handlers for purchase order endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::purchase::{
    CreatePurchaseInput, PurchaseOrder, PurchaseOrderDetail, PurchaseService, RecordPaymentInput,
};
use crate::services::receiving::{ReceiveInput, ReceiveOutcome, ReceivingService};
use crate::AppState;

#[derive(Serialize)]
pub struct ReceiveResponse {
    pub success: bool,
    pub message: String,
    pub purchase: ReceiveOutcome,
}

/// Create a purchase order
pub async fn create_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    payload: Result<Json<CreatePurchaseInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<PurchaseOrderDetail>)> {
    let Json(input) = payload?;
    input.validate()?;
    let service = PurchaseService::new(state.db);
    let order = service
        .create_order(current_user.0.pharmacy_id, current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get a purchase order with its lines
pub async fn get_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<PurchaseOrderDetail>> {
    let service = PurchaseService::new(state.db);
    let order = service.get_order(current_user.0.pharmacy_id, order_id).await?;
    Ok(Json(order))
}

/// Receive delivered quantities against a purchase order
pub async fn receive_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
    payload: Result<Json<ReceiveInput>, JsonRejection>,
) -> AppResult<Json<ReceiveResponse>> {
    let Json(input) = payload?;
    input.validate()?;
    let service = ReceivingService::new(state.db);
    let outcome = service
        .receive(current_user.0.pharmacy_id, order_id, input)
        .await?;

    let message = if outcome.received_items == 0 {
        "No quantities to receive".to_string()
    } else {
        format!("Received {} item(s)", outcome.received_items)
    };

    Ok(Json(ReceiveResponse {
        success: true,
        message,
        purchase: outcome,
    }))
}

/// Record a supplier payment
pub async fn record_payment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
    payload: Result<Json<RecordPaymentInput>, JsonRejection>,
) -> AppResult<Json<PurchaseOrder>> {
    let Json(input) = payload?;
    let service = PurchaseService::new(state.db);
    let order = service
        .record_payment(current_user.0.pharmacy_id, order_id, input)
        .await?;
    Ok(Json(order))
}
