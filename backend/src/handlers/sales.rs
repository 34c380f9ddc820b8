//! HTTP handlers for point-of-sale endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::sales::{
    CreateSaleInput, PostDraftInput, ReturnOutcome, ReturnSaleInput, SaleReceipt, SalesService,
};
use crate::AppState;

fn service(state: AppState) -> SalesService {
    let unit = state.config.inventory.sale_unit();
    SalesService::new(state.db, unit)
}

/// Post a sale
pub async fn create_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    payload: Result<Json<CreateSaleInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SaleReceipt>)> {
    let Json(input) = payload?;
    input.validate()?;
    let receipt = service(state)
        .create_sale(current_user.0.pharmacy_id, current_user.0.user_id, input, false)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Save a sale as a draft without touching stock
pub async fn create_draft(
    State(state): State<AppState>,
    current_user: CurrentUser,
    payload: Result<Json<CreateSaleInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SaleReceipt>)> {
    let Json(input) = payload?;
    input.validate()?;
    let receipt = service(state)
        .create_sale(current_user.0.pharmacy_id, current_user.0.user_id, input, true)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Post a stored draft
pub async fn post_draft(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
    payload: Result<Json<PostDraftInput>, JsonRejection>,
) -> AppResult<Json<SaleReceipt>> {
    let Json(input) = payload?;
    let receipt = service(state)
        .post_draft(current_user.0.pharmacy_id, sale_id, input)
        .await?;
    Ok(Json(receipt))
}

/// Get a sale with its lines and payments
pub async fn get_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
) -> AppResult<Json<SaleReceipt>> {
    let receipt = service(state)
        .get_sale(current_user.0.pharmacy_id, sale_id)
        .await?;
    Ok(Json(receipt))
}

/// Return part or all of a posted sale
pub async fn return_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<i64>,
    payload: Result<Json<ReturnSaleInput>, JsonRejection>,
) -> AppResult<Json<ReturnOutcome>> {
    let Json(input) = payload?;
    input.validate()?;
    let outcome = service(state)
        .return_sale(current_user.0.pharmacy_id, sale_id, input)
        .await?;
    Ok(Json(outcome))
}
