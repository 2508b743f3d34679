//! Bill handlers.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Bill, CreateBill, UpdateBill};
use crate::startup::AppState;
use account_core::error::AppError;

/// Create a bill under an account.
///
/// POST /accounts/:account_id/bills
pub async fn create_bill(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(req): Json<CreateBill>,
) -> Result<(StatusCode, Json<Bill>), AppError> {
    req.validate()?;

    state
        .db
        .get_account(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Final account not found")))?;

    let bill = state.db.create_bill(account_id, &req).await?;

    Ok((StatusCode::CREATED, Json(bill)))
}

/// List bills for an account.
///
/// GET /accounts/:account_id/bills
pub async fn list_bills(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<Bill>>, AppError> {
    state
        .db
        .get_account(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Final account not found")))?;

    let bills = state.db.list_bills(account_id).await?;

    Ok(Json(bills))
}

/// Update a bill.
///
/// PATCH /bills/:bill_id
pub async fn update_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Json(req): Json<UpdateBill>,
) -> Result<Json<Bill>, AppError> {
    req.validate()?;

    let bill = state
        .db
        .update_bill(bill_id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill not found")))?;

    Ok(Json(bill))
}

/// Delete a bill.
///
/// DELETE /bills/:bill_id
pub async fn delete_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_bill(bill_id).await?;

    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Bill not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
