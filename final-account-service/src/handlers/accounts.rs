//! Final account handlers.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateFinalAccount, FinalAccount, UpdateFinalAccount};
use crate::startup::AppState;
use account_core::error::AppError;

/// Create a final account.
///
/// POST /accounts
pub async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateFinalAccount>,
) -> Result<(StatusCode, Json<FinalAccount>), AppError> {
    req.validate()?;

    let account = state.db.create_account(&req).await?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// List final accounts.
///
/// GET /accounts
pub async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<Vec<FinalAccount>>, AppError> {
    let accounts = state.db.list_accounts().await?;

    Ok(Json(accounts))
}

/// Get a final account by ID.
///
/// GET /accounts/:account_id
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<FinalAccount>, AppError> {
    let account = state
        .db
        .get_account(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Final account not found")))?;

    Ok(Json(account))
}

/// Update a final account.
///
/// PATCH /accounts/:account_id
pub async fn update_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(req): Json<UpdateFinalAccount>,
) -> Result<Json<FinalAccount>, AppError> {
    req.validate()?;

    let account = state
        .db
        .update_account(account_id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Final account not found")))?;

    Ok(Json(account))
}

/// Delete a final account.
///
/// DELETE /accounts/:account_id
pub async fn delete_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_account(account_id).await?;

    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Final account not found"
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}
