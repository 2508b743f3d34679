//! Section handlers, including the explicit total-recompute endpoint.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateSection, Section, UpdateSection};
use crate::startup::AppState;
use account_core::error::AppError;

/// Create a section under a bill.
///
/// POST /bills/:bill_id/sections
pub async fn create_section(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Json(req): Json<CreateSection>,
) -> Result<(StatusCode, Json<Section>), AppError> {
    req.validate()?;

    state
        .db
        .get_bill(bill_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill not found")))?;

    let section = state.db.create_section(bill_id, &req).await?;

    Ok((StatusCode::CREATED, Json(section)))
}

/// List sections for a bill.
///
/// GET /bills/:bill_id/sections
pub async fn list_sections(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<Vec<Section>>, AppError> {
    state
        .db
        .get_bill(bill_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill not found")))?;

    let sections = state.db.list_sections(bill_id).await?;

    Ok(Json(sections))
}

/// Get a section by ID.
///
/// GET /sections/:section_id
pub async fn get_section(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
) -> Result<Json<Section>, AppError> {
    let section = state
        .db
        .get_section(section_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Section not found")))?;

    Ok(Json(section))
}

/// Update a section's descriptive fields.
///
/// PATCH /sections/:section_id
pub async fn update_section(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
    Json(req): Json<UpdateSection>,
) -> Result<Json<Section>, AppError> {
    req.validate()?;

    let section = state
        .db
        .update_section(section_id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Section not found")))?;

    Ok(Json(section))
}

/// Delete a section and everything under it.
///
/// DELETE /sections/:section_id
pub async fn delete_section(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_section(section_id).await?;

    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Section not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Recompute section totals from current items and return the fresh section.
///
/// POST /sections/:section_id/recompute
pub async fn recompute_section(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
) -> Result<Json<Section>, AppError> {
    let section = state
        .db
        .recompute_section(section_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Section not found")))?;

    Ok(Json(section))
}
