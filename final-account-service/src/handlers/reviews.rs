//! Section review request handlers. The review URL and any outbound email
//! are composed by the caller; this service issues and resolves the token.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::{CreateSectionReview, ReviewRequestStatus, SectionReview};
use crate::startup::AppState;
use account_core::error::AppError;

/// Status transition request.
#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub status: ReviewRequestStatus,
}

/// Create a review request for a section. Issues an access token and moves
/// the section into `in_review`.
///
/// POST /sections/:section_id/reviews
pub async fn create_review(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
    Json(req): Json<CreateSectionReview>,
) -> Result<(StatusCode, Json<SectionReview>), AppError> {
    req.validate()?;

    let review = state.db.create_review(section_id, &req).await?;

    Ok((StatusCode::CREATED, Json(review)))
}

/// List review requests for a section.
///
/// GET /sections/:section_id/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(section_id): Path<Uuid>,
) -> Result<Json<Vec<SectionReview>>, AppError> {
    state
        .db
        .get_section(section_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Section not found")))?;

    let reviews = state.db.list_reviews(section_id).await?;

    Ok(Json(reviews))
}

/// Resolve a review request from the token embedded in a review URL.
///
/// GET /reviews/token/:token
pub async fn get_review_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SectionReview>, AppError> {
    let review = state
        .db
        .get_review_by_token(&token)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Review not found")))?;

    Ok(Json(review))
}

/// Record the reviewer's decision; approved/rejected is mirrored onto the
/// section's review status.
///
/// PATCH /reviews/:review_id
pub async fn update_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    Json(req): Json<UpdateReviewRequest>,
) -> Result<Json<SectionReview>, AppError> {
    let review = state
        .db
        .update_review_status(review_id, req.status)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Review not found")))?;

    Ok(Json(review))
}
