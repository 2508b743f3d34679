//! Section review request model. The outbound email itself is handled
//! elsewhere; this service owns the record, the access token, and the
//! status transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Status of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewRequestStatus::Pending => "pending",
            ReviewRequestStatus::Approved => "approved",
            ReviewRequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SectionReview {
    pub review_id: Uuid,
    pub section_id: Uuid,
    /// Opaque token embedded in the review URL sent to the recipient.
    pub access_token: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub message: Option<String>,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub responded_utc: Option<DateTime<Utc>>,
}

/// Input for creating a review request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSectionReview {
    #[validate(length(min = 1, max = 200))]
    pub recipient_name: String,
    #[validate(email)]
    pub recipient_email: String,
    pub message: Option<String>,
}
