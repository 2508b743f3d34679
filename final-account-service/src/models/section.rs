//! Section model: named grouping of line items within a bill, carrying
//! rolled-up totals maintained by the aggregator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Review state of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionReviewStatus {
    Draft,
    InReview,
    Approved,
    Rejected,
}

impl SectionReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionReviewStatus::Draft => "draft",
            SectionReviewStatus::InReview => "in_review",
            SectionReviewStatus::Approved => "approved",
            SectionReviewStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub section_id: Uuid,
    pub bill_id: Uuid,
    pub name: String,
    pub display_order: i32,
    /// Totals equal the aggregator's sum over current non-header items and
    /// are recomputed inside the same transaction as every item mutation.
    pub contract_total: Decimal,
    pub final_total: Decimal,
    pub variation_total: Decimal,
    /// Total stated in the source BOQ, kept for discrepancy comparison.
    pub boq_stated_total: Option<Decimal>,
    pub review_status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a section.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSection {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub boq_stated_total: Option<Decimal>,
}

/// Input for updating a section.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateSection {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub display_order: Option<i32>,
    pub boq_stated_total: Option<Decimal>,
    pub review_status: Option<SectionReviewStatus>,
}
