//! Final account model: top-level container per project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A final account for one project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinalAccount {
    pub account_id: Uuid,
    pub project_name: String,
    pub contract_reference: Option<String>,
    /// Upload the account was imported from, when it came in via BOQ import.
    pub source_boq_upload_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a final account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFinalAccount {
    #[validate(length(min = 1, max = 200))]
    pub project_name: String,
    pub contract_reference: Option<String>,
    pub source_boq_upload_id: Option<Uuid>,
}

/// Input for updating a final account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateFinalAccount {
    #[validate(length(min = 1, max = 200))]
    pub project_name: Option<String>,
    pub contract_reference: Option<String>,
}
