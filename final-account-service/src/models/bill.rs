//! Bill model: named grouping of sections under a final account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bill {
    pub bill_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub display_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a bill.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBill {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

/// Input for updating a bill.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBill {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub display_order: Option<i32>,
}
