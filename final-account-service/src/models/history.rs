//! Per-item edit history. One snapshot row is appended for every update so
//! a section's numbers can be traced back cell by cell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemHistoryEntry {
    pub history_id: Uuid,
    pub item_id: Uuid,
    /// The partial update that was applied, as submitted.
    pub changed_fields: serde_json::Value,
    pub recorded_utc: DateTime<Utc>,
}
