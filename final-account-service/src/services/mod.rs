//! Services for final-account-service.

pub mod database;
pub mod metrics;

pub use database::{Database, ItemMutation};
pub use metrics::{get_metrics, init_metrics};
