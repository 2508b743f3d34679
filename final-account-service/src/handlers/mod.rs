//! HTTP handlers for final-account-service.

pub mod accounts;
pub mod bills;
pub mod items;
pub mod metrics;
pub mod reviews;
pub mod sections;
