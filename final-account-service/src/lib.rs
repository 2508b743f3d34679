//! Final account service - manages construction final accounts, bills,
//! sections and line items, deriving contract/final/variation amounts
//! and keeping section totals consistent as items change.

pub mod calc;
pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
