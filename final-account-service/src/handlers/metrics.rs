//! Metrics endpoint for Prometheus scraping.

use crate::services::get_metrics;
use axum::{http::StatusCode, response::IntoResponse};

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}
