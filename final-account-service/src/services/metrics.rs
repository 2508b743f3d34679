//! Prometheus metrics for final-account operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "final_account_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Item mutation counter
pub static ITEM_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Section total recompute counter
pub static SECTION_RECOMPUTES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// P&A children recomputed during cascades
pub static CASCADE_CHILDREN_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    ITEM_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "final_account_item_operations_total",
                "Total line item mutations by operation type"
            ),
            &["operation"]
        )
        .expect("Failed to register ITEM_OPERATIONS_TOTAL")
    });

    SECTION_RECOMPUTES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "final_account_section_recomputes_total",
                "Total section total recomputes by trigger"
            ),
            &["trigger"]
        )
        .expect("Failed to register SECTION_RECOMPUTES_TOTAL")
    });

    CASCADE_CHILDREN_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "final_account_cascade_children_total",
                "P&A child items recomputed after a Prime Cost edit"
            ),
            &["operation"]
        )
        .expect("Failed to register CASCADE_CHILDREN_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record an item mutation.
pub fn record_item_operation(operation: &str) {
    if let Some(counter) = ITEM_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation]).inc();
    }
}

/// Record a section total recompute.
pub fn record_section_recompute(trigger: &str) {
    if let Some(counter) = SECTION_RECOMPUTES_TOTAL.get() {
        counter.with_label_values(&[trigger]).inc();
    }
}

/// Record P&A children recomputed by a cascade.
pub fn record_cascade_children(operation: &str, count: u64) {
    if let Some(counter) = CASCADE_CHILDREN_TOTAL.get() {
        counter.with_label_values(&[operation]).inc_by(count);
    }
}
