//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Transform handles (started per work class, finished per result)
//! - Queue cycles
//! - File rewriting and downloads

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Transform handles
// =============================================================================

/// Handles issued by the engine, by work class.
pub static HANDLES_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pressline_handles_started_total",
            "Total transform handles that accepted an order",
        ),
        &["class"], // a work class name, or "manual" for start_by_id
    )
    .unwrap()
});

/// Handles finished, by result.
pub static HANDLES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pressline_handles_finished_total",
            "Total transform handles that reached close",
        ),
        &["result"], // "success", "empty_queue", "cancelled", or an error kind
    )
    .unwrap()
});

/// Handles currently registered with the queue manager.
pub static HANDLES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pressline_handles_in_flight",
        "Transform handles currently in flight",
    )
    .unwrap()
});

// =============================================================================
// Queue cycles
// =============================================================================

/// Duration of a full four-class cycle.
pub static CYCLE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("pressline_cycle_duration_seconds", "Duration of queue cycles")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
    )
    .unwrap()
});

// =============================================================================
// Files and downloads
// =============================================================================

/// Sheet files written under the destination root.
pub static FILES_REWRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pressline_files_rewritten_total",
        "Total sheet files written with index-coded names",
    )
    .unwrap()
});

/// Archive bytes received.
pub static DOWNLOAD_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pressline_download_bytes_total",
        "Total archive bytes downloaded",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(HANDLES_STARTED.clone()),
        Box::new(HANDLES_FINISHED.clone()),
        Box::new(HANDLES_IN_FLIGHT.clone()),
        Box::new(CYCLE_DURATION.clone()),
        Box::new(FILES_REWRITTEN.clone()),
        Box::new(DOWNLOAD_BYTES.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        HANDLES_STARTED.with_label_values(&["new_load"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "pressline_handles_started_total"));
    }
}
