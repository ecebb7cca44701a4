//! Prometheus metrics for the crawl pipeline.
//!
//! This module provides metrics for:
//! - Intake (DHT events by kind and outcome, queue saturation)
//! - Resolver pool (resolution outcomes and durations)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Intake Metrics
// =============================================================================

/// DHT events handled by intake.
pub static INTAKE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("det_intake_events_total", "DHT events handled by intake"),
        &["kind", "result"], // kind: "query", "announce"; result: "enqueued", "suppressed", "dropped", "rejected"
    )
    .unwrap()
});

/// Hashes discarded because the resolve queue was full.
pub static QUEUE_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "det_resolve_queue_dropped_total",
        "Hashes dropped because the resolve queue was full",
    )
    .unwrap()
});

// =============================================================================
// Resolver Metrics
// =============================================================================

/// Resolution attempts by outcome.
pub static RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("det_resolutions_total", "Metadata resolution attempts"),
        &["result"], // "resolved", "timeout", "already_resolved", "in_flight", "failed"
    )
    .unwrap()
});

/// Time spent waiting for metadata.
pub static RESOLVE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "det_resolve_duration_seconds",
            "Duration of metadata fetches",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["result"],
    )
    .unwrap()
});

/// All core metrics, for registration by the binary.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(INTAKE_EVENTS.clone()),
        Box::new(QUEUE_DROPPED.clone()),
        Box::new(RESOLUTIONS.clone()),
        Box::new(RESOLVE_DURATION.clone()),
    ]
}
