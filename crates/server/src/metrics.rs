//! Prometheus metrics for the status server.
//!
//! Request metrics are recorded by middleware. Catalog and crawler gauges
//! are refreshed from application state on every scrape; intake and
//! resolver counters come from the core crate.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "det_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("det_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

// =============================================================================
// Catalog and crawler gauges (collected dynamically)
// =============================================================================

pub static CATALOG_TORRENTS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("det_catalog_torrents", "Torrents known to the catalog").unwrap()
});

pub static CATALOG_RESOLVED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "det_catalog_resolved_torrents",
        "Torrents with resolved metadata",
    )
    .unwrap()
});

pub static CATALOG_ANNOUNCES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "det_catalog_announces",
        "Distinct (info-hash, peer) announces",
    )
    .unwrap()
});

pub static RESOLVE_QUEUE_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "det_resolve_queue_pending",
        "Hashes waiting for a resolver worker",
    )
    .unwrap()
});

pub static RESOLVER_POOL_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "det_resolver_pool_running",
        "Whether the resolver pool is running (1) or not (0)",
    )
    .unwrap()
});

pub static RESOLVE_CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "det_resolve_cache_entries",
        "Hashes currently suppressed by the resolve cache",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();

    registry.register(Box::new(CATALOG_TORRENTS.clone())).unwrap();
    registry.register(Box::new(CATALOG_RESOLVED.clone())).unwrap();
    registry
        .register(Box::new(CATALOG_ANNOUNCES.clone()))
        .unwrap();
    registry
        .register(Box::new(RESOLVE_QUEUE_PENDING.clone()))
        .unwrap();
    registry
        .register(Box::new(RESOLVER_POOL_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(RESOLVE_CACHE_ENTRIES.clone()))
        .unwrap();

    // Core metrics (intake, resolver)
    for metric in detergent_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh gauges from current application state before encoding.
pub fn collect_dynamic_metrics(state: &AppState) {
    if let Ok(stats) = state.query().stats() {
        CATALOG_TORRENTS.set(stats.total_torrents as i64);
        CATALOG_RESOLVED.set(stats.total_resolved as i64);
        CATALOG_ANNOUNCES.set(stats.total_announces as i64);
    }

    if let Some(status) = state.pool_status() {
        RESOLVER_POOL_RUNNING.set(if status.running { 1 } else { 0 });
    }

    if let Some(pending) = state.queue_pending() {
        RESOLVE_QUEUE_PENDING.set(pending as i64);
    }

    if let Some(entries) = state.cache_entries() {
        RESOLVE_CACHE_ENTRIES.set(entries as i64);
    }
}

/// Normalize a path for metric labels (replace info-hashes with a placeholder).
pub fn normalize_path(path: &str) -> String {
    let hash_regex = regex_lite::Regex::new(r"\b[0-9a-fA-F]{40}\b").unwrap();
    hash_regex.replace_all(path, "{hash}").to_string()
}
