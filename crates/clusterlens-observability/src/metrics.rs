use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Ingestion Metrics
    // ============================================================================

    /// Deltas applied to a cache, by outcome (updated, removed, skipped)
    pub static ref RECORDS_APPLIED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterlens_records_applied_total", "Total deltas applied to a cache"),
        &["cache", "outcome"]
    ).expect("metric can be created");

    /// Deltas per applied batch
    pub static ref BATCH_SIZE: HistogramVec = HistogramVec::new(
        HistogramOpts::new("clusterlens_batch_size", "Deltas per applied batch")
            .buckets(vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]),
        &["cache"]
    ).expect("metric can be created");

    /// Batches rejected before anything was applied
    pub static ref BATCHES_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterlens_batches_rejected_total", "Total batches rejected by validation"),
        &["cache"]
    ).expect("metric can be created");

    /// Deltas whose fold panicked; the entry keeps its previous state
    pub static ref APPLY_PANICS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterlens_apply_panics_total", "Total deltas skipped after a panicking fold"),
        &["cache"]
    ).expect("metric can be created");

    /// Current number of entries per cache
    pub static ref CACHE_ENTRIES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("clusterlens_cache_entries", "Entries currently held by a cache"),
        &["cache"]
    ).expect("metric can be created");

    // ============================================================================
    // Decoding Metrics
    // ============================================================================

    /// Records that failed to decode and were skipped
    pub static ref DECODE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterlens_decode_errors_total", "Total records skipped on decode errors"),
        &["feed", "error_type"]
    ).expect("metric can be created");

    /// Coordination tree events received, by event kind
    pub static ref WATCH_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterlens_watch_events_total", "Total coordination tree events"),
        &["kind"]
    ).expect("metric can be created");

    // ============================================================================
    // Listener Metrics
    // ============================================================================

    /// Listener callbacks that returned an error or panicked
    pub static ref LISTENER_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clusterlens_listener_failures_total", "Total failed listener callbacks"),
        &["cache", "failure"] // error, panic
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(RECORDS_APPLIED_TOTAL.clone()))
            .expect("records_applied_total can be registered");
        REGISTRY
            .register(Box::new(BATCH_SIZE.clone()))
            .expect("batch_size can be registered");
        REGISTRY
            .register(Box::new(BATCHES_REJECTED_TOTAL.clone()))
            .expect("batches_rejected_total can be registered");
        REGISTRY
            .register(Box::new(APPLY_PANICS_TOTAL.clone()))
            .expect("apply_panics_total can be registered");
        REGISTRY
            .register(Box::new(CACHE_ENTRIES.clone()))
            .expect("cache_entries can be registered");
        REGISTRY
            .register(Box::new(DECODE_ERRORS_TOTAL.clone()))
            .expect("decode_errors_total can be registered");
        REGISTRY
            .register(Box::new(WATCH_EVENTS_TOTAL.clone()))
            .expect("watch_events_total can be registered");
        REGISTRY
            .register(Box::new(LISTENER_FAILURES_TOTAL.clone()))
            .expect("listener_failures_total can be registered");
    });
}
