//! clusterlens Observability
//!
//! Metrics and logging for the metadata caches.
//!
//! # Features
//!
//! - Prometheus counters, gauges and histograms for ingestion, decoding and
//!   listener dispatch
//! - Text export of the registry for scraping or dumping from the CLI
//! - `tracing` subscriber setup driven by `RUST_LOG`
//!
//! # Usage
//!
//! ```no_run
//! use clusterlens_observability::{init, exporter};
//!
//! init("info");
//! println!("{}", exporter::gather_text());
//! ```

pub mod exporter;
pub mod logging;
pub mod metrics;

pub use exporter::gather_text;
pub use logging::init_tracing;
pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize metrics and logging. `default_filter` applies when `RUST_LOG`
/// is unset.
pub fn init(default_filter: &str) {
    metrics::init();
    logging::init_tracing(default_filter);
}
