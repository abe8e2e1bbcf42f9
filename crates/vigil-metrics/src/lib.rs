//! vigil-metrics — the metrics sink for Vigil health monitoring.
//!
//! Holds monotonic counters (one series per probe and result) and gauges
//! that are recomputed on demand, and renders both in the Prometheus text
//! exposition format.
//!
//! # Architecture
//!
//! ```text
//! MetricsRegistry
//!   ├── counter()        → Arc<Counter>, cached by the caller
//!   ├── register_gauge() ← closure evaluated at scrape time
//!   ├── snapshot()       → sorted Vec<MetricSample>
//!   └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod prometheus;
pub mod registry;

pub use prometheus::render_prometheus;
pub use registry::{Counter, MetricSample, MetricValue, MetricsRegistry, SeriesKey};
