//! Metrics registry — counters and gauges keyed by series.
//!
//! Counters are lock-free atomics handed out as `Arc<Counter>`, so the
//! hot path (one increment per probe execution) never touches the registry
//! map again. Gauges are closures evaluated only when a snapshot is taken.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge callback, evaluated at snapshot time.
pub type GaugeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Identifies one series: metric name plus label pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// The value carried by a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
}

/// A point-in-time reading of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSample {
    pub key: SeriesKey,
    pub value: MetricValue,
}

/// Concurrent registry of counters and gauges.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: DashMap<SeriesKey, Arc<Counter>>,
    gauges: DashMap<SeriesKey, GaugeFn>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the counter for a series.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Counter> {
        let key = SeriesKey::new(name, labels);
        self.counters
            .entry(key)
            .or_insert_with(|| Arc::new(Counter::new()))
            .value()
            .clone()
    }

    /// Register a gauge, replacing any gauge already registered for the series.
    pub fn register_gauge<F>(&self, name: &str, labels: &[(&str, &str)], f: F)
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        let key = SeriesKey::new(name, labels);
        if self.gauges.insert(key, Arc::new(f)).is_some() {
            debug!(%name, "gauge replaced");
        }
    }

    /// Remove a gauge. Returns whether one was registered.
    pub fn remove_gauge(&self, name: &str, labels: &[(&str, &str)]) -> bool {
        self.gauges.remove(&SeriesKey::new(name, labels)).is_some()
    }

    /// Read every series, sorted by key.
    ///
    /// Gauge closures are cloned out of the map before they run, so a gauge
    /// may safely read other concurrent structures.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = self
            .counters
            .iter()
            .map(|entry| MetricSample {
                key: entry.key().clone(),
                value: MetricValue::Counter(entry.value().get()),
            })
            .collect();

        let gauges: Vec<(SeriesKey, GaugeFn)> = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (key, gauge) in gauges {
            samples.push(MetricSample {
                key,
                value: MetricValue::Gauge(gauge()),
            });
        }

        samples.sort_by(|a, b| a.key.cmp(&b.key));
        samples
    }

    /// Render the current snapshot in Prometheus text format.
    pub fn render_prometheus(&self) -> String {
        crate::prometheus::render_prometheus(&self.snapshot())
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("counters", &self.counters.len())
            .field("gauges", &self.gauges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn counter_is_shared_per_series() {
        let registry = MetricsRegistry::new();
        let a = registry.counter("checks_total", &[("check", "db")]);
        let b = registry.counter("checks_total", &[("check", "db")]);
        a.inc();
        b.add(2);
        assert_eq!(a.get(), 3);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_labels_are_distinct_series() {
        let registry = MetricsRegistry::new();
        registry.counter("checks_total", &[("check", "db")]).inc();
        registry.counter("checks_total", &[("check", "cache")]);

        let samples = registry.snapshot();
        assert_eq!(samples.len(), 2);
        // Sorted by label value: cache < db.
        assert_eq!(samples[0].key.labels[0].1, "cache");
        assert_eq!(samples[0].value, MetricValue::Counter(0));
        assert_eq!(samples[1].value, MetricValue::Counter(1));
    }

    #[test]
    fn gauge_is_evaluated_at_snapshot_time() {
        let registry = MetricsRegistry::new();
        let source = Arc::new(AtomicI64::new(1));
        let reader = Arc::clone(&source);
        registry.register_gauge("in_flight", &[], move || reader.load(Ordering::Relaxed));

        assert_eq!(registry.snapshot()[0].value, MetricValue::Gauge(1));
        source.store(7, Ordering::Relaxed);
        assert_eq!(registry.snapshot()[0].value, MetricValue::Gauge(7));
    }

    #[test]
    fn remove_gauge() {
        let registry = MetricsRegistry::new();
        registry.register_gauge("g", &[], || 1);
        assert!(registry.remove_gauge("g", &[]));
        assert!(!registry.remove_gauge("g", &[]));
        assert!(registry.snapshot().is_empty());
    }
}
