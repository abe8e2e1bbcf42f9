//! Prometheus text exposition format.
//!
//! Renders registry samples for scraping by a Prometheus server or a
//! compatible agent.

use std::fmt::Write;

use crate::registry::{MetricSample, MetricValue};

/// Render samples into Prometheus text format.
///
/// Samples must be sorted by key (as `MetricsRegistry::snapshot` returns
/// them) so each metric name gets exactly one `# TYPE` line.
pub fn render_prometheus(samples: &[MetricSample]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;

    for sample in samples {
        let name = sample.key.name.as_str();
        if current != Some(name) {
            let kind = match sample.value {
                MetricValue::Counter(_) => "counter",
                MetricValue::Gauge(_) => "gauge",
            };
            let _ = writeln!(out, "# TYPE {name} {kind}");
            current = Some(name);
        }

        out.push_str(name);
        if !sample.key.labels.is_empty() {
            let labels: Vec<String> = sample
                .key
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
                .collect();
            let _ = write!(out, "{{{}}}", labels.join(","));
        }
        match sample.value {
            MetricValue::Counter(v) => {
                let _ = writeln!(out, " {v}");
            }
            MetricValue::Gauge(v) => {
                let _ = writeln!(out, " {v}");
            }
        }
    }

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
