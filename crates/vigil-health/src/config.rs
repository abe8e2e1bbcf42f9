//! Health configuration — the `[health]` table of a TOML file.
//!
//! ```toml
//! [health]
//! name = "orders"
//! delayed_shutdown_handler_enabled = true
//! shutdown_wait_period = "15s"
//!
//! [[health.checks]]
//! name = "postgres"
//! type = "ready"
//! critical = true
//! schedule = { check_interval = "5s", downtime_interval = "30s" }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::duration;
use crate::error::{HealthError, HealthResult};
use crate::monitor::{HealthMonitor, HealthMonitorBuilder};
use crate::probe::{ProbeDefinition, ProbeKind};
use crate::schedule::Schedule;

fn default_true() -> bool {
    true
}

fn default_shutdown_wait() -> Duration {
    Duration::from_secs(15)
}

/// One configured probe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ProbeKind,
    #[serde(default)]
    pub critical: bool,
    /// Health assumed before the first result.
    #[serde(default = "default_true")]
    pub initial_state: bool,
    #[serde(default)]
    pub schedule: Schedule,
}

impl ProbeConfig {
    pub fn definition(&self) -> ProbeDefinition {
        ProbeDefinition::new(&self.name, self.kind)
            .critical(self.critical)
            .initial_healthy(self.initial_state)
            .schedule(self.schedule.clone())
    }
}

/// Monitor-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Suffix for the probe worker thread name.
    #[serde(default)]
    pub name: Option<String>,
    /// Readiness before any probe has reported.
    #[serde(default = "default_true")]
    pub initial_overall_state: bool,
    #[serde(default)]
    pub delayed_shutdown_handler_enabled: bool,
    #[serde(
        default = "default_shutdown_wait",
        deserialize_with = "duration::deserialize"
    )]
    pub shutdown_wait_period: Duration,
    #[serde(default)]
    pub checks: Vec<ProbeConfig>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            initial_overall_state: true,
            delayed_shutdown_handler_enabled: false,
            shutdown_wait_period: default_shutdown_wait(),
            checks: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    health: HealthSettings,
}

impl HealthSettings {
    /// Read the `[health]` table from a TOML file and validate it.
    pub fn from_file(path: &Path) -> HealthResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse the `[health]` table from a TOML document and validate it.
    /// Other tables are ignored.
    pub fn from_toml_str(content: &str) -> HealthResult<Self> {
        let document: Document = toml::from_str(content)?;
        document.health.validate()?;
        Ok(document.health)
    }

    pub fn validate(&self) -> HealthResult<()> {
        let mut seen = HashSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(HealthError::InvalidConfig(
                    "health check name must not be empty".into(),
                ));
            }
            if !seen.insert(check.name.as_str()) {
                return Err(HealthError::DuplicateProbe(check.name.clone()));
            }
            if check.schedule.check_interval.is_zero() {
                return Err(HealthError::InvalidConfig(format!(
                    "{}: check_interval must be greater than zero",
                    check.name
                )));
            }
            if check.schedule.downtime_interval.is_zero() {
                return Err(HealthError::InvalidConfig(format!(
                    "{}: downtime_interval must be greater than zero",
                    check.name
                )));
            }
        }
        Ok(())
    }

    pub fn definitions(&self) -> Vec<ProbeDefinition> {
        self.checks.iter().map(ProbeConfig::definition).collect()
    }

    /// Whether the drain hook should be installed.
    pub fn delayed_shutdown_enabled(&self) -> bool {
        self.delayed_shutdown_handler_enabled && !self.shutdown_wait_period.is_zero()
    }

    /// Name for the probe worker threads.
    pub fn thread_name(&self) -> String {
        match &self.name {
            Some(name) => format!("health-check-{name}"),
            None => "health-check".to_string(),
        }
    }

    /// One worker per configured check.
    pub fn worker_threads(&self) -> usize {
        self.checks.len().max(1)
    }

    /// Monitor builder preloaded with these settings.
    pub fn monitor_builder(&self) -> HealthMonitorBuilder {
        HealthMonitor::builder()
            .definitions(self.definitions())
            .initial_overall_state(self.initial_overall_state)
            .shutdown_wait(self.shutdown_wait_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[health]
name = "orders"
initial_overall_state = false
delayed_shutdown_handler_enabled = true
shutdown_wait_period = "20s"

[[health.checks]]
name = "postgres"
critical = true
schedule = { check_interval = "2s", downtime_interval = "1m", failure_attempts = 1 }

[[health.checks]]
name = "heartbeat"
type = "alive"
initial_state = false

[targets]
postgres = "127.0.0.1:5432"
"#;

    #[test]
    fn parses_full_document() {
        let settings = HealthSettings::from_toml_str(SAMPLE).unwrap();

        assert!(settings.enabled);
        assert!(!settings.initial_overall_state);
        assert!(settings.delayed_shutdown_enabled());
        assert_eq!(settings.shutdown_wait_period, Duration::from_secs(20));
        assert_eq!(settings.thread_name(), "health-check-orders");
        assert_eq!(settings.worker_threads(), 2);

        let postgres = &settings.checks[0];
        assert_eq!(postgres.kind, ProbeKind::Ready);
        assert!(postgres.critical);
        assert!(postgres.initial_state);
        assert_eq!(postgres.schedule.check_interval, Duration::from_secs(2));
        assert_eq!(postgres.schedule.downtime_interval, Duration::from_secs(60));
        assert_eq!(postgres.schedule.failure_attempts, 1);
        assert_eq!(postgres.schedule.success_attempts, 2);

        let heartbeat = settings.definitions().remove(1);
        assert_eq!(heartbeat.kind, ProbeKind::Alive);
        assert!(heartbeat.is_critical());
        assert!(!heartbeat.initial_healthy);
        assert_eq!(heartbeat.schedule, Schedule::default());
    }

    #[test]
    fn missing_table_uses_defaults() {
        let settings = HealthSettings::from_toml_str("").unwrap();
        assert_eq!(settings, HealthSettings::default());
        assert!(!settings.delayed_shutdown_enabled());
        assert_eq!(settings.thread_name(), "health-check");
        assert_eq!(settings.worker_threads(), 1);
    }

    #[test]
    fn zero_wait_disables_delayed_shutdown() {
        let settings = HealthSettings::from_toml_str(
            "[health]\ndelayed_shutdown_handler_enabled = true\nshutdown_wait_period = 0\n",
        )
        .unwrap();
        assert!(!settings.delayed_shutdown_enabled());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = HealthSettings::from_toml_str(
            "[[health.checks]]\nname = \"db\"\n[[health.checks]]\nname = \"db\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, HealthError::DuplicateProbe(name) if name == "db"));
    }

    #[test]
    fn rejects_empty_name_and_zero_interval() {
        assert!(matches!(
            HealthSettings::from_toml_str("[[health.checks]]\nname = \" \"\n"),
            Err(HealthError::InvalidConfig(_))
        ));
        assert!(matches!(
            HealthSettings::from_toml_str(
                "[[health.checks]]\nname = \"db\"\nschedule = { check_interval = \"0s\" }\n"
            ),
            Err(HealthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_durations() {
        assert!(matches!(
            HealthSettings::from_toml_str("[health]\nbogus = 1\n"),
            Err(HealthError::ConfigParse(_))
        ));
        assert!(matches!(
            HealthSettings::from_toml_str("[health]\nshutdown_wait_period = \"soon\"\n"),
            Err(HealthError::ConfigParse(_))
        ));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = HealthSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.checks.len(), 2);

        let missing = HealthSettings::from_file(Path::new("/nonexistent/vigil.toml"));
        assert!(matches!(missing, Err(HealthError::Io(_))));
    }

    #[tokio::test]
    async fn monitor_builder_carries_settings() {
        let settings = HealthSettings::from_toml_str(SAMPLE).unwrap();
        let monitor = settings.monitor_builder().build().unwrap();

        assert_eq!(monitor.shutdown_wait(), Duration::from_secs(20));
        assert!(!monitor.is_ready());
        assert_eq!(
            monitor.configured_names().into_iter().collect::<Vec<_>>(),
            vec!["heartbeat".to_string(), "postgres".to_string()]
        );
    }
}
