//! vigild configuration file.
//!
//! ```toml
//! [daemon]
//! connect_timeout = "2s"
//!
//! [health]
//! delayed_shutdown_handler_enabled = true
//!
//! [[health.checks]]
//! name = "postgres"
//! critical = true
//!
//! [targets]
//! postgres = "127.0.0.1:5432"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use vigil_health::{ConfigValidator, HealthSettings, duration};

fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSettings {
    /// Upper bound for one TCP connect attempt.
    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "duration::deserialize"
    )]
    pub connect_timeout: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub health: HealthSettings,
    /// Probe name → `host:port`.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.health.validate()?;
        Ok(config)
    }

    /// Check that every configured probe has a target, without starting it.
    pub fn validator(&self) -> ConfigValidator {
        ConfigValidator::new(
            self.health.checks.iter().map(|c| c.name.clone()),
            self.targets.keys().cloned(),
        )
    }
}
