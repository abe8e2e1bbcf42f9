//! Startup check that configuration and registration agree.

use std::collections::BTreeSet;

use tracing::{error, info};

use crate::error::{HealthError, HealthResult};

/// Compares configured probe names with registered ones.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    configured: BTreeSet<String>,
    registered: BTreeSet<String>,
}

impl ConfigValidator {
    pub fn new<C, R>(configured: C, registered: R) -> Self
    where
        C: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        Self {
            configured: configured.into_iter().collect(),
            registered: registered.into_iter().collect(),
        }
    }

    /// Configured names that were never registered, sorted.
    pub fn missing(&self) -> Vec<String> {
        self.configured.difference(&self.registered).cloned().collect()
    }

    /// Registered names without configuration, sorted.
    pub fn unconfigured(&self) -> Vec<String> {
        self.registered.difference(&self.configured).cloned().collect()
    }

    /// Fail if any configured probe is missing. Unconfigured registrations
    /// are only reported.
    pub fn validate(&self) -> HealthResult<()> {
        for name in self.unconfigured() {
            info!(%name, "health check is registered but not configured and will not be scheduled");
        }

        let missing = self.missing();
        if missing.is_empty() {
            return Ok(());
        }
        for name in &missing {
            error!(%name, "health check is configured but was never registered");
        }
        Err(HealthError::UnregisteredProbes(missing))
    }
}
