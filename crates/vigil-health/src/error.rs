//! Health monitor error types.

use thiserror::Error;

/// Errors raised while configuring or wiring the health monitor.
///
/// Probe failures are never surfaced here: a failing probe is an unhealthy
/// result, not an error.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("configured health checks were never registered: {}", .0.join(", "))]
    UnregisteredProbes(Vec<String>),

    #[error("health check already registered: {0}")]
    DuplicateProbe(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid health configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse health configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no tokio runtime available to schedule health checks")]
    NoRuntime,
}

pub type HealthResult<T> = Result<T, HealthError>;
