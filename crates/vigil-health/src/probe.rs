//! Probe identity, outcomes, and the user-supplied check function.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

/// Liveness or readiness classification of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Failing means the process should be restarted.
    Alive,
    /// Failing means the process should not receive traffic.
    #[default]
    Ready,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Alive => "alive",
            ProbeKind::Ready => "ready",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("alive") {
            Ok(ProbeKind::Alive)
        } else if s.eq_ignore_ascii_case("ready") {
            Ok(ProbeKind::Ready)
        } else {
            Err(format!("unknown probe kind: {s}"))
        }
    }
}

/// Result of a single probe execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy { reason: String },
}

impl ProbeOutcome {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        ProbeOutcome::Unhealthy {
            reason: reason.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// Boxed future returned by a probe.
pub type ProbeFuture = Pin<Box<dyn Future<Output = anyhow::Result<ProbeOutcome>> + Send>>;

/// A user-supplied health check.
///
/// An `Err` (or a panic while the future runs) counts as an unhealthy
/// result. Closures returning a future implement this trait directly.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> ProbeFuture;
}

impl<F, Fut> HealthProbe for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ProbeOutcome>> + Send + 'static,
{
    fn check(&self) -> ProbeFuture {
        Box::pin(self())
    }
}

/// Configured identity and schedule of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDefinition {
    pub name: String,
    pub critical: bool,
    pub kind: ProbeKind,
    pub initial_healthy: bool,
    pub schedule: Schedule,
}

impl ProbeDefinition {
    pub fn new(name: impl Into<String>, kind: ProbeKind) -> Self {
        Self {
            name: name.into(),
            critical: false,
            kind,
            initial_healthy: true,
            schedule: Schedule::default(),
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn initial_healthy(mut self, healthy: bool) -> Self {
        self.initial_healthy = healthy;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Alive probes are always critical.
    pub fn is_critical(&self) -> bool {
        self.kind == ProbeKind::Alive || self.critical
    }
}
