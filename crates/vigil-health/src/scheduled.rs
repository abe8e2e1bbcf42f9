//! A registered probe bound to its schedule, hysteresis state, and counters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use vigil_metrics::{Counter, MetricsRegistry};

use crate::hysteresis::HysteresisState;
use crate::probe::{HealthProbe, ProbeDefinition, ProbeKind, ProbeOutcome};
use crate::schedule::Schedule;

/// Monotonic per-probe execution counters. Never reset.
#[derive(Debug, Clone)]
pub struct ProbeCounters {
    pub healthy: Arc<Counter>,
    pub unhealthy: Arc<Counter>,
}

impl ProbeCounters {
    /// Counters exported as `health_checks_total{check, result}`.
    pub fn registered(metrics: &MetricsRegistry, name: &str) -> Self {
        Self {
            healthy: metrics.counter(
                "health_checks_total",
                &[("check", name), ("result", "healthy")],
            ),
            unhealthy: metrics.counter(
                "health_checks_total",
                &[("check", name), ("result", "unhealthy")],
            ),
        }
    }

    /// Counters not attached to any registry.
    pub fn detached() -> Self {
        Self {
            healthy: Arc::new(Counter::new()),
            unhealthy: Arc::new(Counter::new()),
        }
    }
}

/// A probe's share of the process-wide aggregate.
#[derive(Debug, Default)]
pub(crate) struct AggregateSlot {
    /// Set once on unregister; later transitions are dropped.
    pub retired: bool,
    /// Whether this probe is counted as an unhealthy critical probe.
    pub counted: bool,
}

/// One probe as the scheduler sees it.
pub struct ScheduledProbe {
    name: String,
    kind: ProbeKind,
    critical: bool,
    initial_healthy: bool,
    schedule: Schedule,
    probe: Arc<dyn HealthProbe>,
    state: HysteresisState,
    counters: ProbeCounters,
    previously_recovered: AtomicBool,
    /// Held while a transition or unregister updates the aggregate.
    aggregate: Mutex<AggregateSlot>,
}

impl ScheduledProbe {
    pub fn new(
        definition: &ProbeDefinition,
        probe: Arc<dyn HealthProbe>,
        state: HysteresisState,
        counters: ProbeCounters,
    ) -> Self {
        Self {
            name: definition.name.clone(),
            kind: definition.kind,
            critical: definition.is_critical(),
            initial_healthy: definition.initial_healthy,
            schedule: definition.schedule.clone(),
            probe,
            state,
            counters,
            previously_recovered: AtomicBool::new(false),
            aggregate: Mutex::new(AggregateSlot::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    pub fn healthy_count(&self) -> u64 {
        self.counters.healthy.get()
    }

    pub fn unhealthy_count(&self) -> u64 {
        self.counters.unhealthy.get()
    }

    /// Total completed executions.
    pub fn executions(&self) -> u64 {
        self.healthy_count() + self.unhealthy_count()
    }

    /// Whether a probe that started unhealthy has produced a healthy result yet.
    pub fn previously_recovered(&self) -> bool {
        self.previously_recovered.load(Ordering::Acquire)
    }

    /// Whether the probe has been unregistered.
    pub fn is_retired(&self) -> bool {
        self.aggregate().retired
    }

    pub(crate) fn aggregate(&self) -> MutexGuard<'_, AggregateSlot> {
        self.aggregate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the probe once and feed the result into the hysteresis state.
    ///
    /// Errors and panics from the probe are recorded as unhealthy results;
    /// nothing propagates to the caller. Everything after the probe future
    /// resolves is synchronous, so a reschedule triggered by a transition
    /// never cancels this call half way.
    pub async fn tick(&self) {
        trace!(name = %self.name, "executing health check");

        match self.execute().await {
            ProbeOutcome::Healthy => {
                trace!(name = %self.name, result = "success", "health check result");
                self.counters.healthy.inc();
                self.state.success();

                if !self.initial_healthy && !self.previously_recovered.swap(true, Ordering::AcqRel) {
                    info!(name = %self.name, "health check passed for the first time since registration");
                }
            }
            ProbeOutcome::Unhealthy { reason } => {
                trace!(name = %self.name, result = "failure", %reason, "health check result");
                self.counters.unhealthy.inc();

                if !self.initial_healthy && !self.previously_recovered() {
                    debug!(name = %self.name, %reason, "health check has not passed since registration");
                } else if self.state.is_healthy() {
                    debug!(name = %self.name, %reason, "health check regressed after being healthy");
                }
                self.state.failure();
            }
        }
    }

    async fn execute(&self) -> ProbeOutcome {
        // Dropping the guard (timer cancelled mid-check) aborts the probe too.
        // `check` itself runs inside the task so a panic while building the
        // future is contained as well.
        let probe = Arc::clone(&self.probe);
        let mut task = AbortOnDrop(tokio::spawn(async move { probe.check().await }));

        match (&mut task.0).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(name = %self.name, error = %e, "health check failed exceptionally");
                ProbeOutcome::unhealthy(e.to_string())
            }
            Err(e) if e.is_panic() => {
                warn!(name = %self.name, "health check panicked");
                ProbeOutcome::unhealthy("health check panicked")
            }
            Err(_) => ProbeOutcome::unhealthy("health check cancelled"),
        }
    }
}

impl std::fmt::Debug for ScheduledProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledProbe")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("critical", &self.critical)
            .field("schedule", &self.schedule)
            .field("state", &self.state)
            .field("healthy_count", &self.healthy_count())
            .field("unhealthy_count", &self.unhealthy_count())
            .finish()
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
