//! Health monitor — aggregates probe transitions into liveness and readiness.
//!
//! The `HealthMonitor` owns every registered `ScheduledProbe` and the
//! `ProbeScheduler` that fires them. Probe transitions call back into the
//! monitor, which updates the process-wide signals and switches the probe
//! between its check and downtime intervals.
//!
//! # Aggregation
//!
//! ```text
//! alive = no critical alive probe is unhealthy
//! ready = no critical ready probe is unhealthy
//!         (pinned false once shutdown has started)
//! ```
//!
//! Counters and flags are atomics. A transition touches one counter and
//! recomputes one flag, so readers never contend with probe timers.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use vigil_metrics::MetricsRegistry;

use crate::error::{HealthError, HealthResult};
use crate::hysteresis::{HysteresisState, StateListener};
use crate::listener::{HealthStateListener, guarded};
use crate::probe::{HealthProbe, ProbeDefinition, ProbeKind};
use crate::scheduled::{AggregateSlot, ProbeCounters, ScheduledProbe};
use crate::scheduler::ProbeScheduler;
use crate::validator::ConfigValidator;

const AGGREGATE_HEALTHY: &str = "health_aggregate_healthy";
const AGGREGATE_UNHEALTHY: &str = "health_aggregate_unhealthy";

/// Read-only snapshot of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthView {
    pub name: String,
    pub healthy: bool,
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    pub critical: bool,
}

/// Process-wide signals.
struct AppHealth {
    alive: AtomicBool,
    ready: AtomicBool,
    unhealthy_critical_alive: AtomicI64,
    unhealthy_critical_ready: AtomicI64,
    shutting_down: AtomicBool,
}

impl AppHealth {
    fn new(initial_ready: bool) -> Self {
        Self {
            alive: AtomicBool::new(true),
            ready: AtomicBool::new(initial_ready),
            unhealthy_critical_alive: AtomicI64::new(0),
            unhealthy_critical_ready: AtomicI64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

/// Adjust an unhealthy-critical counter and recompute its flag.
fn apply(counter: &AtomicI64, flag: &AtomicBool, healthy: bool) -> i64 {
    let count = if healthy {
        counter.fetch_sub(1, Ordering::AcqRel) - 1
    } else {
        counter.fetch_add(1, Ordering::AcqRel) + 1
    };
    flag.store(count == 0, Ordering::Release);
    count
}

struct MonitorInner {
    definitions: HashMap<String, ProbeDefinition>,
    probes: DashMap<String, Arc<ScheduledProbe>>,
    /// Registered names with no configuration.
    unconfigured: DashSet<String>,
    scheduler: ProbeScheduler,
    metrics: Arc<MetricsRegistry>,
    listeners: Vec<Arc<dyn HealthStateListener>>,
    shutdown_wait: Duration,
    health: AppHealth,
}

impl MonitorInner {
    fn probe(&self, name: &str) -> Option<Arc<ScheduledProbe>> {
        self.probes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn is_healthy(&self) -> bool {
        self.health.is_alive() && self.health.is_ready()
    }

    fn count(&self, healthy: bool) -> i64 {
        self.probes
            .iter()
            .filter(|entry| entry.value().is_healthy() == healthy)
            .count() as i64
    }

    fn critical_change(&self, probe: &ScheduledProbe, slot: &mut AggregateSlot, healthy: bool) {
        let name = probe.name();
        let health = &self.health;

        // Already reflected in the counter: released twice or counted twice.
        if healthy != slot.counted {
            return;
        }

        let (counter, flag) = match probe.kind() {
            ProbeKind::Alive => (&health.unhealthy_critical_alive, &health.alive),
            ProbeKind::Ready if healthy && health.is_shutting_down() => {
                info!(%name, "status change is ignored during shutdown");
                return;
            }
            ProbeKind::Ready => (&health.unhealthy_critical_ready, &health.ready),
        };
        let count = apply(counter, flag, healthy);
        slot.counted = !healthy;

        if healthy {
            info!(%name, kind = %probe.kind(), unhealthy_critical = count, "a critical dependency is now healthy");
        } else {
            error!(%name, kind = %probe.kind(), unhealthy_critical = count, "a critical dependency is now unhealthy");
        }
    }

    /// Apply a transition to the aggregate and switch the probe's interval.
    /// Returns false if the probe was unregistered in the meantime.
    fn transition(&self, probe: &Arc<ScheduledProbe>, healthy: bool) -> bool {
        let mut slot = probe.aggregate();
        if slot.retired {
            debug!(name = %probe.name(), healthy, "state change after unregister ignored");
            return false;
        }

        if probe.is_critical() {
            self.critical_change(probe, &mut slot, healthy);
        } else {
            self.non_critical_change(probe, healthy);
        }
        self.scheduler.reschedule(Arc::clone(probe), healthy);
        true
    }

    fn non_critical_change(&self, probe: &ScheduledProbe, healthy: bool) {
        let name = probe.name();
        if !healthy {
            warn!(%name, "a non-critical dependency is now unhealthy");
            return;
        }

        info!(%name, "a non-critical dependency is now healthy");
        if self.health.is_shutting_down() || self.is_healthy() {
            return;
        }

        let criticals_healthy = self
            .probes
            .iter()
            .filter(|entry| entry.value().is_critical())
            .all(|entry| entry.value().is_healthy());
        if criticals_healthy
            && self
                .health
                .ready
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            info!(%name, "readiness restored after non-critical dependency recovered");
        }
    }
}

impl StateListener for MonitorInner {
    fn on_healthy_observation(&self, name: &str) {
        for listener in &self.listeners {
            guarded("on_healthy_check", name, || listener.on_healthy_check(name));
        }
    }

    fn on_unhealthy_observation(&self, name: &str) {
        for listener in &self.listeners {
            guarded("on_unhealthy_check", name, || listener.on_unhealthy_check(name));
        }
    }

    fn on_state_changed(&self, name: &str, healthy: bool) {
        let Some(probe) = self.probe(name) else {
            error!(%name, healthy, "state change reported for a health check that is not registered");
            return;
        };

        if !self.transition(&probe, healthy) {
            return;
        }

        for listener in &self.listeners {
            guarded("on_state_changed", name, || listener.on_state_changed(name, healthy));
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.metrics.remove_gauge(AGGREGATE_HEALTHY, &[]);
        self.metrics.remove_gauge(AGGREGATE_UNHEALTHY, &[]);
        self.scheduler.unschedule_all();
    }
}

/// Builder for a `HealthMonitor`.
pub struct HealthMonitorBuilder {
    definitions: Vec<ProbeDefinition>,
    initial_overall_state: bool,
    shutdown_wait: Duration,
    listeners: Vec<Arc<dyn HealthStateListener>>,
    metrics: Option<Arc<MetricsRegistry>>,
    runtime: Option<Handle>,
}

impl Default for HealthMonitorBuilder {
    fn default() -> Self {
        Self {
            definitions: Vec::new(),
            initial_overall_state: true,
            shutdown_wait: Duration::from_secs(15),
            listeners: Vec::new(),
            metrics: None,
            runtime: None,
        }
    }
}

impl HealthMonitorBuilder {
    /// Configure a probe. Only configured names are scheduled on `register`.
    pub fn definition(mut self, definition: ProbeDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn definitions(mut self, definitions: impl IntoIterator<Item = ProbeDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    /// Initial value of the `ready` signal.
    pub fn initial_overall_state(mut self, ready: bool) -> Self {
        self.initial_overall_state = ready;
        self
    }

    /// Grace period held by `notify_shutdown_started`.
    pub fn shutdown_wait(mut self, wait: Duration) -> Self {
        self.shutdown_wait = wait;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn HealthStateListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Registry receiving per-probe counters and aggregate gauges.
    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runtime for probe timers. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> HealthResult<HealthMonitor> {
        let scheduler = match self.runtime {
            Some(handle) => ProbeScheduler::new(handle),
            None => ProbeScheduler::current()?,
        };

        let mut definitions = HashMap::with_capacity(self.definitions.len());
        for definition in self.definitions {
            let name = definition.name.clone();
            if definitions.insert(name.clone(), definition).is_some() {
                return Err(HealthError::DuplicateProbe(name));
            }
        }

        let metrics = self.metrics.unwrap_or_default();
        let inner = Arc::new(MonitorInner {
            definitions,
            probes: DashMap::new(),
            unconfigured: DashSet::new(),
            scheduler,
            metrics: Arc::clone(&metrics),
            listeners: self.listeners,
            shutdown_wait: self.shutdown_wait,
            health: AppHealth::new(self.initial_overall_state),
        });

        for (gauge, healthy) in [(AGGREGATE_HEALTHY, true), (AGGREGATE_UNHEALTHY, false)] {
            let weak = Arc::downgrade(&inner);
            metrics.register_gauge(gauge, &[], move || {
                weak.upgrade().map_or(0, |inner| inner.count(healthy))
            });
        }

        debug!(
            configured = inner.definitions.len(),
            ready = self.initial_overall_state,
            "health monitor created"
        );
        Ok(HealthMonitor { inner })
    }
}

/// Aggregates registered probes into liveness and readiness.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl HealthMonitor {
    pub fn builder() -> HealthMonitorBuilder {
        HealthMonitorBuilder::default()
    }

    /// Register a probe under a configured name and schedule it.
    ///
    /// A name without configuration is remembered but never scheduled. A
    /// name that is already registered is left untouched.
    pub fn register(&self, name: &str, probe: Arc<dyn HealthProbe>) {
        let inner = &self.inner;
        let Some(definition) = inner.definitions.get(name) else {
            debug!(%name, "no configuration for health check, registration ignored");
            inner.unconfigured.insert(name.to_string());
            return;
        };

        let weak: Weak<MonitorInner> = Arc::downgrade(inner);
        let listener: Weak<dyn StateListener> = weak;
        let state = HysteresisState::new(
            name,
            definition.schedule.failure_attempts,
            definition.schedule.success_attempts,
            definition.initial_healthy,
            listener,
        );
        let counters = ProbeCounters::registered(&inner.metrics, name);
        let scheduled = Arc::new(ScheduledProbe::new(definition, probe, state, counters));

        match inner.probes.entry(name.to_string()) {
            Entry::Occupied(_) => {
                warn!(%name, "health check already registered, ignoring");
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&scheduled));
            }
        }

        // Seed the aggregate for a critical probe that starts out failing.
        if scheduled.is_critical() && !definition.initial_healthy {
            inner.critical_change(&scheduled, &mut scheduled.aggregate(), false);
        }

        info!(
            %name,
            kind = %scheduled.kind(),
            critical = scheduled.is_critical(),
            initial_healthy = definition.initial_healthy,
            "health check registered"
        );
        inner.scheduler.schedule_initial(scheduled);
    }

    /// Cancel and remove a probe. Returns whether it was registered.
    ///
    /// An unhealthy critical probe releases its hold on the aggregate.
    pub fn unregister(&self, name: &str) -> bool {
        let inner = &self.inner;
        inner.unconfigured.remove(name);

        let Some((_, probe)) = inner.probes.remove(name) else {
            inner.scheduler.unschedule(name);
            debug!(%name, "unregister of unknown health check ignored");
            return false;
        };

        // A transition in flight either finished (and its timer is removed
        // here) or sees `retired` and drops itself.
        let mut slot = probe.aggregate();
        slot.retired = true;
        inner.scheduler.unschedule(name);
        if probe.is_critical() {
            inner.critical_change(&probe, &mut slot, true);
        }
        drop(slot);

        info!(%name, "health check unregistered");
        true
    }

    /// `alive && ready`.
    pub fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    /// Liveness for `"alive"` (any case), otherwise overall health.
    pub fn is_healthy_for(&self, kind: Option<&str>) -> bool {
        match kind {
            Some(k) if k.eq_ignore_ascii_case(ProbeKind::Alive.as_str()) => {
                self.inner.health.is_alive()
            }
            _ => self.is_healthy(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.health.is_alive()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.health.is_ready()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.health.is_shutting_down()
    }

    /// Pin readiness to false and hold the caller for the shutdown wait.
    ///
    /// Probes keep running during the wait.
    pub async fn notify_shutdown_started(&self) {
        let health = &self.inner.health;
        health.shutting_down.store(true, Ordering::Release);
        health.ready.store(false, Ordering::Release);

        let wait = self.inner.shutdown_wait;
        info!(wait_ms = wait.as_millis() as u64, "delayed shutdown: started");
        tokio::time::sleep(wait).await;
        info!("delayed shutdown: finished");
    }

    /// Snapshot of every registered probe, sorted by name.
    pub fn health_views(&self) -> Vec<HealthView> {
        let mut views: Vec<HealthView> = self
            .inner
            .probes
            .iter()
            .map(|entry| view(entry.value()))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    pub fn health_view(&self, name: &str) -> Option<HealthView> {
        self.inner.probe(name).map(|probe| view(&probe))
    }

    /// Registered and scheduled probe names, sorted.
    pub fn probe_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.probes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Every name passed to `register`, with or without configuration.
    pub fn registered_names(&self) -> BTreeSet<String> {
        self.inner
            .probes
            .iter()
            .map(|e| e.key().clone())
            .chain(self.inner.unconfigured.iter().map(|e| e.key().clone()))
            .collect()
    }

    pub fn configured_names(&self) -> BTreeSet<String> {
        self.inner.definitions.keys().cloned().collect()
    }

    /// Check that every configured probe has been registered.
    pub fn validate(&self) -> HealthResult<()> {
        ConfigValidator::new(self.configured_names(), self.registered_names()).validate()
    }

    pub fn probe(&self, name: &str) -> Option<Arc<ScheduledProbe>> {
        self.inner.probe(name)
    }

    pub fn scheduler(&self) -> &ProbeScheduler {
        &self.inner.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    pub fn shutdown_wait(&self) -> Duration {
        self.inner.shutdown_wait
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("alive", &self.is_alive())
            .field("ready", &self.is_ready())
            .field("shutting_down", &self.is_shutting_down())
            .field("probes", &self.probe_names())
            .finish()
    }
}

fn view(probe: &ScheduledProbe) -> HealthView {
    HealthView {
        name: probe.name().to_string(),
        healthy: probe.is_healthy(),
        kind: probe.kind(),
        critical: probe.is_critical(),
    }
}
