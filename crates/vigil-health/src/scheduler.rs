//! Probe scheduler — one cancellable fixed-delay timer per probe name.
//!
//! Each timer is a background task that sleeps, runs one tick, and sleeps
//! again. The next delay is measured from the end of the previous tick, so
//! a slow probe never overlaps itself. Changing a probe's period replaces
//! its timer: the new task is spawned, then the old one is signalled and
//! aborted.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{HealthError, HealthResult};
use crate::scheduled::ScheduledProbe;

/// Per-probe timer state.
struct TimerSlot {
    /// Handle to the background timer task.
    handle: JoinHandle<()>,
    /// Stop signal checked before every tick.
    shutdown_tx: watch::Sender<bool>,
    /// Recurring delay between ticks.
    period: Duration,
}

impl TimerSlot {
    fn cancel(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

/// Owns the timers for every scheduled probe.
pub struct ProbeScheduler {
    runtime: Handle,
    /// Active timers: probe name → slot.
    timers: DashMap<String, TimerSlot>,
}

impl ProbeScheduler {
    /// Create a scheduler that spawns timers on the given runtime.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: DashMap::new(),
        }
    }

    /// Create a scheduler on the runtime of the calling context.
    pub fn current() -> HealthResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| HealthError::NoRuntime)
    }

    /// Schedule the first run after `initial_delay`, then repeat at the
    /// interval matching the probe's current health.
    pub fn schedule_initial(&self, probe: Arc<ScheduledProbe>) {
        let initial = probe.schedule().initial_delay();
        let period = probe.schedule().interval_for(probe.is_healthy());
        self.start(probe, initial, period);
    }

    /// Replace the probe's timer with one whose initial wait and period are
    /// both the interval for `healthy`.
    pub fn reschedule(&self, probe: Arc<ScheduledProbe>, healthy: bool) {
        let period = probe.schedule().interval_for(healthy);
        self.start(probe, period, period);
    }

    /// Cancel and forget the timer for `name`. No-op if none exists.
    pub fn unschedule(&self, name: &str) {
        if let Some((_, slot)) = self.timers.remove(name) {
            slot.cancel();
            info!(%name, "health check unscheduled");
        }
    }

    /// Cancel every timer.
    pub fn unschedule_all(&self) {
        let names: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, slot)) = self.timers.remove(&name) {
                slot.cancel();
                debug!(%name, "health check unscheduled");
            }
        }
    }

    /// Recurring delay currently used for `name`.
    pub fn current_delay(&self, name: &str) -> Option<Duration> {
        self.timers.get(name).map(|slot| slot.period)
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    /// Names with an active timer, sorted.
    pub fn scheduled(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn start(&self, probe: Arc<ScheduledProbe>, initial: Duration, period: Duration) {
        let name = probe.name().to_string();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Spawn while holding the entry: a zero-delay first tick that
        // reschedules from inside the new task waits for this insert, so its
        // newer slot is never overwritten by this one.
        let old = match self.timers.entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                let handle = self.runtime.spawn(run_timer(probe, initial, period, shutdown_rx));
                Some(entry.insert(TimerSlot {
                    handle,
                    shutdown_tx,
                    period,
                }))
            }
            Entry::Vacant(entry) => {
                let handle = self.runtime.spawn(run_timer(probe, initial, period, shutdown_rx));
                entry.insert(TimerSlot {
                    handle,
                    shutdown_tx,
                    period,
                });
                None
            }
        };
        if let Some(old) = old {
            old.cancel();
        }

        debug!(%name, initial_ms = initial.as_millis() as u64, period_ms = period.as_millis() as u64, "health check scheduled");
    }
}

impl Drop for ProbeScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            let _ = entry.value().shutdown_tx.send(true);
            entry.value().handle.abort();
        }
    }
}

/// Timer loop for one probe.
async fn run_timer(
    probe: Arc<ScheduledProbe>,
    initial: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = initial;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        // A tick may have replaced this timer from inside its own transition.
        if *shutdown.borrow() {
            break;
        }
        probe.tick().await;
        delay = period;
    }
    debug!(name = %probe.name(), "health check timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hysteresis::{HysteresisState, StateListener};
    use crate::probe::{HealthProbe, ProbeDefinition, ProbeKind, ProbeOutcome};
    use crate::scheduled::ProbeCounters;
    use crate::schedule::Schedule;
    use std::sync::Weak;

    struct Ignore;

    impl StateListener for Ignore {
        fn on_state_changed(&self, _name: &str, _healthy: bool) {}
    }

    fn test_probe(name: &str, initial_healthy: bool) -> Arc<ScheduledProbe> {
        let schedule = Schedule {
            initial_delay: Some(Duration::from_millis(5)),
            check_interval: Duration::from_millis(10),
            downtime_interval: Duration::from_millis(50),
            ..Schedule::default()
        };
        let def = ProbeDefinition::new(name, ProbeKind::Ready)
            .initial_healthy(initial_healthy)
            .schedule(schedule);
        let probe: Arc<dyn HealthProbe> =
            Arc::new(|| async { Ok::<_, anyhow::Error>(ProbeOutcome::Healthy) });
        let state = HysteresisState::new(name, 3, 2, initial_healthy, Weak::<Ignore>::new());
        Arc::new(ScheduledProbe::new(&def, probe, state, ProbeCounters::detached()))
    }

    #[tokio::test(start_paused = true)]
    async fn initial_schedule_uses_health_for_period() {
        let scheduler = ProbeScheduler::current().unwrap();

        scheduler.schedule_initial(test_probe("up", true));
        scheduler.schedule_initial(test_probe("down", false));

        assert_eq!(scheduler.current_delay("up"), Some(Duration::from_millis(10)));
        assert_eq!(scheduler.current_delay("down"), Some(Duration::from_millis(50)));
        assert_eq!(scheduler.scheduled(), vec!["down".to_string(), "up".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_with_fixed_delay() {
        let scheduler = ProbeScheduler::current().unwrap();
        let probe = test_probe("db", true);
        scheduler.schedule_initial(Arc::clone(&probe));

        // First run at 5ms, then 15ms, 25ms, 35ms.
        tokio::time::sleep(Duration::from_millis(36)).await;
        assert_eq!(probe.executions(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_timer() {
        let scheduler = ProbeScheduler::current().unwrap();
        let probe = test_probe("db", true);
        scheduler.schedule_initial(Arc::clone(&probe));

        scheduler.reschedule(Arc::clone(&probe), false);
        assert_eq!(scheduler.current_delay("db"), Some(Duration::from_millis(50)));
        assert_eq!(scheduler.scheduled().len(), 1);

        // The old 5ms/10ms timer is gone; the first run now waits 50ms.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(probe.executions(), 0);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(probe.executions(), 1);

        scheduler.reschedule(Arc::clone(&probe), true);
        assert_eq!(scheduler.current_delay("db"), Some(Duration::from_millis(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_stops_ticking() {
        let scheduler = ProbeScheduler::current().unwrap();
        let probe = test_probe("db", true);
        scheduler.schedule_initial(Arc::clone(&probe));

        tokio::time::sleep(Duration::from_millis(6)).await;
        assert_eq!(probe.executions(), 1);

        scheduler.unschedule("db");
        assert!(!scheduler.is_scheduled("db"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(probe.executions(), 1);
    }

    #[tokio::test]
    async fn unschedule_unknown_is_noop() {
        let scheduler = ProbeScheduler::current().unwrap();
        scheduler.unschedule("missing");
        assert!(scheduler.scheduled().is_empty());
    }

    #[test]
    fn current_without_runtime_fails() {
        assert!(matches!(ProbeScheduler::current(), Err(HealthError::NoRuntime)));
    }
}
