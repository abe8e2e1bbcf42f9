//! Per-probe hysteresis state machine.
//!
//! # State Transitions
//! ```text
//! Healthy   → Unhealthy: failure_attempts failures since the last flip
//! Unhealthy → Healthy:   success_attempts successes since the last flip
//! ```
//!
//! A result that agrees with the current state is ignored entirely: it
//! neither resets nor advances the streak. The counter therefore measures
//! contrary results *since the last flip*, not a strictly consecutive run.
//! Starting healthy with `failure_attempts = 3`, the sequence
//! `failure, failure, success, failure` flips on the last call.

use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{debug, warn};

/// Receives observations and transitions from a `HysteresisState`.
pub trait StateListener: Send + Sync {
    /// A healthy result was observed while the state is unhealthy.
    fn on_healthy_observation(&self, _name: &str) {}

    /// An unhealthy result was observed while the state is healthy.
    fn on_unhealthy_observation(&self, _name: &str) {}

    /// The damped health flipped.
    fn on_state_changed(&self, name: &str, healthy: bool);
}

/// Damped health signal for one probe.
///
/// Only the owning probe's ticks mutate it, and those never overlap, so
/// atomics are used for visibility to readers rather than for contention.
pub struct HysteresisState {
    name: String,
    failure_attempts: u32,
    success_attempts: u32,
    streak: AtomicU32,
    healthy: AtomicBool,
    listener: Weak<dyn StateListener>,
}

impl HysteresisState {
    pub fn new(
        name: impl Into<String>,
        failure_attempts: u32,
        success_attempts: u32,
        initial_healthy: bool,
        listener: Weak<dyn StateListener>,
    ) -> Self {
        Self {
            name: name.into(),
            failure_attempts,
            success_attempts,
            streak: AtomicU32::new(0),
            healthy: AtomicBool::new(initial_healthy),
            listener,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Contrary results counted since the last flip.
    pub fn streak(&self) -> u32 {
        self.streak.load(Ordering::Acquire)
    }

    /// Record a healthy result.
    pub fn success(&self) {
        if self.is_healthy() {
            return;
        }
        if let Some(listener) = self.listener.upgrade() {
            listener.on_healthy_observation(&self.name);
        }
        self.advance(true, self.success_attempts);
    }

    /// Record an unhealthy result.
    pub fn failure(&self) {
        if !self.is_healthy() {
            return;
        }
        if let Some(listener) = self.listener.upgrade() {
            listener.on_unhealthy_observation(&self.name);
        }
        self.advance(false, self.failure_attempts);
    }

    fn advance(&self, towards: bool, threshold: u32) {
        let streak = self.streak.fetch_add(1, Ordering::AcqRel) + 1;
        if streak < threshold {
            debug!(name = %self.name, streak, threshold, healthy = !towards, "hysteresis streak advanced");
            return;
        }

        self.healthy.store(towards, Ordering::Release);
        self.streak.store(0, Ordering::Release);
        debug!(name = %self.name, healthy = towards, "hysteresis state flipped");

        match self.listener.upgrade() {
            Some(listener) => listener.on_state_changed(&self.name, towards),
            None => warn!(name = %self.name, "state changed with no listener attached"),
        }
    }
}

impl std::fmt::Debug for HysteresisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HysteresisState")
            .field("name", &self.name)
            .field("failure_attempts", &self.failure_attempts)
            .field("success_attempts", &self.success_attempts)
            .field("streak", &self.streak())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        transitions: Mutex<Vec<bool>>,
        healthy_observations: Mutex<u32>,
        unhealthy_observations: Mutex<u32>,
    }

    impl StateListener for Recorder {
        fn on_healthy_observation(&self, _name: &str) {
            *self.healthy_observations.lock().unwrap() += 1;
        }

        fn on_unhealthy_observation(&self, _name: &str) {
            *self.unhealthy_observations.lock().unwrap() += 1;
        }

        fn on_state_changed(&self, _name: &str, healthy: bool) {
            self.transitions.lock().unwrap().push(healthy);
        }
    }

    impl Recorder {
        fn transitions(&self) -> Vec<bool> {
            self.transitions.lock().unwrap().clone()
        }
    }

    fn state(
        failure_attempts: u32,
        success_attempts: u32,
        initial: bool,
    ) -> (HysteresisState, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let listener: Weak<dyn StateListener> = Arc::downgrade(&recorder) as Weak<dyn StateListener>;
        let state = HysteresisState::new("test", failure_attempts, success_attempts, initial, listener);
        (state, recorder)
    }

    #[test]
    fn single_failure_below_threshold_does_not_flip() {
        let (state, recorder) = state(2, 1, true);
        state.failure();

        assert!(state.is_healthy());
        assert!(recorder.transitions().is_empty());
        assert_eq!(state.streak(), 1);
    }

    #[test]
    fn single_failure_at_threshold_flips() {
        let (state, recorder) = state(1, 1, true);
        state.failure();

        assert!(!state.is_healthy());
        assert_eq!(recorder.transitions(), vec![false]);
        assert_eq!(state.streak(), 0);
    }

    #[test]
    fn single_success_below_threshold_does_not_flip() {
        let (state, recorder) = state(1, 2, false);
        state.success();

        assert!(!state.is_healthy());
        assert!(recorder.transitions().is_empty());
    }

    #[test]
    fn recovery_fires_transition_exactly_once() {
        let (state, recorder) = state(1, 1, false);
        state.success();

        assert!(state.is_healthy());
        assert_eq!(recorder.transitions(), vec![true]);

        // Further successes agree with the state and are ignored.
        state.success();
        state.success();
        assert_eq!(recorder.transitions(), vec![true]);
    }

    #[test]
    fn agreeing_results_are_complete_no_ops() {
        let (state, recorder) = state(3, 2, true);
        state.success();
        state.success();

        assert_eq!(state.streak(), 0);
        assert_eq!(*recorder.healthy_observations.lock().unwrap(), 0);
        assert_eq!(*recorder.unhealthy_observations.lock().unwrap(), 0);
    }

    #[test]
    fn interleaved_success_does_not_reset_failure_streak() {
        // Counting is cumulative since the last flip, not strictly consecutive.
        let (state, recorder) = state(3, 1, true);

        state.failure();
        state.failure();
        state.success();
        assert!(state.is_healthy());
        assert_eq!(state.streak(), 2);

        state.failure();
        assert!(!state.is_healthy());
        assert_eq!(recorder.transitions(), vec![false]);
        assert_eq!(*recorder.unhealthy_observations.lock().unwrap(), 3);
        assert_eq!(*recorder.healthy_observations.lock().unwrap(), 0);
    }

    #[test]
    fn flapping_with_unit_thresholds() {
        let (state, recorder) = state(1, 1, true);
        state.failure();
        state.success();
        state.failure();

        assert!(!state.is_healthy());
        assert_eq!(recorder.transitions(), vec![false, true, false]);
    }

    #[test]
    fn failing_then_recovering_dependency() {
        let (state, recorder) = state(3, 2, true);

        state.success();
        state.failure();
        state.failure();
        state.failure();
        assert_eq!(recorder.transitions(), vec![false]);

        state.success();
        state.success();
        assert_eq!(recorder.transitions(), vec![false, true]);
        assert_eq!(*recorder.healthy_observations.lock().unwrap(), 2);
    }

    #[test]
    fn dropped_listener_still_flips_state() {
        let (state, recorder) = state(1, 1, true);
        drop(recorder);
        state.failure();
        assert!(!state.is_healthy());
    }
}
