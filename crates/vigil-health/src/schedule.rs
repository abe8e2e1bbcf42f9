//! Per-probe timing and hysteresis parameters.

use std::time::Duration;

use serde::Deserialize;

use crate::duration;

/// How often a probe runs and how many results it takes to flip its state.
///
/// `check_interval` is used while the probe is healthy. `downtime_interval`
/// is used while it is unhealthy and is normally the longer of the two, so
/// a dependency that is known to be down is not hammered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Schedule {
    /// Delay before the first run. Falls back to `check_interval`.
    #[serde(deserialize_with = "duration::deserialize_opt")]
    pub initial_delay: Option<Duration>,
    #[serde(deserialize_with = "duration::deserialize")]
    pub check_interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub downtime_interval: Duration,
    /// Failures needed to go from healthy to unhealthy.
    pub failure_attempts: u32,
    /// Successes needed to go from unhealthy to healthy.
    pub success_attempts: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            initial_delay: None,
            check_interval: Duration::from_secs(5),
            downtime_interval: Duration::from_secs(30),
            failure_attempts: 3,
            success_attempts: 2,
        }
    }
}

impl Schedule {
    /// Delay before the first execution.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay.unwrap_or(self.check_interval)
    }

    /// Fixed delay between executions for the given health.
    pub fn interval_for(&self, healthy: bool) -> Duration {
        if healthy {
            self.check_interval
        } else {
            self.downtime_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let schedule = Schedule::default();
        assert_eq!(schedule.check_interval, Duration::from_secs(5));
        assert_eq!(schedule.downtime_interval, Duration::from_secs(30));
        assert_eq!(schedule.failure_attempts, 3);
        assert_eq!(schedule.success_attempts, 2);
    }

    #[test]
    fn initial_delay_falls_back_to_check_interval() {
        let schedule = Schedule {
            check_interval: Duration::from_secs(7),
            ..Schedule::default()
        };
        assert_eq!(schedule.initial_delay(), Duration::from_secs(7));

        let schedule = Schedule {
            initial_delay: Some(Duration::from_millis(250)),
            ..schedule
        };
        assert_eq!(schedule.initial_delay(), Duration::from_millis(250));
    }

    #[test]
    fn interval_depends_on_health() {
        let schedule = Schedule::default();
        assert_eq!(schedule.interval_for(true), Duration::from_secs(5));
        assert_eq!(schedule.interval_for(false), Duration::from_secs(30));
    }

    #[test]
    fn parse_partial_table() {
        let schedule: Schedule = toml::from_str(
            r#"
check_interval = "1s"
failure_attempts = 1
"#,
        )
        .unwrap();
        assert_eq!(schedule.check_interval, Duration::from_secs(1));
        assert_eq!(schedule.downtime_interval, Duration::from_secs(30));
        assert_eq!(schedule.failure_attempts, 1);
        assert_eq!(schedule.success_attempts, 2);
        assert_eq!(schedule.initial_delay, None);
    }
}
