//! vigil-health — scheduled dependency probes with hysteresis, process-wide
//! liveness/readiness, and delayed shutdown.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── ProbeScheduler (one fixed-delay timer per probe)
//!   │   └── ScheduledProbe::tick()
//!   │       ├── HealthProbe::check() → ProbeOutcome
//!   │       └── HysteresisState (success / failure)
//!   │             └── on transition → HealthMonitor
//!   ├── AppHealth (alive, ready, unhealthy critical counters)
//!   └── HealthStateListener fan-out
//! ```
//!
//! # Intervals
//!
//! A healthy probe runs every `check_interval`. After it flips to unhealthy
//! its timer is replaced and it runs every `downtime_interval` until it
//! recovers.
//!
//! # Shutdown
//!
//! `ShutdownCoordinator` pins readiness to false and holds the shutdown
//! sequence for `shutdown_wait_period`, so a load balancer stops routing
//! before listeners close. Probes keep running during the wait.

pub mod config;
pub mod duration;
pub mod error;
pub mod hysteresis;
pub mod listener;
pub mod monitor;
pub mod probe;
pub mod schedule;
pub mod scheduled;
pub mod scheduler;
pub mod shutdown;
pub mod validator;

pub use config::{HealthSettings, ProbeConfig};
pub use error::{HealthError, HealthResult};
pub use hysteresis::{HysteresisState, StateListener};
pub use listener::{HealthStateListener, LoggingListener};
pub use monitor::{HealthMonitor, HealthMonitorBuilder, HealthView};
pub use probe::{HealthProbe, ProbeDefinition, ProbeFuture, ProbeKind, ProbeOutcome};
pub use schedule::Schedule;
pub use scheduled::{ProbeCounters, ScheduledProbe};
pub use scheduler::ProbeScheduler;
pub use shutdown::ShutdownCoordinator;
pub use validator::ConfigValidator;
