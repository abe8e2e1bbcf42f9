//! External observers of probe health.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{error, info, warn};

/// Notified about observations and transitions of every registered probe.
///
/// Each call runs in its own error boundary: an `Err` or a panic is logged
/// and the remaining listeners are still notified.
pub trait HealthStateListener: Send + Sync {
    /// A healthy result was observed for a probe that is currently unhealthy.
    fn on_healthy_check(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// An unhealthy result was observed for a probe that is currently healthy.
    fn on_unhealthy_check(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// The probe's damped health flipped.
    fn on_state_changed(&self, name: &str, healthy: bool) -> anyhow::Result<()>;
}

/// Run one listener callback, containing errors and panics.
pub(crate) fn guarded<F>(hook: &'static str, name: &str, call: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(%name, hook, error = %e, "health state listener failed");
        }
        Err(_) => {
            error!(%name, hook, "health state listener panicked");
        }
    }
}

/// Writes every transition to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl HealthStateListener for LoggingListener {
    fn on_state_changed(&self, name: &str, healthy: bool) -> anyhow::Result<()> {
        if healthy {
            info!(%name, "health check state changed to healthy");
        } else {
            warn!(%name, "health check state changed to unhealthy");
        }
        Ok(())
    }
}
