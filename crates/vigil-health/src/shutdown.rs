//! Delayed shutdown — drain readiness before the rest of the process stops.
//!
//! The coordinator runs first in the shutdown sequence. Everything else
//! that must stop (listeners, servers) subscribes to the coordinator's
//! `watch` channel and only sees `true` once the drain wait has elapsed.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::monitor::HealthMonitor;

/// Runs `notify_shutdown_started` ahead of every other shutdown step.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    monitor: HealthMonitor,
    tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new(monitor: HealthMonitor) -> Self {
        let (tx, _) = watch::channel(false);
        Self { monitor, tx }
    }

    /// Receiver that flips to `true` after the drain has finished.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Drain, then release subscribers.
    pub async fn on_shutdown(&self) {
        self.monitor.notify_shutdown_started().await;
        self.tx.send_replace(true);
    }

    /// Install the hook on SIGINT and SIGTERM.
    ///
    /// Returns a receiver that turns `true` once the drain completes, and
    /// the handle of the task waiting for the signal.
    pub fn register(self) -> (watch::Receiver<bool>, JoinHandle<()>) {
        let rx = self.subscribe();
        let handle = tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received, draining");
            self.on_shutdown().await;
        });
        (rx, handle)
    }
}

/// Resolve on SIGINT or, on unix, SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}
