//! vigild — the Vigil daemon.
//!
//! Probes TCP dependencies on their configured schedules and keeps
//! process liveness/readiness up to date. On SIGINT/SIGTERM it pins
//! readiness to false and waits out the drain period before exiting.
//!
//! # Usage
//!
//! ```text
//! vigild run --config /etc/vigil/vigil.toml
//! vigild validate --config /etc/vigil/vigil.toml
//! ```

mod config;
mod tcp;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vigil_health::{HealthMonitor, LoggingListener, ShutdownCoordinator, shutdown};
use vigil_metrics::MetricsRegistry;

use crate::config::DaemonConfig;
use crate::tcp::TcpProbe;

const DEFAULT_FILTER: &str = "info,vigild=debug,vigil_health=debug";

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil dependency health daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the configured targets until a shutdown signal arrives.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long, short)]
        config: PathBuf,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Check that every configured health check has a target and exit.
    Validate {
        /// Path to the TOML configuration file.
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, log_json } => {
            init_tracing(log_json);
            let config = DaemonConfig::from_file(&config)?;

            // The runtime is sized from the config, so it is built by hand.
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.health.worker_threads())
                .thread_name(config.health.thread_name())
                .enable_all()
                .build()
                .context("failed to start runtime")?;
            runtime.block_on(run(config))
        }
        Command::Validate { config } => {
            init_tracing(false);
            let config = DaemonConfig::from_file(&config)?;
            config.validator().validate()?;
            info!(checks = config.health.checks.len(), "configuration is valid");
            Ok(())
        }
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(checks = config.health.checks.len(), "vigil daemon starting");

    if !config.health.enabled {
        info!("health checks disabled");
        shutdown::wait_for_signal().await;
        info!("vigil daemon stopped");
        return Ok(());
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let monitor: HealthMonitor = config
        .health
        .monitor_builder()
        .metrics(Arc::clone(&metrics))
        .listener(Arc::new(LoggingListener))
        .build()?;

    for (name, address) in &config.targets {
        let probe = TcpProbe::new(address, config.daemon.connect_timeout);
        debug!(%name, address = %probe.address(), "registering tcp probe");
        monitor.register(name, Arc::new(probe));
    }
    monitor
        .validate()
        .context("health checks are not fully wired")?;

    info!(
        probes = ?monitor.probe_names(),
        healthy = monitor.is_healthy(),
        "health monitor running"
    );

    // ── Shutdown ───────────────────────────────────────────────

    if config.health.delayed_shutdown_enabled() {
        let (mut drained, _hook) = ShutdownCoordinator::new(monitor.clone()).register();
        drained
            .wait_for(|done| *done)
            .await
            .context("shutdown hook exited before draining")?;
    } else {
        shutdown::wait_for_signal().await;
        info!("shutdown signal received");
    }

    monitor.scheduler().unschedule_all();
    debug!(metrics = %metrics.render_prometheus(), "final metrics");
    info!("vigil daemon stopped");
    Ok(())
}
