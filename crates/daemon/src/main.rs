use std::future;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use marlet_daemon::config::{ActuatorKind, Cli, DaemonConfig};
use marlet_daemon::{Actuator, AuditLog, ChaosActuator, ControlLoop, LoopSummary, LoopbackActuator};
use marlet_sensors::MockSource;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "marlet_daemon=info,marlet_dsp=info,marlet_sensors=info,marlet::audit=info";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.resolve().context("invalid configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let duration = cli
        .duration_secs
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid --duration-secs")?;

    tracing::info!("Marlet controller starting...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run(config, duration));
    // a stalled actuator thread must not keep the process alive
    runtime.shutdown_timeout(Duration::from_secs(1));

    let summary = result?;
    tracing::info!(
        ticks = summary.ticks,
        attempts = summary.dispatch.attempts,
        successes = summary.dispatch.successes,
        failures = summary.dispatch.failures,
        skipped = summary.dispatch.skipped,
        overruns = summary.overruns,
        anomalies = summary.anomalies,
        "Marlet controller stopped gracefully."
    );
    Ok(())
}

async fn run(config: DaemonConfig, duration: Option<Duration>) -> anyhow::Result<LoopSummary> {
    let source = MockSource::new(config.source_config(), config.controller.control.max_batch)?;

    let actuator: Box<dyn Actuator> = match config.actuator.kind {
        ActuatorKind::Loopback => Box::new(LoopbackActuator::new()),
        ActuatorKind::Chaos => Box::new(ChaosActuator::new(config.actuator.chaos.clone())?),
    };

    let audit = match &config.controller.audit.csv_path {
        Some(path) => AuditLog::with_csv_path(path)
            .with_context(|| format!("could not open audit file {}", path.display()))?,
        None => AuditLog::new(),
    };

    let control_loop = ControlLoop::new(&config.controller, Box::new(source), actuator)?.with_audit(audit);

    let cancel = CancellationToken::new();
    let loop_handle = tokio::spawn(control_loop.run(cancel.clone()));

    // --- Graceful Shutdown ---
    let stop = cancel.clone();
    let watcher = tokio::spawn(async move {
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutdown signal received. Stopping control loop...");
            }
            _ = deadline => tracing::info!("Run duration elapsed. Stopping control loop..."),
            _ = stop.cancelled() => {}
        }
        stop.cancel();
    });

    let joined = loop_handle.await;
    cancel.cancel();
    let _ = watcher.await;

    let summary = joined.context("control loop task failed")??;
    Ok(summary)
}
