use std::time::Duration;

use marlet_dsp::{DecisionEngine, FilterCascade};
use marlet_sensors::SampleSource;
use marlet_types::{AcquisitionError, AuditRecord, ConfigError, ControllerConfig};
use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actuator::Actuator;
use crate::audit::AuditLog;
use crate::dispatcher::{DispatchStats, Dispatcher};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopSummary {
    pub ticks: u64,
    /// Decision-channel samples fed through the cascade
    pub samples: u64,
    /// Samples from other channels
    pub ignored_samples: u64,
    /// Non-finite samples substituted by the filter cascade
    pub anomalies: u64,
    /// Ticks that took longer than one period
    pub overruns: u64,
    pub audit_records: u64,
    pub dispatch: DispatchStats,
}

/// Acquisition-to-actuation loop on a single task.
///
/// Per tick: pull a batch, condition the decision channel sample by sample, update the
/// decision, dispatch it once, audit the outcome and wait out the rest of the period.
pub struct ControlLoop {
    period: Duration,
    decision_channel: usize,
    source: Box<dyn SampleSource>,
    cascade: FilterCascade,
    engine: DecisionEngine,
    dispatcher: Dispatcher,
    audit: AuditLog,
    summary: LoopSummary,
}

impl ControlLoop {
    pub fn new(
        config: &ControllerConfig,
        source: Box<dyn SampleSource>,
        actuator: Box<dyn Actuator>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let cascade = FilterCascade::new(&config.filter, config.sample_rate_hz)?;
        let engine = DecisionEngine::from_config(&config.decision)?;
        let dispatcher = Dispatcher::new(actuator, config.actuation_budget());

        Ok(Self {
            period: config.tick_period(),
            decision_channel: config.control.decision_channel,
            source,
            cascade,
            engine,
            dispatcher,
            audit: AuditLog::new(),
            summary: LoopSummary::default(),
        })
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Runs until `cancel` fires or the source fails.
    ///
    /// The source is shut down and the audit log flushed on every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopSummary, ControllerError> {
        info!(
            source = self.source.name(),
            period = ?self.period,
            budget = ?self.dispatcher.budget(),
            decision_channel = self.decision_channel,
            "Control loop starting"
        );

        let result = match self.source.initialize() {
            Ok(()) => self.run_ticks(&cancel).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.source.shutdown() {
            warn!("Sample source shutdown failed: {}", e);
        }
        self.dispatcher.finish().await;
        self.summary.audit_records = self.audit.finish();
        self.summary.anomalies = self.cascade.anomaly_count();
        self.summary.dispatch = self.dispatcher.stats();

        match result {
            Ok(()) => {
                info!(summary = ?self.summary, "Control loop stopped");
                Ok(self.summary)
            }
            Err(e) => {
                error!(ticks = self.summary.ticks, "Control loop aborted: {}", e);
                Err(ControllerError::Acquisition(e))
            }
        }
    }

    async fn run_ticks(&mut self, cancel: &CancellationToken) -> Result<(), AcquisitionError> {
        let mut tick: u64 = 0;

        while !cancel.is_cancelled() {
            let tick_start = Instant::now();

            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = self.source.next_batch() => batch?,
            };

            for sample in batch {
                if sample.channel != self.decision_channel {
                    self.summary.ignored_samples += 1;
                    continue;
                }
                let conditioned = self.cascade.apply(sample.amplitude);
                self.engine.update(conditioned, sample.timestamp_us);
                self.summary.samples += 1;
            }

            let state = self.engine.state();
            let outcome = self.dispatcher.dispatch(tick, &state).await;
            if outcome.is_auditable() {
                self.audit.record(&AuditRecord::new(tick, &state, &outcome));
            }

            tick += 1;
            self.summary.ticks = tick;

            let deadline = tick_start + self.period;
            if Instant::now() >= deadline {
                self.summary.overruns += 1;
                debug!(tick, overrun = ?tick_start.elapsed().saturating_sub(self.period), "Tick overran its period");
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(deadline) => {}
            }
        }

        debug!(ticks = tick, "Cancellation observed");
        Ok(())
    }
}
