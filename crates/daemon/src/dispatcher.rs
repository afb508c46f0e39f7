//! Fault isolation boundary in front of the actuator.
//!
//! Every actuation runs on the blocking pool and is awaited for at most the configured
//! budget. Errors, panics and overruns are logged and folded into a [`DispatchOutcome`];
//! nothing the actuator does can propagate into the control loop.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use marlet_types::{ActuationCommand, ActuationError, DecisionState, DispatchFailure, DispatchOutcome};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::actuator::Actuator;

type SharedActuator = Arc<Mutex<Box<dyn Actuator>>>;

/// Running totals kept by the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub attempts: u64,
    pub successes: u64,
    /// Attempts that did not succeed, for any reason
    pub failures: u64,
    pub timeouts: u64,
    pub panics: u64,
    /// Triggers dropped because an earlier call was still running
    pub skipped: u64,
    /// Timed-out calls that later finished
    pub late_completions: u64,
}

/// An actuation that outlived its budget and is still running on the blocking pool.
struct Outstanding {
    tick: u64,
    since: Instant,
    handle: JoinHandle<Result<(), ActuationError>>,
}

pub struct Dispatcher {
    actuator: SharedActuator,
    actuator_name: String,
    budget: Duration,
    outstanding: Option<Outstanding>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(actuator: Box<dyn Actuator>, budget: Duration) -> Self {
        let actuator_name = actuator.name().to_string();
        Self {
            actuator: Arc::new(Mutex::new(actuator)),
            actuator_name,
            budget,
            outstanding: None,
            stats: DispatchStats::default(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Forwards an active trigger to the actuator. Never fails; the outcome says what
    /// happened.
    pub async fn dispatch(&mut self, tick: u64, state: &DecisionState) -> DispatchOutcome {
        self.reap_outstanding().await;

        if !state.trigger {
            return DispatchOutcome::idle();
        }

        if let Some(outstanding) = &self.outstanding {
            self.stats.skipped += 1;
            warn!(
                tick,
                power = state.power,
                timestamp_us = state.timestamp_us,
                outstanding_tick = outstanding.tick,
                outstanding_for = ?outstanding.since.elapsed(),
                "Trigger skipped, previous actuation still outstanding"
            );
            return DispatchOutcome::skipped(DispatchFailure::Outstanding);
        }

        self.stats.attempts += 1;
        let command = ActuationCommand::from_decision(tick, state);
        let actuator = Arc::clone(&self.actuator);
        let mut handle = tokio::task::spawn_blocking(move || {
            // a previous panic poisons the lock; the actuator itself is still usable
            let mut actuator = actuator.lock().unwrap_or_else(PoisonError::into_inner);
            actuator.actuate(&command)
        });

        let waited = timeout(self.budget, &mut handle).await;
        let failure = match waited {
            Ok(joined) => match flatten(joined) {
                Ok(()) => {
                    self.stats.successes += 1;
                    debug!(tick, actuator = %self.actuator_name, "Actuation succeeded");
                    return DispatchOutcome::success();
                }
                Err(failure) => failure,
            },
            Err(_) => {
                self.outstanding = Some(Outstanding {
                    tick,
                    since: Instant::now(),
                    handle,
                });
                DispatchFailure::TimedOut(self.budget)
            }
        };

        self.stats.failures += 1;
        match &failure {
            DispatchFailure::TimedOut(_) => self.stats.timeouts += 1,
            DispatchFailure::Panicked(_) => self.stats.panics += 1,
            _ => {}
        }
        error!(
            tick,
            power = state.power,
            timestamp_us = state.timestamp_us,
            actuator = %self.actuator_name,
            error = %failure,
            "Actuation failed"
        );
        DispatchOutcome::failed(failure)
    }

    /// Collects a stale call if it has finished meanwhile.
    async fn reap_outstanding(&mut self) {
        let finished = self
            .outstanding
            .as_ref()
            .map_or(false, |outstanding| outstanding.handle.is_finished());
        if !finished {
            return;
        }
        if let Some(outstanding) = self.outstanding.take() {
            self.stats.late_completions += 1;
            let late = outstanding.since.elapsed();
            match flatten(outstanding.handle.await) {
                Ok(()) => info!(
                    tick = outstanding.tick,
                    late_by = ?late,
                    "Timed-out actuation completed late"
                ),
                Err(failure) => warn!(
                    tick = outstanding.tick,
                    late_by = ?late,
                    error = %failure,
                    "Timed-out actuation failed late"
                ),
            }
        }
    }

    /// Detaches a call that is still running. The blocking thread is left to finish on
    /// its own.
    pub async fn finish(&mut self) {
        self.reap_outstanding().await;
        if let Some(outstanding) = self.outstanding.take() {
            warn!(
                tick = outstanding.tick,
                outstanding_for = ?outstanding.since.elapsed(),
                "Abandoning actuation still running at shutdown"
            );
        }
    }
}

fn flatten(joined: Result<Result<(), ActuationError>, JoinError>) -> Result<(), DispatchFailure> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DispatchFailure::Actuator(e)),
        Err(join_error) if join_error.is_panic() => Err(DispatchFailure::Panicked(
            panic_message(join_error.into_panic()),
        )),
        Err(_) => Err(DispatchFailure::Cancelled),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    }
}
