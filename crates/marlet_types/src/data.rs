use serde::{Deserialize, Serialize};

use crate::error::DispatchFailure;

/// One raw reading from the acquisition collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Channel index as reported by the source.
    pub channel: usize,
    /// Raw amplitude (µV for EEG sources).
    pub amplitude: f64,
    /// Acquisition timestamp in microseconds.
    pub timestamp_us: u64,
}

impl Sample {
    pub fn new(channel: usize, amplitude: f64, timestamp_us: u64) -> Self {
        Self {
            channel,
            amplitude,
            timestamp_us,
        }
    }
}

/// The committed output of the decision engine after the most recent sample.
///
/// `trigger` only changes after a candidate state has held for the configured
/// debounce duration, so a single noisy sample never flips it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionState {
    /// Debounced trigger.
    pub trigger: bool,
    /// Power metric (standard deviation over the window) for the latest sample.
    pub power: f64,
    /// Timestamp of the last committed transition, if any.
    pub last_transition_us: Option<u64>,
    /// Timestamp of the sample this state was computed from.
    pub timestamp_us: u64,
    /// True while the sliding window has not filled yet.
    pub warming_up: bool,
}

/// The command handed to the external actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuationCommand {
    /// Loop tick that produced the command.
    pub tick: u64,
    /// Power value that triggered the command.
    pub power: f64,
    /// Timestamp of the sample that triggered the command.
    pub timestamp_us: u64,
}

impl ActuationCommand {
    pub fn from_decision(tick: u64, state: &DecisionState) -> Self {
        Self {
            tick,
            power: state.power,
            timestamp_us: state.timestamp_us,
        }
    }
}

/// Result of a single pass through the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub error: Option<DispatchFailure>,
}

impl DispatchOutcome {
    /// Trigger inactive, nothing was called.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn success() -> Self {
        Self {
            attempted: true,
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(error: DispatchFailure) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            error: Some(error),
        }
    }

    /// Trigger active but the attempt was not made (an earlier call is still outstanding).
    pub fn skipped(error: DispatchFailure) -> Self {
        Self {
            attempted: false,
            succeeded: false,
            error: Some(error),
        }
    }

    /// Whether this outcome belongs in the audit stream.
    pub fn is_auditable(&self) -> bool {
        self.attempted || self.error.is_some()
    }
}

/// One line of the audit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tick: u64,
    pub timestamp_us: u64,
    pub power: f64,
    pub attempted: bool,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(tick: u64, state: &DecisionState, outcome: &DispatchOutcome) -> Self {
        Self {
            tick,
            timestamp_us: state.timestamp_us,
            power: state.power,
            attempted: outcome.attempted,
            succeeded: outcome.succeeded,
            error: outcome.error.as_ref().map(|e| e.to_string()),
        }
    }
}
