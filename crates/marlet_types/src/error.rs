use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid controller configuration. Only raised at startup; the loop must not start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),
    #[error("band-pass requires 0 < low_cut < high_cut, got low_cut={low_hz} high_cut={high_hz}")]
    InvalidCutoffs { low_hz: f64, high_hz: f64 },
    #[error("{name} frequency {freq_hz} Hz must be below the Nyquist frequency {nyquist_hz} Hz")]
    AboveNyquist {
        name: &'static str,
        freq_hz: f64,
        nyquist_hz: f64,
    },
    #[error("filter order must be at least 1, got {0}")]
    InvalidOrder(usize),
    #[error("notch must have a positive frequency and Q, got {freq_hz} Hz, Q={q}")]
    InvalidNotch { freq_hz: f64, q: f64 },
    #[error("filter section {section} is unstable (pole radius {pole_radius:.6})")]
    UnstableDesign { section: usize, pole_radius: f64 },
    #[error("decision threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),
    #[error("window size must be at least 1")]
    InvalidWindow,
    #[error("loop frequency must be positive and finite, got {0}")]
    InvalidLoopFrequency(f64),
    #[error("max batch must be at least 1")]
    InvalidBatch,
    #[error("actuation budget {budget:?} must be non-zero and not exceed the tick period {tick:?}")]
    InvalidBudget { budget: Duration, tick: Duration },
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("could not read configuration file: {0}")]
    Io(String),
    #[error("could not parse configuration file: {0}")]
    Parse(String),
}

/// Loss or malfunction of the sample source. Terminal for the current session.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionError {
    /// The source closed or the acquisition collaborator went away.
    #[error("Sample source disconnected")]
    Disconnected,
    /// A hardware-related fault reported by the source.
    #[error("Sample source hardware fault: {0}")]
    Hardware(String),
    /// The source was used before `initialize`.
    #[error("Sample source not initialized")]
    NotInitialized,
    #[error("Sample source configuration error: {0}")]
    Configuration(String),
}

/// Errors an actuator reports by value.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActuationError {
    #[error("actuator rejected command: {0}")]
    Rejected(String),
    #[error("actuator hardware fault: {0}")]
    Hardware(String),
    #[error("actuator unavailable")]
    Unavailable,
}

/// Everything that can go wrong at the dispatch boundary.
///
/// None of these ever leave the dispatcher as an `Err`; they are recorded on the
/// `DispatchOutcome` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchFailure {
    #[error(transparent)]
    Actuator(#[from] ActuationError),
    #[error("actuator panicked: {0}")]
    Panicked(String),
    #[error("actuation exceeded its {0:?} budget")]
    TimedOut(Duration),
    #[error("previous actuation still outstanding, trigger skipped")]
    Outstanding,
    #[error("actuation task was cancelled")]
    Cancelled,
}
