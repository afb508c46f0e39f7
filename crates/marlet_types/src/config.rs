//! Configuration types for the Marlet controller
//!
//! Every value here is loaded once before the loop starts and is immutable for the
//! lifetime of the loop. Re-tuning requires a restart.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Band-pass and notch filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Band-pass lower cutoff in Hz
    pub low_cut_hz: f64,
    /// Band-pass upper cutoff in Hz
    pub high_cut_hz: f64,
    /// Butterworth order of each band edge
    pub order: usize,
    /// Powerline notch frequency in Hz, or None for no notch
    pub notch_hz: Option<f64>,
    /// Quality factor of the notch (higher is narrower)
    pub notch_q: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            low_cut_hz: 4.0,
            high_cut_hz: 30.0,
            order: 5,
            notch_hz: Some(50.0), // 60.0 for the Americas
            notch_q: 30.0,
        }
    }
}

/// Threshold and debounce parameters of the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Power above which the signal counts as active.
    /// The default is a demo placeholder; tune it per operator.
    pub threshold: f64,
    /// Number of conditioned samples in the sliding power window
    pub window_size: usize,
    /// How long a candidate state must hold before it is committed
    pub debounce_ms: u64,
    /// Allow the trigger to fire before the window has filled
    pub allow_warmup_trigger: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: 15.0,
            window_size: 128,
            debounce_ms: 0,
            allow_warmup_trigger: false,
        }
    }
}

impl DecisionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Cadence and routing of the control loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Tick rate of the control loop in Hz
    pub loop_frequency_hz: f64,
    /// Channel whose samples drive the decision
    pub decision_channel: usize,
    /// Largest number of samples a source hands over per tick
    pub max_batch: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            loop_frequency_hz: 128.0,
            decision_channel: 0,
            max_batch: 64,
        }
    }
}

/// Dispatch boundary settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Time budget for one actuation call. Defaults to half a tick period.
    pub timeout_ms: Option<u64>,
}

/// Audit stream settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Optional CSV file receiving one row per dispatch attempt
    pub csv_path: Option<PathBuf>,
}

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Acquisition sample rate in Hz
    pub sample_rate_hz: f64,
    pub filter: FilterConfig,
    pub decision: DecisionConfig,
    #[serde(rename = "loop")]
    pub control: LoopConfig,
    pub dispatch: DispatchConfig,
    pub audit: AuditConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 256.0,
            filter: FilterConfig::default(),
            decision: DecisionConfig::default(),
            control: LoopConfig::default(),
            dispatch: DispatchConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl ControllerConfig {
    fn try_tick_period(&self) -> Result<Duration, ConfigError> {
        let freq = self.control.loop_frequency_hz;
        if !(freq.is_finite() && freq > 0.0) {
            return Err(ConfigError::InvalidLoopFrequency(freq));
        }
        Duration::try_from_secs_f64(1.0 / freq)
            .map_err(|_| ConfigError::InvalidLoopFrequency(freq))
    }

    /// Period of one loop tick. Saturates for frequencies `validate` rejects.
    pub fn tick_period(&self) -> Duration {
        self.try_tick_period().unwrap_or(Duration::MAX)
    }

    /// Time the dispatcher waits for one actuation call.
    ///
    /// Must stay below the tick period so a stuck actuator cannot stretch a tick.
    pub fn actuation_budget(&self) -> Duration {
        self.dispatch
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.tick_period() / 2)
    }

    /// Checks everything that does not need a filter design.
    ///
    /// Cutoff and stability checks happen when the filter cascade is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate_hz));
        }
        if !(self.decision.threshold.is_finite() && self.decision.threshold >= 0.0) {
            return Err(ConfigError::InvalidThreshold(self.decision.threshold));
        }
        if self.decision.window_size == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        let tick = self.try_tick_period()?;
        if self.control.max_batch == 0 {
            return Err(ConfigError::InvalidBatch);
        }
        let budget = self.actuation_budget();
        if budget.is_zero() || budget >= tick {
            return Err(ConfigError::InvalidBudget { budget, tick });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_prototype() {
        let config = ControllerConfig::default();
        assert_eq!(config.sample_rate_hz, 256.0);
        assert_eq!(config.filter.low_cut_hz, 4.0);
        assert_eq!(config.filter.high_cut_hz, 30.0);
        assert_eq!(config.filter.notch_hz, Some(50.0));
        assert_eq!(config.decision.threshold, 15.0);
        assert_eq!(config.control.loop_frequency_hz, 128.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_budget_defaults_to_half_tick_period() {
        let config = ControllerConfig::default();
        assert_eq!(config.actuation_budget(), config.tick_period() / 2);
        assert!(config.actuation_budget() < config.tick_period());
    }

    #[test]
    fn test_budget_not_shorter_than_tick_is_rejected() {
        let mut config = ControllerConfig::default();
        config.dispatch.timeout_ms = Some(100); // tick is ~7.8ms
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBudget { .. })
        ));

        // 10 Hz gives a 100ms tick; a budget equal to it is too long
        config.control.loop_frequency_hz = 10.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBudget { .. })
        ));
        config.dispatch.timeout_ms = Some(99);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tiny_loop_frequency_is_an_error_not_a_panic() {
        let mut config = ControllerConfig::default();
        config.control.loop_frequency_hz = 1e-30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLoopFrequency(_))
        ));
        assert_eq!(config.tick_period(), Duration::MAX);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = ControllerConfig::default();
        config.decision.window_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidWindow));

        let mut config = ControllerConfig::default();
        config.decision.threshold = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidThreshold(_))));

        let mut config = ControllerConfig::default();
        config.control.loop_frequency_hz = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLoopFrequency(_))));

        let mut config = ControllerConfig::default();
        config.sample_rate_hz = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSampleRate(_))));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{ "decision": { "threshold": 22.5 }, "loop": { "loop_frequency_hz": 64.0 } }"#;
        let config: ControllerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.decision.threshold, 22.5);
        assert_eq!(config.decision.window_size, 128);
        assert_eq!(config.control.loop_frequency_hz, 64.0);
        assert_eq!(config.filter, FilterConfig::default());
    }
}
