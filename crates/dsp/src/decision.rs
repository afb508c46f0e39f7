use std::collections::VecDeque;
use std::time::Duration;

use marlet_types::{ConfigError, DecisionConfig, DecisionState};
use tracing::{debug, info};

/// Fixed-capacity sliding window over conditioned samples.
#[derive(Debug, Clone)]
pub struct PowerWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl PowerWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one once the window is full.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Population standard deviation of the samples present, 0.0 when empty.
    pub fn std_dev(&self) -> f64 {
        let n = self.samples.len();
        if n == 0 {
            return 0.0;
        }
        let mean = self.samples.iter().sum::<f64>() / n as f64;
        let variance = self
            .samples
            .iter()
            .map(|x| {
                let d = x - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;
        variance.sqrt()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Turns conditioned samples into a debounced trigger.
///
/// Power is the standard deviation over the window, so a constant offset never counts
/// as activity. A change of the active/idle classification is committed only once it
/// has held for the debounce duration, measured on sample timestamps.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    threshold: f64,
    debounce_us: u64,
    allow_warmup_trigger: bool,
    window: PowerWindow,
    state: DecisionState,
    /// Pending classification and the timestamp it was first seen.
    candidate: Option<(bool, u64)>,
}

impl DecisionEngine {
    pub fn new(threshold: f64, window_size: usize, debounce: Duration) -> Result<Self, ConfigError> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if window_size == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(Self {
            threshold,
            debounce_us: u64::try_from(debounce.as_micros()).unwrap_or(u64::MAX),
            allow_warmup_trigger: false,
            window: PowerWindow::new(window_size),
            state: DecisionState {
                warming_up: true,
                ..DecisionState::default()
            },
            candidate: None,
        })
    }

    pub fn from_config(config: &DecisionConfig) -> Result<Self, ConfigError> {
        let mut engine = Self::new(config.threshold, config.window_size, config.debounce())?;
        engine.allow_warmup_trigger = config.allow_warmup_trigger;
        Ok(engine)
    }

    pub fn with_warmup_trigger(mut self, allow: bool) -> Self {
        self.allow_warmup_trigger = allow;
        self
    }

    /// Feeds one conditioned sample and returns the committed state.
    pub fn update(&mut self, conditioned: f64, timestamp_us: u64) -> DecisionState {
        if !conditioned.is_finite() {
            debug!(conditioned, "Ignoring non-finite conditioned sample");
            return self.state;
        }

        self.window.push(conditioned);
        let power = self.window.std_dev();
        let warming_up = !self.window.is_full();
        let active = power > self.threshold && (!warming_up || self.allow_warmup_trigger);

        if active == self.state.trigger {
            self.candidate = None;
        } else {
            let since = match self.candidate {
                Some((pending, since)) if pending == active => since,
                _ => {
                    self.candidate = Some((active, timestamp_us));
                    timestamp_us
                }
            };
            if timestamp_us.saturating_sub(since) >= self.debounce_us {
                self.state.trigger = active;
                self.state.last_transition_us = Some(timestamp_us);
                self.candidate = None;
                info!(
                    trigger = active,
                    power,
                    threshold = self.threshold,
                    timestamp_us,
                    "Decision state changed"
                );
            }
        }

        self.state.power = power;
        self.state.timestamp_us = timestamp_us;
        self.state.warming_up = warming_up;
        self.state
    }

    /// Latest committed state.
    pub fn state(&self) -> DecisionState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Clears the window and any pending transition.
    pub fn reset(&mut self) {
        self.window.clear();
        self.candidate = None;
        self.state = DecisionState {
            warming_up: true,
            ..DecisionState::default()
        };
    }
}
