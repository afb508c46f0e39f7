//! The external actuation capability and the built-in implementations.

use std::time::Duration;

use marlet_types::{ActuationCommand, ActuationError, ConfigError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Something that turns a trigger into a physical or virtual action.
///
/// Implementations may block, return an error or panic. The dispatcher runs every call
/// on the blocking pool with a time budget, so none of that reaches the control loop.
pub trait Actuator: Send + 'static {
    fn actuate(&mut self, command: &ActuationCommand) -> Result<(), ActuationError>;

    fn name(&self) -> &str {
        "actuator"
    }
}

/// Logs every command and succeeds.
#[derive(Debug, Default)]
pub struct LoopbackActuator {
    actions: u64,
}

impl LoopbackActuator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actuator for LoopbackActuator {
    fn actuate(&mut self, command: &ActuationCommand) -> Result<(), ActuationError> {
        self.actions += 1;
        info!(
            tick = command.tick,
            power = command.power,
            timestamp_us = command.timestamp_us,
            actions = self.actions,
            "ACTION: trigger"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

/// Fault injection settings for [`ChaosActuator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub error_probability: f64,
    pub panic_probability: f64,
    pub stall_probability: f64,
    /// How long a stalled call blocks
    pub stall_ms: u64,
    pub seed: Option<u64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            error_probability: 0.1,
            panic_probability: 0.02,
            stall_probability: 0.05,
            stall_ms: 250,
            seed: None,
        }
    }
}

impl ChaosConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            self.error_probability,
            self.panic_probability,
            self.stall_probability,
        ];
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(ConfigError::InvalidValue {
                field: "chaos",
                reason: "probabilities must lie in [0, 1]".to_string(),
            });
        }
        if probabilities.iter().sum::<f64>() > 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "chaos",
                reason: "probabilities must not add up to more than 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Randomly fails, panics or stalls. Used to soak test the dispatch boundary.
pub struct ChaosActuator {
    config: ChaosConfig,
    rng: StdRng,
}

impl ChaosActuator {
    pub fn new(config: ChaosConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }
}

impl Actuator for ChaosActuator {
    fn actuate(&mut self, command: &ActuationCommand) -> Result<(), ActuationError> {
        let roll: f64 = self.rng.gen();
        let panic_below = self.config.panic_probability;
        let error_below = panic_below + self.config.error_probability;
        let stall_below = error_below + self.config.stall_probability;

        if roll < panic_below {
            panic!("chaos actuator injected panic at tick {}", command.tick);
        }
        if roll < error_below {
            return Err(ActuationError::Hardware(format!(
                "injected fault at tick {}",
                command.tick
            )));
        }
        if roll < stall_below {
            std::thread::sleep(Duration::from_millis(self.config.stall_ms));
        }
        info!(tick = command.tick, power = command.power, "ACTION: trigger (chaos)");
        Ok(())
    }

    fn name(&self) -> &str {
        "chaos"
    }
}
