use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use marlet_sensors::MockSourceConfig;
use marlet_types::{ConfigError, ControllerConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actuator::ChaosConfig;

/// Which built-in actuator the binary drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    #[default]
    Loopback,
    Chaos,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    pub chaos: ChaosConfig,
}

/// Configuration for the daemon
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub controller: ControllerConfig,
    /// Synthetic source settings; its sample rate follows the controller's
    pub source: MockSourceConfig,
    pub actuator: ActuatorConfig,
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        self.actuator.chaos.validate()
    }

    /// Source settings with the sample rate aligned to the controller.
    pub fn source_config(&self) -> MockSourceConfig {
        MockSourceConfig {
            sample_rate_hz: self.controller.sample_rate_hz,
            ..self.source.clone()
        }
    }
}

/// Load daemon configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<DaemonConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    let config: DaemonConfig = serde_json::from_str(&contents)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Marlet BCI controller
#[derive(Debug, Parser)]
#[command(name = "marlet", version, about = "Threshold-triggered EEG control loop")]
pub struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the decision threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Override the control loop frequency in Hz
    #[arg(long)]
    pub loop_frequency: Option<f64>,

    #[arg(long, value_enum)]
    pub actuator: Option<ActuatorKind>,

    /// Write audit records to this CSV file
    #[arg(long)]
    pub audit_csv: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration_secs: Option<f64>,

    /// Standard deviation of the mock source background noise
    #[arg(long)]
    pub mock_noise_std: Option<f64>,

    /// Seed for the mock source and chaos actuator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(threshold) = self.threshold {
            config.controller.decision.threshold = threshold;
        }
        if let Some(freq) = self.loop_frequency {
            config.controller.control.loop_frequency_hz = freq;
        }
        if let Some(kind) = self.actuator {
            config.actuator.kind = kind;
        }
        if let Some(path) = &self.audit_csv {
            config.controller.audit.csv_path = Some(path.clone());
        }
        if let Some(std) = self.mock_noise_std {
            config.source.noise_std = std;
        }
        if let Some(seed) = self.seed {
            config.source.seed = Some(seed);
            config.actuator.chaos.seed = Some(seed);
        }
    }

    /// Loads the file (if any), applies the overrides and validates the result.
    pub fn resolve(&self) -> Result<DaemonConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => DaemonConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}
