//! Synthetic acquisition source used when no real collaborator is attached.

pub mod driver;
pub mod mock_data_generator;

use serde::{Deserialize, Serialize};

pub use driver::MockSource;
pub use mock_data_generator::{current_timestamp_micros, SignalGenerator};

/// Periodic sine burst added on top of the background noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstConfig {
    pub freq_hz: f64,
    /// Peak amplitude in µV
    pub amplitude: f64,
    pub period_secs: f64,
    pub duration_secs: f64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            freq_hz: 12.0,
            amplitude: 60.0,
            period_secs: 10.0,
            duration_secs: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSourceConfig {
    pub sample_rate_hz: f64,
    pub channels: usize,
    /// Standard deviation of the Gaussian background in µV
    pub noise_std: f64,
    pub dc_offset: f64,
    pub line_noise_hz: Option<f64>,
    pub line_noise_amplitude: f64,
    pub burst: Option<BurstConfig>,
    /// Fixed seed for reproducible runs; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 256.0,
            channels: 1,
            noise_std: 10.0,
            dc_offset: 0.0,
            line_noise_hz: None,
            line_noise_amplitude: 0.0,
            burst: Some(BurstConfig::default()),
            seed: None,
        }
    }
}
