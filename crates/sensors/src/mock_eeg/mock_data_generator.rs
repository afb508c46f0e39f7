use std::f64::consts::PI;

use log::debug;
use marlet_types::AcquisitionError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::{BurstConfig, MockSourceConfig};

/// Helper function to get current timestamp in microseconds
///
/// Only used for the base timestamp when acquisition starts. Individual samples get a
/// timestamp computed from the sample index and the sample rate.
pub fn current_timestamp_micros() -> Result<u64, AcquisitionError> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .map_err(|e| AcquisitionError::Hardware(format!("Failed to get timestamp: {}", e)))
}

/// Synthetic EEG-like signal: Gaussian background, optional powerline pickup and an
/// optional periodic in-band burst standing in for voluntary activity.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    sample_rate: f64,
    channels: usize,
    offset: f64,
    noise: Normal<f64>,
    rng: StdRng,
    burst: Option<BurstConfig>,
    line_noise_hz: Option<f64>,
    line_noise_amplitude: f64,
}

impl SignalGenerator {
    pub fn new(config: &MockSourceConfig) -> Result<Self, AcquisitionError> {
        if !(config.noise_std.is_finite() && config.noise_std >= 0.0) {
            return Err(AcquisitionError::Configuration(format!(
                "invalid noise_std {}: must be finite and non-negative",
                config.noise_std
            )));
        }
        let noise = Normal::new(0.0, config.noise_std).map_err(|e| {
            AcquisitionError::Configuration(format!("invalid noise_std {}: {}", config.noise_std, e))
        })?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(
            "Initializing signal generator: {} Hz, {} channels, noise σ={}, burst={:?}",
            config.sample_rate_hz, config.channels, config.noise_std, config.burst
        );

        Ok(Self {
            sample_rate: config.sample_rate_hz,
            channels: config.channels,
            offset: config.dc_offset,
            noise,
            rng,
            burst: config.burst.clone(),
            line_noise_hz: config.line_noise_hz,
            line_noise_amplitude: config.line_noise_amplitude,
        })
    }

    /// Whether the burst is on at sample `index`.
    pub fn burst_active(&self, index: u64) -> bool {
        match &self.burst {
            Some(burst) => {
                let t = index as f64 / self.sample_rate;
                t.rem_euclid(burst.period_secs) < burst.duration_secs
            }
            None => false,
        }
    }

    /// Generates one amplitude per channel for sample `index`.
    pub fn generate(&mut self, index: u64) -> Vec<f64> {
        let t = index as f64 / self.sample_rate;
        let mut deterministic = self.offset;
        if let Some(freq) = self.line_noise_hz {
            deterministic += self.line_noise_amplitude * (2.0 * PI * freq * t).sin();
        }
        if self.burst_active(index) {
            if let Some(burst) = &self.burst {
                deterministic += burst.amplitude * (2.0 * PI * burst.freq_hz * t).sin();
            }
        }

        (0..self.channels)
            .map(|_| deterministic + self.noise.sample(&mut self.rng))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MockSourceConfig {
        MockSourceConfig {
            seed: Some(42),
            ..MockSourceConfig::default()
        }
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = SignalGenerator::new(&config()).unwrap();
        let mut b = SignalGenerator::new(&config()).unwrap();
        for i in 0..100 {
            assert_eq!(a.generate(i), b.generate(i));
        }
    }

    #[test]
    fn test_noise_has_configured_spread() {
        let mut generator = SignalGenerator::new(&MockSourceConfig {
            channels: 1,
            noise_std: 10.0,
            burst: None,
            ..config()
        })
        .unwrap();
        let values: Vec<f64> = (0..20_000).map(|i| generator.generate(i)[0]).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt();
        assert!(mean.abs() < 0.5, "mean {mean}");
        assert!((std - 10.0).abs() < 0.5, "std {std}");
    }

    #[test]
    fn test_burst_window_is_periodic() {
        let generator = SignalGenerator::new(&MockSourceConfig {
            sample_rate_hz: 100.0,
            burst: Some(BurstConfig {
                freq_hz: 10.0,
                amplitude: 60.0,
                period_secs: 4.0,
                duration_secs: 1.0,
            }),
            ..config()
        })
        .unwrap();
        assert!(generator.burst_active(0));
        assert!(generator.burst_active(99));
        assert!(!generator.burst_active(100));
        assert!(!generator.burst_active(399));
        assert!(generator.burst_active(400));
    }

    #[test]
    fn test_invalid_noise_is_rejected() {
        for noise_std in [-1.0, -f64::MIN_POSITIVE, f64::NAN, f64::INFINITY] {
            let result = SignalGenerator::new(&MockSourceConfig {
                noise_std,
                ..config()
            });
            assert!(
                matches!(result, Err(AcquisitionError::Configuration(_))),
                "noise_std {noise_std} was accepted"
            );
        }
    }

    #[test]
    fn test_zero_noise_is_silent() {
        let mut generator = SignalGenerator::new(&MockSourceConfig {
            noise_std: 0.0,
            burst: None,
            ..config()
        })
        .unwrap();
        assert!((0..100).all(|i| generator.generate(i).iter().all(|v| *v == 0.0)));
    }
}
