use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use marlet_types::{AcquisitionError, Sample};
use tokio::time::Instant;

use super::mock_data_generator::{current_timestamp_micros, SignalGenerator};
use super::MockSourceConfig;
use crate::types::{SampleSource, SourceStatus};

/// How the mock hands out samples.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pacing {
    /// Samples become available at the configured rate on the tokio clock.
    RealTime,
    /// Every call returns exactly this many sample frames without waiting.
    Fixed(usize),
}

/// A sample source that does not access any hardware.
pub struct MockSource {
    config: MockSourceConfig,
    generator: SignalGenerator,
    max_batch: usize,
    pacing: Pacing,
    status: SourceStatus,
    // Wall-clock timestamp of the first sample (microseconds since epoch)
    base_timestamp: u64,
    started_at: Option<Instant>,
    // Total sample frames generated since initialize
    sample_count: u64,
}

impl MockSource {
    pub fn new(config: MockSourceConfig, max_batch: usize) -> Result<Self, AcquisitionError> {
        if !(config.sample_rate_hz.is_finite() && config.sample_rate_hz > 0.0) {
            return Err(AcquisitionError::Configuration(format!(
                "invalid sample rate {}",
                config.sample_rate_hz
            )));
        }
        if config.channels == 0 {
            return Err(AcquisitionError::Configuration(
                "At least one channel must be configured".to_string(),
            ));
        }
        if max_batch == 0 {
            return Err(AcquisitionError::Configuration("max_batch must be at least 1".to_string()));
        }

        let generator = SignalGenerator::new(&config)?;
        info!("MockSource created with config: {:?}", config);

        Ok(Self {
            config,
            generator,
            max_batch,
            pacing: Pacing::RealTime,
            status: SourceStatus::NotInitialized,
            base_timestamp: 0,
            started_at: None,
            sample_count: 0,
        })
    }

    /// Hand out `frames` sample frames per call instead of pacing on the clock.
    pub fn with_fixed_batch(mut self, frames: usize) -> Self {
        self.pacing = Pacing::Fixed(frames.max(1));
        self
    }

    fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.sample_rate_hz)
    }

    fn timestamp_for(&self, index: u64) -> u64 {
        self.base_timestamp + (index as f64 * 1_000_000.0 / self.config.sample_rate_hz) as u64
    }

    fn generate_frames(&mut self, frames: usize) -> Vec<Sample> {
        let mut batch = Vec::with_capacity(frames * self.config.channels);
        for _ in 0..frames {
            let index = self.sample_count;
            self.sample_count += 1;
            let timestamp_us = self.timestamp_for(index);
            for (channel, amplitude) in self.generator.generate(index).into_iter().enumerate() {
                batch.push(Sample::new(channel, amplitude, timestamp_us));
            }
        }
        batch
    }
}

#[async_trait]
impl SampleSource for MockSource {
    fn initialize(&mut self) -> Result<(), AcquisitionError> {
        self.base_timestamp = current_timestamp_micros()?;
        self.started_at = Some(Instant::now());
        self.sample_count = 0;
        self.status = SourceStatus::Running;
        info!("MockSource initialized at {} Hz", self.config.sample_rate_hz);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Vec<Sample>, AcquisitionError> {
        if self.status != SourceStatus::Running {
            return Err(AcquisitionError::NotInitialized);
        }

        let frames = match self.pacing {
            Pacing::Fixed(frames) => frames,
            Pacing::RealTime => {
                let started_at = self.started_at.ok_or(AcquisitionError::NotInitialized)?;
                let interval = self.sample_interval();
                // wait until at least one sample is due
                let next_due = started_at + interval.mul_f64(self.sample_count as f64);
                tokio::time::sleep_until(next_due).await;

                let elapsed = started_at.elapsed().as_secs_f64();
                let due = (elapsed * self.config.sample_rate_hz) as u64 + 1;
                let pending = due.saturating_sub(self.sample_count) as usize;
                if pending > self.max_batch {
                    debug!("MockSource behind by {} frames, capping batch", pending - self.max_batch);
                }
                pending.clamp(1, self.max_batch)
            }
        };

        Ok(self.generate_frames(frames))
    }

    fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        debug!("Shutting down MockSource");
        self.status = SourceStatus::Stopped;
        self.started_at = None;
        info!("MockSource shutdown complete after {} frames", self.sample_count);
        Ok(())
    }

    fn status(&self) -> SourceStatus {
        self.status.clone()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        if self.status == SourceStatus::Running {
            warn!("MockSource dropped without calling shutdown() first.");
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(channels: usize) -> MockSourceConfig {
        MockSourceConfig {
            channels,
            seed: Some(7),
            ..MockSourceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fixed_batch_interleaves_channels() {
        let mut source = MockSource::new(config(3), 64).unwrap().with_fixed_batch(4);
        source.initialize().unwrap();

        let batch = source.next_batch().await.unwrap();
        assert_eq!(batch.len(), 12);
        assert_eq!(
            batch.iter().take(3).map(|s| s.channel).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // frames share a timestamp, consecutive frames are 1/256 s apart
        assert_eq!(batch[0].timestamp_us, batch[2].timestamp_us);
        assert_eq!(batch[3].timestamp_us - batch[0].timestamp_us, 3_906);
        source.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_time_pacing_follows_sample_rate() {
        let mut source = MockSource::new(config(1), 64).unwrap();
        source.initialize().unwrap();

        let first = source.next_batch().await.unwrap();
        assert_eq!(first.len(), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        let second = source.next_batch().await.unwrap();
        // 100ms at 256 Hz is ~25 samples
        assert!((24..=27).contains(&second.len()), "got {}", second.len());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(source.next_batch().await.unwrap().len(), 64);
        source.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let mut source = MockSource::new(config(1), 8).unwrap();
        assert_eq!(source.status(), SourceStatus::NotInitialized);
        assert_eq!(source.next_batch().await, Err(AcquisitionError::NotInitialized));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(MockSource::new(config(0), 8).is_err());
        assert!(MockSource::new(config(1), 0).is_err());
        let bad_rate = MockSourceConfig {
            sample_rate_hz: 0.0,
            ..config(1)
        };
        assert!(MockSource::new(bad_rate, 8).is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let parsed: MockSourceConfig = serde_json::from_str(r#"{ "noise_std": 20.0 }"#).unwrap();
        assert_eq!(parsed.noise_std, 20.0);
        assert_eq!(parsed.sample_rate_hz, 256.0);
        assert!(parsed.burst.is_some());
    }
}
