//! Common types and traits for sample sources

use async_trait::async_trait;
use marlet_types::{AcquisitionError, Sample};

/// Status of a sample source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    /// Source is not initialized
    NotInitialized,
    /// Source is delivering samples
    Running,
    /// Source was shut down
    Stopped,
    /// Source encountered an error
    Error(String),
}

/// Trait that every acquisition collaborator must implement.
///
/// The control loop awaits `next_batch` once per tick, so implementations should hand
/// over whatever has accumulated since the previous call and only wait when nothing
/// is available yet.
#[async_trait]
pub trait SampleSource: Send {
    /// Prepare the source for delivering samples.
    fn initialize(&mut self) -> Result<(), AcquisitionError>;

    /// Wait for the next batch of samples, in acquisition order.
    ///
    /// Any error is terminal for the session.
    async fn next_batch(&mut self) -> Result<Vec<Sample>, AcquisitionError>;

    /// Release the source. Calling it twice is harmless.
    fn shutdown(&mut self) -> Result<(), AcquisitionError>;

    /// Get current source status
    fn status(&self) -> SourceStatus;

    /// Short human-readable name used in logs.
    fn name(&self) -> &str;
}
