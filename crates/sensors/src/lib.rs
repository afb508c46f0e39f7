pub mod channel_source;
pub mod mock_eeg;
pub mod types;

// Re-export the main types that users need
pub use channel_source::ChannelSource;
pub use mock_eeg::{BurstConfig, MockSource, MockSourceConfig};
pub use types::{SampleSource, SourceStatus};
