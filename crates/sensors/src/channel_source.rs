use async_trait::async_trait;
use flume::{Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use marlet_types::{AcquisitionError, Sample};

use crate::types::{SampleSource, SourceStatus};

/// Bridges an external acquisition task into the control loop.
///
/// The acquisition side pushes samples into a bounded channel; each `next_batch` waits
/// for the first sample and then drains whatever else is queued, up to `max_batch`.
pub struct ChannelSource {
    rx: Option<Receiver<Sample>>,
    max_batch: usize,
    status: SourceStatus,
}

impl ChannelSource {
    /// Creates the source together with the sender the acquisition task should own.
    pub fn bounded(capacity: usize, max_batch: usize) -> (Sender<Sample>, Self) {
        let (tx, rx) = flume::bounded(capacity);
        let source = Self {
            rx: Some(rx),
            max_batch: max_batch.max(1),
            status: SourceStatus::NotInitialized,
        };
        (tx, source)
    }
}

#[async_trait]
impl SampleSource for ChannelSource {
    fn initialize(&mut self) -> Result<(), AcquisitionError> {
        if self.rx.is_none() {
            return Err(AcquisitionError::Disconnected);
        }
        self.status = SourceStatus::Running;
        info!("ChannelSource initialized (max_batch={})", self.max_batch);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Vec<Sample>, AcquisitionError> {
        if self.status != SourceStatus::Running {
            return Err(AcquisitionError::NotInitialized);
        }
        let rx = self.rx.as_ref().ok_or(AcquisitionError::Disconnected)?;

        let first = match rx.recv_async().await {
            Ok(sample) => sample,
            Err(_) => {
                warn!("ChannelSource: all senders dropped");
                self.status = SourceStatus::Error("disconnected".to_string());
                return Err(AcquisitionError::Disconnected);
            }
        };

        let mut batch = Vec::with_capacity(self.max_batch);
        batch.push(first);
        while batch.len() < self.max_batch {
            match rx.try_recv() {
                Ok(sample) => batch.push(sample),
                // a disconnect surfaces on the next call, after the queued samples are used
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(batch)
    }

    fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        if self.rx.take().is_some() {
            debug!("ChannelSource receiver dropped");
        }
        self.status = SourceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> SourceStatus {
        self.status.clone()
    }

    fn name(&self) -> &str {
        "channel"
    }
}
