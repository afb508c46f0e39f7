//! Audit stream: one entry per dispatch attempt or skipped attempt.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use csv::Writer;
use marlet_types::AuditRecord;
use tracing::{error, info, warn};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Emits audit records as `tracing` events (target `marlet::audit`) and optionally as
/// CSV rows.
///
/// A failing CSV sink is reported once and then dropped; the tracing stream continues.
pub struct AuditLog {
    csv: Option<Writer<Box<dyn Write + Send>>>,
    last_flush: Instant,
    records: u64,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// Tracing-only audit log.
    pub fn new() -> Self {
        Self {
            csv: None,
            last_flush: Instant::now(),
            records: 0,
        }
    }

    pub fn with_csv_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        info!("Writing audit records to {}", path.display());
        Ok(Self::with_writer(file))
    }

    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        let boxed: Box<dyn Write + Send> = Box::new(writer);
        Self {
            csv: Some(Writer::from_writer(boxed)),
            ..Self::new()
        }
    }

    pub fn record(&mut self, record: &AuditRecord) {
        self.records += 1;
        let error_text = record.error.as_deref().unwrap_or("");
        if record.succeeded {
            info!(
                target: "marlet::audit",
                tick = record.tick,
                timestamp_us = record.timestamp_us,
                power = record.power,
                attempted = record.attempted,
                succeeded = record.succeeded,
                "dispatch"
            );
        } else {
            warn!(
                target: "marlet::audit",
                tick = record.tick,
                timestamp_us = record.timestamp_us,
                power = record.power,
                attempted = record.attempted,
                succeeded = record.succeeded,
                error = error_text,
                "dispatch"
            );
        }

        let Some(writer) = self.csv.as_mut() else {
            return;
        };
        let mut result = writer.serialize(record).map_err(io::Error::from);
        if result.is_ok() && self.last_flush.elapsed() >= FLUSH_INTERVAL {
            result = writer.flush();
            self.last_flush = Instant::now();
        }
        if let Err(e) = result {
            error!("Audit CSV write failed, continuing with log output only: {}", e);
            self.csv = None;
        }
    }

    /// Flushes the CSV sink and returns the number of records seen.
    pub fn finish(&mut self) -> u64 {
        if let Some(writer) = self.csv.as_mut() {
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit CSV: {}", e);
            }
        }
        self.records
    }
}
