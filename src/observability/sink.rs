//! Failure sinks.
//!
//! When a failure is caught and a handler has been found for it, the guard
//! hands a [`FailureRecord`] to its [`FailureSink`] before doing anything
//! else (including a debug bypass). The default sink logs through
//! `tracing`; [`JsonLinesSink`] writes newline-delimited JSON.

use std::backtrace::BacktraceStatus;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::failure::{Failure, FailureType};

/// Structured description of a caught failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    /// When the failure was caught.
    pub timestamp: DateTime<Utc>,
    /// Logger name of the guard that caught it.
    pub logger: String,
    /// Registered type the failure resolved to.
    pub failure_type: String,
    /// Display form of the failure.
    pub message: String,
    /// Display forms of the `source()` chain below the failure.
    pub causes: Vec<String>,
    /// Captured backtrace, when backtraces are enabled.
    pub backtrace: Option<String>,
}

impl FailureRecord {
    /// Builds a record for `failure`, resolved to `failure_type`.
    #[must_use]
    pub fn new(logger: &str, failure: &Failure, failure_type: &FailureType) -> Self {
        let backtrace = match failure.backtrace().status() {
            BacktraceStatus::Captured => Some(failure.backtrace().to_string()),
            _ => None,
        };
        Self {
            timestamp: Utc::now(),
            logger: logger.to_owned(),
            failure_type: failure_type.name(),
            message: failure.to_string(),
            causes: failure.chain().skip(1).map(ToString::to_string).collect(),
            backtrace,
        }
    }
}

/// Receives a record whenever a guard catches a failure it has a handler for.
///
/// Sinks must not fail the invocation; errors inside a sink are swallowed.
pub trait FailureSink: Send + Sync {
    /// Records one caught failure.
    fn record(&self, record: &FailureRecord);
}

/// Logs caught failures at `error` level through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn record(&self, record: &FailureRecord) {
        tracing::error!(
            logger = %record.logger,
            failure_type = %record.failure_type,
            causes = ?record.causes,
            backtrace = record.backtrace.as_deref().unwrap_or(""),
            "[{}] failure caught: {}",
            record.logger,
            record.message,
        );
    }
}

/// Serialized line: sequence number plus the flattened record.
#[derive(Serialize)]
struct RecordEnvelope<'a> {
    sequence: u64,
    #[serde(flatten)]
    record: &'a FailureRecord,
}

/// Writes each record as one JSON line with a monotonically increasing
/// `sequence` field.
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl JsonLinesSink {
    /// Creates a sink writing to `writer`.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Number of records written so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl FailureSink for JsonLinesSink {
    fn record(&self, record: &FailureRecord) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = RecordEnvelope { sequence, record };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
