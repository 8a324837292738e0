//! Shared fixtures for guard integration tests: failure types and a sink
//! that remembers what it was given.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use guardcall::observability::{FailureRecord, FailureSink};
use thiserror::Error;

/// Value-level failure carrying a message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValueFailure {
    pub message: String,
}

impl ValueFailure {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// I/O-level failure.
#[derive(Debug, Error)]
#[error("io failure: {0}")]
pub struct IoFailure(pub String);

/// Sink that stores every record it receives.
#[derive(Default)]
pub struct CapturingSink {
    records: Mutex<Vec<FailureRecord>>,
}

impl CapturingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl FailureSink for CapturingSink {
    fn record(&self, record: &FailureRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Shared call counter for asserting how often a stage ran.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
