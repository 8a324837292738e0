//! Observability module
//!
//! Failure sinks and outcome counters. The crate only emits `tracing`
//! events; installing a subscriber is up to the application.

pub mod metrics;
pub mod sink;

pub use metrics::FailureOutcome;
pub use sink::{FailureRecord, FailureSink, JsonLinesSink, TracingSink};
