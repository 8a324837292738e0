//! Guard outcome counters.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.

use metrics::{counter, describe_counter};

/// How a caught failure left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// A handler ran.
    Handled,
    /// No registered type matched; the failure propagated.
    Unhandled,
    /// A handler matched but debug mode re-raised the failure.
    Bypassed,
}

impl FailureOutcome {
    /// Label value used on `guardcall_failures_total`.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Unhandled => "unhandled",
            Self::Bypassed => "bypassed",
        }
    }
}

/// Registers metric descriptions with the global recorder.
///
/// Call after installing a recorder; harmless otherwise.
pub fn describe_metrics() {
    describe_counter!(
        "guardcall_invocations_total",
        "Total number of guarded invocations started"
    );
    describe_counter!(
        "guardcall_failures_total",
        "Failures raised by guarded bodies, by outcome"
    );
    describe_counter!("guardcall_else_total", "Else handlers executed");
    describe_counter!(
        "guardcall_finally_overrides_total",
        "Results replaced by a finally handler"
    );
}

/// Records the start of a guarded invocation.
pub fn record_invocation(logger: &str) {
    counter!("guardcall_invocations_total", "logger" => logger.to_owned()).increment(1);
}

/// Records a failure leaving the dispatcher.
pub fn record_failure(logger: &str, outcome: FailureOutcome) {
    counter!(
        "guardcall_failures_total",
        "logger" => logger.to_owned(),
        "outcome" => outcome.as_label(),
    )
    .increment(1);
}

/// Records an else handler run.
pub fn record_else(logger: &str) {
    counter!("guardcall_else_total", "logger" => logger.to_owned()).increment(1);
}

/// Records a finally handler replacing the pending result.
pub fn record_finally_override(logger: &str) {
    counter!("guardcall_finally_overrides_total", "logger" => logger.to_owned()).increment(1);
}
