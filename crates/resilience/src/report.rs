//! Terminal-error reporting seam
//!
//! Every terminal failure this layer raises (exhausted retries, open
//! circuit, non-retryable error) is reported exactly once to an external
//! collaborator before being returned to the caller. The default
//! implementation emits a structured `tracing` event; deployments wire in
//! their own sink for alerting.

use std::collections::HashMap;
use std::time::Duration;

use tracing::error;

/// Structured context for a terminal failure
#[derive(Debug)]
pub struct ErrorReport<'a> {
    /// Logical operation name, e.g. `"transcription"`
    pub operation: &'a str,
    /// Number of attempts that were made (0 when the circuit fast-failed)
    pub attempts: u32,
    /// Wall-clock time from first attempt to the terminal failure
    pub elapsed: Duration,
    /// Display rendering of the terminal error
    pub error: String,
    /// Caller-supplied attribution tags; never used for control flow
    pub context: &'a HashMap<String, String>,
}

/// Sink for terminal failure reports
pub trait ErrorReporter: Send + Sync {
    /// Deliver one report. Implementations must not panic and should treat
    /// delivery as best-effort.
    fn report(&self, report: &ErrorReport<'_>);
}

/// Default reporter emitting structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport<'_>) {
        error!(
            operation = report.operation,
            attempts = report.attempts,
            elapsed_ms = report.elapsed.as_millis() as u64,
            error = %report.error,
            context = ?report.context,
            "outbound call failed terminally"
        );
    }
}

/// Reporter that discards everything, for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ErrorReporter for NullReporter {
    fn report(&self, _report: &ErrorReport<'_>) {}
}
