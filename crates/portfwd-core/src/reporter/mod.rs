// # Status Reporter Implementations

use crate::traits::StatusReporter;
use tracing::info;

/// Reporter that emits every status line as a `tracing` info event on the
/// `portfwd::status` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl TracingReporter {
    /// Create a new tracing reporter
    pub fn new() -> Self {
        Self
    }
}

impl StatusReporter for TracingReporter {
    fn report(&self, line: &str) {
        info!(target: "portfwd::status", "{}", line);
    }
}
