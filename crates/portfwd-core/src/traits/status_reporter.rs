// # Status Reporter Trait
//
// Sink for the operator-facing status lines, e.g.
// `Port forward => Mapping removed`. The wording of these lines is relied on
// by log scrapers and is kept stable.
//
// ## Implementations
//
// - `tracing` events: `crate::reporter::TracingReporter`

/// Trait for status line sinks
///
/// Reporting must be cheap and must never fail: the lifecycle manager calls
/// it from inside `maintain` and from the engine's logging bridge.
pub trait StatusReporter: Send + Sync {
    /// Record one status line
    fn report(&self, line: &str);
}
