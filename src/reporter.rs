//! Observability for EM estimation runs.
//!
//! This module provides the [`EmReporter`] trait for debugging and
//! research instrumentation. Reporters receive callbacks at key points
//! during an EM run without polluting the estimation logic.
//!
//! # Zero-Cost Abstraction
//!
//! The default [`NoOpReporter`] compiles to zero overhead - all callback
//! methods are empty and will be optimized away by the compiler.
//!
//! # Use Cases
//!
//! - **Debugging**: Watch per-sequence log-likelihoods to find the
//!   sequence that destabilizes an estimate
//! - **Monitoring**: Forward per-iteration progress to the `log` facade
//!   ([`LogReporter`])
//! - **Research**: Collect convergence curves without history tracking

/// Observability trait for EM run execution.
///
/// Implement this trait to receive callbacks during a run. All methods
/// have default empty implementations, so you only need to override the
/// events you care about.
///
/// # Thread Safety
///
/// Reporters use `&mut self` for callbacks and are invoked from the
/// orchestrating thread only; with the `rayon` feature the parallel
/// expectation tasks are joined first and callbacks still arrive in
/// sequence order.
pub trait EmReporter {
    /// Called after one sequence's smoothing pass, with the sequence
    /// index and the log-likelihood of that pass.
    fn on_sequence_smoothed(&mut self, _sequence: usize, _log_likelihood: f64) {}

    /// Called after the per-sequence statistics are fused, with the
    /// total transition count.
    fn on_statistics_fused(&mut self, _transitions: usize) {}

    /// Called after the maximization step of an iteration, with the
    /// iteration index and the total log-likelihood of its expectation
    /// step.
    fn on_iteration_complete(&mut self, _iteration: usize, _log_likelihood: f64) {}
}

/// Reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl EmReporter for NoOpReporter {}

/// Reporter that forwards every event to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl EmReporter for LogReporter {
    fn on_sequence_smoothed(&mut self, sequence: usize, log_likelihood: f64) {
        log::trace!(
            "sequence {} smoothed: log-likelihood {:.6}",
            sequence,
            log_likelihood
        );
    }

    fn on_statistics_fused(&mut self, transitions: usize) {
        log::trace!("statistics fused: {} transitions", transitions);
    }

    fn on_iteration_complete(&mut self, iteration: usize, log_likelihood: f64) {
        log::debug!(
            "iteration {} complete: log-likelihood {:.6}",
            iteration,
            log_likelihood
        );
    }
}
