//! EM iteration history
//!
//! Optional append-only record of the parameter trajectory. The entry
//! for iteration `i` holds the parameters produced by that iteration's
//! maximization step together with the log-likelihood evaluated during
//! the same iteration's expectation step, i.e. under the pre-update
//! parameters. Under that convention the recorded log-likelihoods are
//! non-decreasing (within floating tolerance) for a correctly working
//! estimator, which is the property callers watch instead of a built-in
//! convergence check.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// One recorded EM iteration.
#[derive(Debug, Clone, Serialize)]
pub struct EmIteration {
    /// Initial state mean after this iteration
    pub t0: DVector<f64>,
    /// Initial covariance root after this iteration
    pub q0_root: DMatrix<f64>,
    /// Transition matrix after this iteration
    pub f: DMatrix<f64>,
    /// Noise covariance root after this iteration
    pub q_root: DMatrix<f64>,
    /// Total log-likelihood of the expectation step of this iteration
    pub log_likelihood: f64,
}

/// Append-only history of an EM run; read-only once the run finishes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmTrace {
    iterations: Vec<EmIteration>,
}

impl EmTrace {
    /// Create an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: EmIteration) {
        self.iterations.push(entry);
    }

    /// Number of recorded iterations
    #[inline]
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    /// True if nothing was recorded
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// All recorded iterations in order
    #[inline]
    pub fn iterations(&self) -> &[EmIteration] {
        &self.iterations
    }

    /// Last recorded iteration
    #[inline]
    pub fn last(&self) -> Option<&EmIteration> {
        self.iterations.last()
    }

    /// The log-likelihood sequence, in iteration order
    pub fn log_likelihoods(&self) -> Vec<f64> {
        self.iterations.iter().map(|e| e.log_likelihood).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_accumulates_in_order() {
        let mut trace = EmTrace::new();
        assert!(trace.is_empty());
        for i in 0..3 {
            trace.push(EmIteration {
                t0: DVector::zeros(2),
                q0_root: DMatrix::identity(2, 2),
                f: DMatrix::identity(2, 2),
                q_root: DMatrix::identity(2, 2),
                log_likelihood: i as f64,
            });
        }
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.log_likelihoods(), vec![0.0, 1.0, 2.0]);
        assert_eq!(trace.last().unwrap().log_likelihood, 2.0);
    }
}
