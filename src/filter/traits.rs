//! Core trait for filter variants
//!
//! The forward/backward recursion is written once and exposed behind a
//! covariance-representation seam: [`SequenceSmoother`] is implemented
//! by the square-root policy ([`super::sqrt::SquareRootFilter`], the
//! primary variant the EM estimator runs on) and the direct-covariance
//! policy ([`super::direct::DirectFilter`], used to cross-validate the
//! square-root recursion moment for moment).

use nalgebra::{DMatrix, DVector};

use crate::errors::FilterError;

/// A filter/smoother over one observation sequence.
///
/// Covariance accessors reconstruct a full matrix on demand; how the
/// covariance is represented internally is the implementor's policy.
pub trait SequenceSmoother {
    /// Run the forward pass over a sequence
    fn filter(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError>;

    /// Run the forward pass followed by the backward pass
    fn smooth(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError>;

    /// Length of the most recently processed sequence
    fn len(&self) -> usize;

    /// True before the first pass
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Predicted mean at `n` (0..=N)
    fn predicted_mean(&self, n: usize) -> &DVector<f64>;

    /// Predicted covariance at `n` (0..=N)
    fn predicted_covariance(&self, n: usize) -> DMatrix<f64>;

    /// Filtered mean at `n` (0..N)
    fn filtered_mean(&self, n: usize) -> &DVector<f64>;

    /// Filtered covariance at `n` (0..N)
    fn filtered_covariance(&self, n: usize) -> DMatrix<f64>;

    /// Smoothed mean at `n` (0..=N)
    fn smoothed_mean(&self, n: usize) -> &DVector<f64>;

    /// Smoothed covariance at `n` (0..=N)
    fn smoothed_covariance(&self, n: usize) -> DMatrix<f64>;

    /// Log-likelihood of the last filtered sequence
    fn log_likelihood(&self) -> f64;
}
