//! Per-sequence moment storage
//!
//! One [`MomentSequence`] holds everything a forward/backward pass over a
//! single observation sequence produces. It is owned by the filter that
//! computed it and reallocated only when the sequence length changes, so
//! repeated passes over same-length sequences run allocation-free.
//!
//! Index layout for a sequence of length `N` (observations `y_0..y_{N-1}`):
//!
//! - predicted moments: `N + 1` entries, `predicted[n]` is the moment of
//!   the hidden state before `y_n` is incorporated; `predicted[N]` is the
//!   one-step-ahead moment past the last observation
//! - filtered moments: `N` entries
//! - smoothed moments: `N + 1` entries; `smoothed[N] == predicted[N]`
//! - innovations and innovation-covariance roots: `N` entries
//! - cross roots: `N` entries; `cross[n]` is the `n_x × 2·n_x` row block
//!   `[J_n · S_s(n+1) | W_n]` of the joint root of the two consecutive
//!   smoothed states, so `cross_left · S_s(n+1)ᵀ` is the smoothed
//!   cross-covariance `Cov(x_n, x_{n+1})` and the block's self-product is
//!   the smoothed covariance at `n`

use nalgebra::{DMatrix, DVector};

use crate::common::triangular;
use crate::model::params::StateDims;

/// Filtered, predicted and smoothed moments of one observation sequence.
#[derive(Debug, Clone)]
pub struct MomentSequence {
    pub(crate) dims: StateDims,
    pub(crate) len: usize,
    pub(crate) predicted_means: Vec<DVector<f64>>,
    pub(crate) predicted_roots: Vec<DMatrix<f64>>,
    pub(crate) filtered_means: Vec<DVector<f64>>,
    pub(crate) filtered_roots: Vec<DMatrix<f64>>,
    pub(crate) smoothed_means: Vec<DVector<f64>>,
    pub(crate) smoothed_roots: Vec<DMatrix<f64>>,
    pub(crate) innovations: Vec<DVector<f64>>,
    pub(crate) innovation_roots: Vec<DMatrix<f64>>,
    pub(crate) cross_roots: Vec<DMatrix<f64>>,
    pub(crate) smoothed_valid: bool,
}

impl MomentSequence {
    /// Create empty storage for the given dimensions.
    pub fn new(dims: StateDims) -> Self {
        Self {
            dims,
            len: 0,
            predicted_means: Vec::new(),
            predicted_roots: Vec::new(),
            filtered_means: Vec::new(),
            filtered_roots: Vec::new(),
            smoothed_means: Vec::new(),
            smoothed_roots: Vec::new(),
            innovations: Vec::new(),
            innovation_roots: Vec::new(),
            cross_roots: Vec::new(),
            smoothed_valid: false,
        }
    }

    /// Resize storage for a sequence of length `n`.
    ///
    /// Reallocates only when the length actually changes; otherwise the
    /// existing buffers are reused as-is (they are fully overwritten by
    /// the next pass).
    pub(crate) fn ensure_len(&mut self, n: usize) {
        self.smoothed_valid = false;
        if self.len == n && !self.predicted_means.is_empty() {
            return;
        }
        let (n_x, n_y) = (self.dims.n_x, self.dims.n_y);
        self.len = n;
        self.predicted_means = (0..=n).map(|_| DVector::zeros(n_x)).collect();
        self.predicted_roots = (0..=n).map(|_| DMatrix::zeros(n_x, n_x)).collect();
        self.filtered_means = (0..n).map(|_| DVector::zeros(n_x)).collect();
        self.filtered_roots = (0..n).map(|_| DMatrix::zeros(n_x, n_x)).collect();
        self.smoothed_means = (0..=n).map(|_| DVector::zeros(n_x)).collect();
        self.smoothed_roots = (0..=n).map(|_| DMatrix::zeros(n_x, n_x)).collect();
        self.innovations = (0..n).map(|_| DVector::zeros(n_y)).collect();
        self.innovation_roots = (0..n).map(|_| DMatrix::zeros(n_y, n_y)).collect();
        self.cross_roots = (0..n).map(|_| DMatrix::zeros(n_x, 2 * n_x)).collect();
    }

    /// Sequence length `N`
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True before the first pass
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once a smoothing pass over the current sequence completed
    #[inline]
    pub fn is_smoothed(&self) -> bool {
        self.smoothed_valid
    }

    /// Predicted mean at `n` (0..=N)
    #[inline]
    pub fn predicted_mean(&self, n: usize) -> &DVector<f64> {
        &self.predicted_means[n]
    }

    /// Predicted covariance root at `n` (0..=N)
    #[inline]
    pub fn predicted_root(&self, n: usize) -> &DMatrix<f64> {
        &self.predicted_roots[n]
    }

    /// Filtered mean at `n` (0..N)
    #[inline]
    pub fn filtered_mean(&self, n: usize) -> &DVector<f64> {
        &self.filtered_means[n]
    }

    /// Filtered covariance root at `n` (0..N)
    #[inline]
    pub fn filtered_root(&self, n: usize) -> &DMatrix<f64> {
        &self.filtered_roots[n]
    }

    /// Smoothed mean at `n` (0..=N)
    #[inline]
    pub fn smoothed_mean(&self, n: usize) -> &DVector<f64> {
        &self.smoothed_means[n]
    }

    /// Smoothed covariance root at `n` (0..=N)
    #[inline]
    pub fn smoothed_root(&self, n: usize) -> &DMatrix<f64> {
        &self.smoothed_roots[n]
    }

    /// Innovation at `n` (0..N)
    #[inline]
    pub fn innovation(&self, n: usize) -> &DVector<f64> {
        &self.innovations[n]
    }

    /// Innovation-covariance root at `n` (0..N)
    #[inline]
    pub fn innovation_root(&self, n: usize) -> &DMatrix<f64> {
        &self.innovation_roots[n]
    }

    /// Cross root `[J_n · S_s(n+1) | W_n]` at `n` (0..N)
    #[inline]
    pub fn cross_root(&self, n: usize) -> &DMatrix<f64> {
        &self.cross_roots[n]
    }

    /// Predicted covariance at `n`, reconstructed from its root
    pub fn predicted_covariance(&self, n: usize) -> DMatrix<f64> {
        &self.predicted_roots[n] * self.predicted_roots[n].transpose()
    }

    /// Filtered covariance at `n`, reconstructed from its root
    pub fn filtered_covariance(&self, n: usize) -> DMatrix<f64> {
        &self.filtered_roots[n] * self.filtered_roots[n].transpose()
    }

    /// Smoothed covariance at `n`, reconstructed from its root
    pub fn smoothed_covariance(&self, n: usize) -> DMatrix<f64> {
        &self.smoothed_roots[n] * self.smoothed_roots[n].transpose()
    }

    /// Smoothed cross-covariance `Cov(x_n, x_{n+1})` at `n` (0..N)
    pub fn smoothed_cross_covariance(&self, n: usize) -> DMatrix<f64> {
        let n_x = self.dims.n_x;
        let left = self.cross_roots[n].view((0, 0), (n_x, n_x));
        &left * self.smoothed_roots[n + 1].transpose()
    }

    /// Log-likelihood of the sequence under the parameters of the last
    /// forward pass, evaluated from the stored innovation sequence:
    ///
    /// ```text
    /// Σ_n −½ (n_y·ln 2π + ln det S_n + ν_nᵀ S_n⁻¹ ν_n)
    /// ```
    ///
    /// The determinant and the quadratic form both come from the stored
    /// triangular innovation roots.
    pub fn log_likelihood(&self) -> f64 {
        let n_y = self.dims.n_y;
        let norm = n_y as f64 * (2.0 * std::f64::consts::PI).ln();
        let mut total = 0.0;
        let mut z = DVector::zeros(n_y);
        for n in 0..self.len {
            let root = &self.innovation_roots[n];
            let log_det = triangular::log_det_from_root(root, (0, 0), n_y);
            z.copy_from(&self.innovations[n]);
            // A singular root is rejected during the forward pass, so the
            // solve cannot fail here.
            let _ = triangular::solve_upper_in_place(root, (0, 0), n_y, &mut z);
            total += -0.5 * (norm + log_det + z.norm_squared());
        }
        total
    }
}
