//! Workspace buffers for the square-root recursion
//!
//! Pre-allocated buffers to avoid repeated allocations in hot loops.
//! One workspace is owned per filter instance, sized once at setup from
//! the dimension split; every per-step reduction and solve runs inside
//! these buffers.

use nalgebra::{DMatrix, DVector};

use crate::model::params::StateDims;

/// Pre-allocated scratch for prediction, update and smoothing steps.
#[derive(Debug, Clone)]
pub struct FilterWorkspace {
    /// Update pre-array ((n_y + n_x) × (n_y + n_x))
    pub(crate) update_array: DMatrix<f64>,
    /// Prediction pre-array (n_x × 2·n_x)
    pub(crate) predict_array: DMatrix<f64>,
    /// Smoothing pre-array (2·n_x × 2·n_x)
    pub(crate) smooth_array: DMatrix<f64>,
    /// Smoothed-root assembly array (n_x × 2·n_x)
    pub(crate) smooth_root_array: DMatrix<f64>,
    /// Filter gain (n_x × n_y)
    pub(crate) gain_k: DMatrix<f64>,
    /// Smoother gain (n_x × n_x)
    pub(crate) gain_j: DMatrix<f64>,
    /// Innovation buffer (n_y)
    pub(crate) innovation: DVector<f64>,
    /// Mean buffer (n_x)
    pub(crate) mean_a: DVector<f64>,
    /// Second mean buffer (n_x)
    pub(crate) mean_b: DVector<f64>,
    /// Householder scratch (longest pre-array row)
    pub(crate) scratch: DVector<f64>,
}

impl FilterWorkspace {
    /// Allocate all buffers for the given dimension split.
    pub fn new(dims: StateDims) -> Self {
        let (n_x, n_y) = (dims.n_x, dims.n_y);
        let d = n_x + n_y;
        let scratch_len = d.max(2 * n_x);
        Self {
            update_array: DMatrix::zeros(d, d),
            predict_array: DMatrix::zeros(n_x, 2 * n_x),
            smooth_array: DMatrix::zeros(2 * n_x, 2 * n_x),
            smooth_root_array: DMatrix::zeros(n_x, 2 * n_x),
            gain_k: DMatrix::zeros(n_x, n_y),
            gain_j: DMatrix::zeros(n_x, n_x),
            innovation: DVector::zeros(n_y),
            mean_a: DVector::zeros(n_x),
            mean_b: DVector::zeros(n_x),
            scratch: DVector::zeros(scratch_len),
        }
    }
}
