//! EM sufficient-statistics accumulation
//!
//! After a smoothing pass, one backward walk over the sequence builds
//! the correlation sums the maximization step needs, in square-root
//! factored form. An accumulator holds an upper-triangular root of the
//! running sum; folding in one time index appends that index's
//! contribution columns (a covariance-root block plus a mean column) and
//! re-triangularizes, so the sum is never un-factored.
//!
//! Two accumulators are produced per sequence, both correlating the
//! stacked (state, previous-observation) vector `u_n = [x_n; y_{n-1}]`:
//!
//! - `transition` over `[x_{n+1}; u_n]` (next hidden state first)
//! - `observation` over `[y_n; u_n]` (current observation first)
//!
//! Keeping the correlated quantity in the leading rows puts the
//! (state, observation)-correlation root in the trailing diagonal block
//! of the triangularized accumulator and the regression residual root in
//! the leading one, which is exactly the split the maximization step
//! back-substitutes against.
//!
//! Per-step cost depends only on the state dimension; the walk runs
//! `n = N` down to `1` and is linear in the sequence length.

use nalgebra::{DMatrix, DVector};

use crate::common::triangular;
use crate::errors::FilterError;
use crate::filter::moments::MomentSequence;
use crate::model::params::StateSpaceParams;

/// Square-root factored running correlation sum.
///
/// Maintains an upper-triangular `dim × dim` root `R` with `R · Rᵀ`
/// equal to the accumulated sum of outer products.
#[derive(Debug, Clone)]
pub struct SqrtAccumulator {
    dim: usize,
    root: DMatrix<f64>,
    fold_buf: DMatrix<f64>,
    scratch: DVector<f64>,
}

impl SqrtAccumulator {
    /// Create an empty accumulator for `dim`-vectors whose contributions
    /// have at most `extra` columns.
    pub(crate) fn new(dim: usize, extra: usize) -> Self {
        Self {
            dim,
            root: DMatrix::zeros(dim, dim),
            fold_buf: DMatrix::zeros(dim, dim + extra),
            scratch: DVector::zeros(dim + extra),
        }
    }

    /// Accumulated dimension
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Root of the accumulated sum
    #[inline]
    pub fn root(&self) -> &DMatrix<f64> {
        &self.root
    }

    /// The accumulated sum itself, `R · Rᵀ`. Reconstruction is for
    /// inspection and tests; the estimation path stays factored.
    pub fn implied_sum(&self) -> DMatrix<f64> {
        &self.root * self.root.transpose()
    }

    /// Fold `contribution · contributionᵀ` into the sum and
    /// re-triangularize.
    pub(crate) fn fold(&mut self, contribution: &DMatrix<f64>) {
        let cols = contribution.ncols();
        debug_assert_eq!(contribution.nrows(), self.dim);
        debug_assert!(self.dim + cols <= self.fold_buf.ncols());

        self.fold_buf
            .view_mut((0, 0), (self.dim, self.dim))
            .copy_from(&self.root);
        self.fold_buf
            .view_mut((0, self.dim), (self.dim, cols))
            .copy_from(contribution);
        triangular::reduce_to_upper(&mut self.fold_buf, self.dim, self.dim + cols, &mut self.scratch);
        self.root
            .copy_from(&self.fold_buf.view((0, 0), (self.dim, self.dim)));
    }
}

/// Per-sequence sufficient statistics for one EM iteration.
#[derive(Debug, Clone)]
pub struct SufficientStatistics {
    /// Correlation of `[x_{n+1}; x_n; y_{n-1}]` (dim `n_x + n_t`)
    pub(crate) transition: SqrtAccumulator,
    /// Correlation of `[y_n; x_n; y_{n-1}]` (dim `n_y + n_t`)
    pub(crate) observation: SqrtAccumulator,
    /// Number of transitions folded in (the sequence length)
    pub(crate) transitions: usize,
    /// First smoothed mean (hidden block)
    pub(crate) initial_mean: DVector<f64>,
    /// First smoothed covariance root (hidden block)
    pub(crate) initial_root: DMatrix<f64>,
}

impl SufficientStatistics {
    /// Root of the transition correlation sum
    #[inline]
    pub fn transition_root(&self) -> &DMatrix<f64> {
        self.transition.root()
    }

    /// Root of the observation correlation sum
    #[inline]
    pub fn observation_root(&self) -> &DMatrix<f64> {
        self.observation.root()
    }

    /// Number of transitions folded in
    #[inline]
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    /// First smoothed mean of the sequence
    #[inline]
    pub fn initial_mean(&self) -> &DVector<f64> {
        &self.initial_mean
    }

    /// First smoothed covariance root of the sequence
    #[inline]
    pub fn initial_root(&self) -> &DMatrix<f64> {
        &self.initial_root
    }
}

/// Build the sufficient statistics of one smoothed sequence.
///
/// # Errors
/// [`FilterError::SmootherNotRun`] when the moments do not hold a
/// completed smoothing pass for this sequence.
pub fn accumulate(
    params: &StateSpaceParams,
    moments: &MomentSequence,
    observations: &[DVector<f64>],
) -> Result<SufficientStatistics, FilterError> {
    if !moments.is_smoothed() {
        return Err(FilterError::SmootherNotRun);
    }
    if observations.len() != moments.len() {
        return Err(FilterError::DimensionMismatch {
            expected: moments.len(),
            actual: observations.len(),
            context: "observation sequence for accumulation".to_string(),
        });
    }

    let dims = params.dims();
    let (n_x, n_y, n_t) = (dims.n_x, dims.n_y, dims.n_t());
    let n_steps = moments.len();
    let cov_cols = 2 * n_x;

    let mut stats = SufficientStatistics {
        transition: SqrtAccumulator::new(n_x + n_t, cov_cols + 1),
        observation: SqrtAccumulator::new(n_y + n_t, cov_cols + 1),
        transitions: n_steps,
        initial_mean: moments.smoothed_mean(0).clone(),
        initial_root: moments.smoothed_root(0).clone(),
    };

    let t0_y = params.t0_y().into_owned();
    let mut trans_c = DMatrix::zeros(n_x + n_t, cov_cols + 1);
    let mut obs_c = DMatrix::zeros(n_y + n_t, cov_cols + 1);

    for n in (0..n_steps).rev() {
        let y_cur = &observations[n];
        let y_prev = if n == 0 { &t0_y } else { &observations[n - 1] };

        // [x_{n+1}; x_n; y_{n-1}]: the joint smoothed root of the two
        // consecutive hidden states plus the observed lag as a pure mean
        // row block.
        trans_c
            .view_mut((0, 0), (n_x, n_x))
            .copy_from(moments.smoothed_root(n + 1));
        trans_c
            .view_mut((n_x, 0), (n_x, cov_cols))
            .copy_from(moments.cross_root(n));
        trans_c
            .view_mut((0, cov_cols), (n_x, 1))
            .copy_from(moments.smoothed_mean(n + 1));
        trans_c
            .view_mut((n_x, cov_cols), (n_x, 1))
            .copy_from(moments.smoothed_mean(n));
        trans_c
            .view_mut((2 * n_x, cov_cols), (n_y, 1))
            .copy_from(y_prev);
        stats.transition.fold(&trans_c);

        // [y_n; x_n; y_{n-1}]: only the hidden state carries covariance.
        obs_c
            .view_mut((n_y, 0), (n_x, cov_cols))
            .copy_from(moments.cross_root(n));
        obs_c.view_mut((0, cov_cols), (n_y, 1)).copy_from(y_cur);
        obs_c
            .view_mut((n_y, cov_cols), (n_x, 1))
            .copy_from(moments.smoothed_mean(n));
        obs_c
            .view_mut((n_y + n_x, cov_cols), (n_y, 1))
            .copy_from(y_prev);
        stats.observation.fold(&obs_c);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::sqrt::SquareRootFilter;
    use crate::model::params::{StateDims, StateSpaceParams};

    fn params() -> StateSpaceParams {
        StateSpaceParams::new(
            StateDims::new(1, 1),
            DVector::from_vec(vec![0.2, -0.3]),
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 2, &[0.9, 0.0, 0.8, 0.1]),
            DMatrix::from_row_slice(2, 2, &[0.2, 0.05, 0.0, 0.3]),
        )
        .unwrap()
    }

    fn observations(n: usize) -> Vec<DVector<f64>> {
        (0..n)
            .map(|i| DVector::from_vec(vec![(i as f64 * 0.67).sin() * 0.9]))
            .collect()
    }

    #[test]
    fn test_accumulate_requires_smoothing() {
        let params = params();
        let mut filter = SquareRootFilter::new(params.clone()).unwrap();
        let obs = observations(5);
        filter.filter(&obs).unwrap();
        let err = accumulate(&params, filter.moments(), &obs).unwrap_err();
        assert_eq!(err, FilterError::SmootherNotRun);
    }

    #[test]
    fn test_accumulator_matches_direct_sums() {
        let params = params();
        let mut filter = SquareRootFilter::new(params.clone()).unwrap();
        let obs = observations(8);
        filter.smooth(&obs).unwrap();
        let stats = accumulate(&params, filter.moments(), &obs).unwrap();

        let m = filter.moments();
        let t0_y = params.t0_y().into_owned();

        // Direct dense accumulation of Σ E[v · vᵀ] for v = [x_{n+1}; x_n; y_{n-1}].
        let mut direct = DMatrix::<f64>::zeros(3, 3);
        for n in 0..obs.len() {
            let y_prev = if n == 0 { t0_y[0] } else { obs[n - 1][0] };
            let xs_next = m.smoothed_mean(n + 1)[0];
            let xs = m.smoothed_mean(n)[0];
            let ps_next = m.smoothed_covariance(n + 1)[(0, 0)];
            let ps = m.smoothed_covariance(n)[(0, 0)];
            let cross = m.smoothed_cross_covariance(n)[(0, 0)];

            let mean = DVector::from_vec(vec![xs_next, xs, y_prev]);
            direct += &mean * mean.transpose();
            direct[(0, 0)] += ps_next;
            direct[(1, 1)] += ps;
            // Cov(x_n, x_{n+1}) enters symmetrically.
            direct[(0, 1)] += cross;
            direct[(1, 0)] += cross;
        }

        let implied = stats.transition.implied_sum();
        assert!((&implied - &direct).norm() < 1e-9 * (1.0 + direct.norm()));
    }

    #[test]
    fn test_observation_accumulator_shares_state_block() {
        let params = params();
        let mut filter = SquareRootFilter::new(params.clone()).unwrap();
        let obs = observations(6);
        filter.smooth(&obs).unwrap();
        let stats = accumulate(&params, filter.moments(), &obs).unwrap();

        // Both accumulators carry Σ E[u · uᵀ] over the same stacked
        // (state, previous-observation) vector; their trailing blocks
        // must agree.
        let t = stats.transition.implied_sum();
        let o = stats.observation.implied_sum();
        let t_uu = t.view((1, 1), (2, 2)).into_owned();
        let o_uu = o.view((1, 1), (2, 2)).into_owned();
        assert!((&t_uu - &o_uu).norm() < 1e-9);
    }

    #[test]
    fn test_transition_count() {
        let params = params();
        let mut filter = SquareRootFilter::new(params.clone()).unwrap();
        let obs = observations(4);
        filter.smooth(&obs).unwrap();
        let stats = accumulate(&params, filter.moments(), &obs).unwrap();
        assert_eq!(stats.transitions(), 4);
    }
}
