//! Prediction step
//!
//! Advances the hidden-block moment one step forward. Because the state
//! embeds one observation lag, the predicted mean is an affine
//! combination through `F2` and `Q2_xy` of the filtered mean and the two
//! most recent observations:
//!
//! ```text
//! x_p(n+1) = F2_x · x_f(n) + F2_y · y_{n-1} + Q2_xy · y_n
//! ```
//!
//! The predicted covariance root comes from one orthogonal reduction of
//! `[Q2_xx_root | F2_x · S_f]`, which re-factors
//! `Q2_xx + F2_x · P_f · F2_xᵀ` without forming it.

use nalgebra::DVector;

use crate::common::triangular;
use crate::model::constants::DerivedConstants;
use crate::model::params::StateSpaceParams;

use super::moments::MomentSequence;
use super::workspace::FilterWorkspace;

/// Seed the recursion: the moment of the hidden block before the first
/// observation arrives.
///
/// The initial lagged observation is the observation block of `t0`, so
/// the hidden block starts from the conditional of the initial
/// distribution given that value: mean `t0_x`, root equal to the `A`
/// block of `q0_root`.
pub(crate) fn initialize(params: &StateSpaceParams, moments: &mut MomentSequence) {
    moments.predicted_means[0].copy_from(&params.t0_x());
    moments.predicted_roots[0].copy_from(&params.q0_root_xx());
}

/// Advance the filtered moment at `n` to the predicted moment at `n + 1`.
///
/// # Arguments
/// * `y_cur` - observation at step `n`
/// * `y_prev` - observation at step `n - 1` (the `t0` observation block
///   for `n = 0`)
pub(crate) fn predict_step(
    constants: &DerivedConstants,
    moments: &mut MomentSequence,
    ws: &mut FilterWorkspace,
    n: usize,
    y_cur: &DVector<f64>,
    y_prev: &DVector<f64>,
) {
    let n_x = moments.dims.n_x;
    debug_assert!(n < moments.len);

    // Mean through the decorrelated transition.
    ws.mean_a
        .gemv(1.0, &constants.f2_x(), &moments.filtered_means[n], 0.0);
    ws.mean_a.gemv(1.0, &constants.f2_y(), y_prev, 1.0);
    ws.mean_a.gemv(1.0, constants.q2_xy(), y_cur, 1.0);

    // Root: reduce [Q2_xx_root | F2_x · S_f].
    ws.predict_array
        .view_mut((0, 0), (n_x, n_x))
        .copy_from(constants.q2_xx_root());
    ws.predict_array.view_mut((0, n_x), (n_x, n_x)).gemm(
        1.0,
        &constants.f2_x(),
        &moments.filtered_roots[n],
        0.0,
    );
    triangular::reduce_to_upper(&mut ws.predict_array, n_x, 2 * n_x, &mut ws.scratch);

    moments.predicted_means[n + 1].copy_from(&ws.mean_a);
    moments.predicted_roots[n + 1].copy_from(&ws.predict_array.view((0, 0), (n_x, n_x)));
}
