//! Backward smoothing pass
//!
//! Refines every moment of a completed forward pass with the information
//! of the whole sequence. At each step the two-block reduction of
//!
//! ```text
//! [ F2_x · S_f   Q2_xx_root ]        [ S_p'   0 ]
//! [ S_f          0          ]   →    [ G      W ]
//! ```
//!
//! re-derives the predicted root `S_p'` and gives the smoother gain
//! `J = G · S_p'⁻¹` by back-substituting only that small factor. `W` is a
//! root of the conditional covariance of `x_n` given `x_{n+1}` and the
//! past, so the joint root of the two consecutive smoothed states is
//!
//! ```text
//! [ S_s(n+1)        0 ]
//! [ J · S_s(n+1)    W ]
//! ```
//!
//! whose lower row block `[J · S_s(n+1) | W]` is stored as the cross
//! root and re-triangularized into the smoothed root at `n`. The
//! smoothed mean is the usual linear correction through `J` of the gap
//! between the smoothed and predicted means at `n + 1`.
//!
//! Terminal condition: the smoothed moment at the last index equals the
//! predicted moment there; the recursion runs `n = N−1` down to `0`.

use crate::common::triangular;
use crate::errors::FilterError;
use crate::model::constants::DerivedConstants;

use super::moments::MomentSequence;
use super::workspace::FilterWorkspace;

/// Run the backward pass over a completed forward pass.
///
/// # Errors
/// [`FilterError::SingularPredictedRoot`] when the re-derived predicted
/// root at some step cannot be back-substituted.
pub(crate) fn smooth_pass(
    constants: &DerivedConstants,
    moments: &mut MomentSequence,
    ws: &mut FilterWorkspace,
) -> Result<(), FilterError> {
    let n_x = moments.dims.n_x;
    let n_steps = moments.len;

    // No future information at the last index.
    moments.smoothed_means[n_steps].copy_from(&moments.predicted_means[n_steps]);
    moments.smoothed_roots[n_steps].copy_from(&moments.predicted_roots[n_steps]);

    for n in (0..n_steps).rev() {
        // Joint reduction of the one-step joint root given data up to n.
        ws.smooth_array.fill(0.0);
        ws.smooth_array.view_mut((0, 0), (n_x, n_x)).gemm(
            1.0,
            &constants.f2_x(),
            &moments.filtered_roots[n],
            0.0,
        );
        ws.smooth_array
            .view_mut((0, n_x), (n_x, n_x))
            .copy_from(constants.q2_xx_root());
        ws.smooth_array
            .view_mut((n_x, 0), (n_x, n_x))
            .copy_from(&moments.filtered_roots[n]);
        triangular::reduce_two_block(&mut ws.smooth_array, 2 * n_x, 2 * n_x, n_x, &mut ws.scratch);

        // Smoother gain from the small predicted root only.
        ws.gain_j
            .copy_from(&ws.smooth_array.view((n_x, 0), (n_x, n_x)));
        triangular::solve_right_upper_in_place(&ws.smooth_array, (0, 0), n_x, &mut ws.gain_j, n_x)
            .map_err(|_| FilterError::SingularPredictedRoot { step: n + 1 })?;

        // Cross root [J · S_s(n+1) | W].
        moments.cross_roots[n].view_mut((0, 0), (n_x, n_x)).gemm(
            1.0,
            &ws.gain_j,
            &moments.smoothed_roots[n + 1],
            0.0,
        );
        moments.cross_roots[n]
            .view_mut((0, n_x), (n_x, n_x))
            .copy_from(&ws.smooth_array.view((n_x, n_x), (n_x, n_x)));

        // Mean correction through the gap at n + 1.
        ws.mean_a.copy_from(&moments.smoothed_means[n + 1]);
        ws.mean_a -= &moments.predicted_means[n + 1];
        ws.mean_b.copy_from(&moments.filtered_means[n]);
        ws.mean_b.gemv(1.0, &ws.gain_j, &ws.mean_a, 1.0);
        moments.smoothed_means[n].copy_from(&ws.mean_b);

        // Smoothed root is the re-triangularized cross root block.
        ws.smooth_root_array.copy_from(&moments.cross_roots[n]);
        triangular::reduce_to_upper(&mut ws.smooth_root_array, n_x, 2 * n_x, &mut ws.scratch);
        moments.smoothed_roots[n].copy_from(&ws.smooth_root_array.view((0, 0), (n_x, n_x)));
    }

    moments.smoothed_valid = true;
    Ok(())
}
