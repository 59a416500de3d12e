//! Measurement update step
//!
//! Incorporates one observation into the predicted moment. The
//! innovation is formed against the observation rows of the raw
//! transition matrix,
//!
//! ```text
//! ν = y_n − F_yx · x_p − F_yy · y_{n-1}
//! ```
//!
//! and a single two-block orthogonal reduction of the pre-array
//!
//! ```text
//! [ Qyy_root   F_yx · S_p ]        [ S_inn   0   ]
//! [ 0          S_p        ]   →    [ G       S_f ]
//! ```
//!
//! yields simultaneously the innovation-covariance root `S_inn`, the
//! filtered covariance root `S_f`, and the gain numerator `G` with
//! `K = G · S_inn⁻¹` by back-substitution. The post-array identities
//! follow from the preserved self-product; in particular `S_f` is upper
//! triangular with non-negative diagonal whenever the inputs are valid
//! roots, which is the closure property the square-root form exists for.

use nalgebra::DVector;

use crate::common::triangular;
use crate::errors::FilterError;
use crate::model::constants::DerivedConstants;
use crate::model::params::StateSpaceParams;

use super::moments::MomentSequence;
use super::workspace::FilterWorkspace;

/// Fold observation `y` at step `n` into the predicted moment at `n`.
///
/// # Errors
/// [`FilterError::SingularInnovation`] when the reduced
/// innovation-covariance root cannot be back-substituted. The moment
/// storage is left partially written in that case and the pass must be
/// restarted.
pub(crate) fn update_step(
    params: &StateSpaceParams,
    constants: &DerivedConstants,
    moments: &mut MomentSequence,
    ws: &mut FilterWorkspace,
    n: usize,
    y: &DVector<f64>,
    y_prev: &DVector<f64>,
) -> Result<(), FilterError> {
    let dims = moments.dims;
    let (n_x, n_y) = (dims.n_x, dims.n_y);
    let d = n_x + n_y;
    debug_assert!(n < moments.len);

    // Innovation against the one-step observation prediction.
    ws.innovation.copy_from(y);
    ws.innovation
        .gemv(-1.0, &params.f_yx(), &moments.predicted_means[n], 1.0);
    ws.innovation.gemv(-1.0, &params.f_yy(), y_prev, 1.0);

    // Joint reduction of noise root, propagated root and predicted root.
    ws.update_array.fill(0.0);
    ws.update_array
        .view_mut((0, 0), (n_y, n_y))
        .copy_from(constants.qyy_root());
    ws.update_array.view_mut((0, n_y), (n_y, n_x)).gemm(
        1.0,
        &params.f_yx(),
        &moments.predicted_roots[n],
        0.0,
    );
    ws.update_array
        .view_mut((n_y, n_y), (n_x, n_x))
        .copy_from(&moments.predicted_roots[n]);
    triangular::reduce_two_block(&mut ws.update_array, d, d, n_y, &mut ws.scratch);

    moments.innovation_roots[n].copy_from(&ws.update_array.view((0, 0), (n_y, n_y)));
    moments.innovations[n].copy_from(&ws.innovation);

    // Gain by back-substitution against the small innovation root.
    ws.gain_k
        .copy_from(&ws.update_array.view((n_y, 0), (n_x, n_y)));
    triangular::solve_right_upper_in_place(
        &moments.innovation_roots[n],
        (0, 0),
        n_y,
        &mut ws.gain_k,
        n_x,
    )
    .map_err(|_| FilterError::SingularInnovation { step: n })?;

    ws.mean_a.copy_from(&moments.predicted_means[n]);
    ws.mean_a.gemv(1.0, &ws.gain_k, &ws.innovation, 1.0);
    moments.filtered_means[n].copy_from(&ws.mean_a);
    moments.filtered_roots[n].copy_from(&ws.update_array.view((n_y, n_y), (n_x, n_x)));

    Ok(())
}
