//! Maximization step
//!
//! Closed-form re-estimation of the transition matrix and the noise
//! root from fused sufficient statistics, in a single pass.
//!
//! Each fused accumulator root has the block form
//!
//! ```text
//! [ R11  R12 ]        trailing block R22: root of Σ E[u·uᵀ]
//! [ 0    R22 ]        leading block R11: root of the regression residual
//! ```
//!
//! so the new transition rows are `R12 · R22⁻¹` (one triangular
//! back-substitution against the (state, observation)-correlation root)
//! and the new noise-root block is `R11 / √total_count`, which is upper
//! triangular with non-negative diagonal by construction. The
//! re-estimated noise root is assembled block-diagonally from the two
//! accumulators' residual blocks; the split statistics carry no
//! cross-block information (an explicit property of this estimator, not
//! an accident of the implementation).
//!
//! Optionally the initial mean and covariance root of the hidden block
//! are replaced by the fused first smoothed moment.

use crate::common::triangular;
use crate::errors::EstimationError;
use crate::model::params::StateSpaceParams;

use super::fusion::FusedStatistics;

/// Re-estimate `F` and the noise root in place from fused statistics.
///
/// # Errors
/// [`EstimationError::SingularCorrelation`] when a correlation root is
/// numerically singular. Surfacing this at the point of inversion is
/// deliberate: a silently poisoned estimate would otherwise only show up
/// as a drop in the log-likelihood trace.
pub fn maximize(
    fused: &FusedStatistics,
    params: &mut StateSpaceParams,
    reestimate_initial: bool,
) -> Result<(), EstimationError> {
    let dims = params.dims();
    let (n_x, n_y, n_t) = (dims.n_x, dims.n_y, dims.n_t());
    debug_assert_eq!(fused.transition_root.nrows(), n_x + n_t);
    debug_assert_eq!(fused.observation_root.nrows(), n_y + n_t);
    debug_assert!(fused.transitions > 0);

    // Hidden-state rows of F from the transition accumulator.
    let mut f_x = fused
        .transition_root
        .view((0, n_x), (n_x, n_t))
        .into_owned();
    triangular::solve_right_upper_in_place(&fused.transition_root, (n_x, n_x), n_t, &mut f_x, n_x)
        .map_err(|_| EstimationError::SingularCorrelation {
            context: "transition".to_string(),
        })?;

    // Observation rows of F from the observation accumulator.
    let mut f_y = fused
        .observation_root
        .view((0, n_y), (n_y, n_t))
        .into_owned();
    triangular::solve_right_upper_in_place(&fused.observation_root, (n_y, n_y), n_t, &mut f_y, n_y)
        .map_err(|_| EstimationError::SingularCorrelation {
            context: "observation".to_string(),
        })?;

    let f = params.f_mut();
    f.view_mut((0, 0), (n_x, n_t)).copy_from(&f_x);
    f.view_mut((n_x, 0), (n_y, n_t)).copy_from(&f_y);

    // Noise root blocks from the residual blocks, scaled by 1/√count.
    let scale = 1.0 / (fused.transitions as f64).sqrt();
    let q = params.q_root_mut();
    q.fill(0.0);
    q.view_mut((0, 0), (n_x, n_x))
        .copy_from(&(fused.transition_root.view((0, 0), (n_x, n_x)) * scale));
    q.view_mut((n_x, n_x), (n_y, n_y))
        .copy_from(&(fused.observation_root.view((0, 0), (n_y, n_y)) * scale));

    if reestimate_initial {
        params
            .t0_mut()
            .rows_mut(0, n_x)
            .copy_from(&fused.initial_mean);
        params
            .q0_root_mut()
            .view_mut((0, 0), (n_x, n_x))
            .copy_from(&fused.initial_root);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::em::fusion::{fuse, InitialStatePolicy};
    use crate::em::statistics::accumulate;
    use crate::filter::sqrt::SquareRootFilter;
    use crate::model::params::{StateDims, StateSpaceParams};
    use nalgebra::{DMatrix, DVector};

    fn params() -> StateSpaceParams {
        StateSpaceParams::new(
            StateDims::new(1, 1),
            DVector::from_vec(vec![0.1, 0.2]),
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 2, &[0.9, 0.0, 0.8, 0.1]),
            DMatrix::from_row_slice(2, 2, &[0.2, 0.0, 0.0, 0.3]),
        )
        .unwrap()
    }

    fn sequence(n: usize) -> Vec<DVector<f64>> {
        use crate::common::rng::{Rng, SimpleRng};
        let mut rng = SimpleRng::new(99);
        (0..n)
            .map(|_| DVector::from_vec(vec![rng.randn() * 0.4]))
            .collect()
    }

    #[test]
    fn test_maximize_matches_dense_normal_equations() {
        let mut p = params();
        let mut filter = SquareRootFilter::new(p.clone()).unwrap();
        let obs = sequence(30);
        filter.smooth(&obs).unwrap();
        let stats = accumulate(&p, filter.moments(), &obs).unwrap();
        let fused = fuse(
            std::slice::from_ref(&stats),
            InitialStatePolicy::Representative(0),
        )
        .unwrap();

        maximize(&fused, &mut p, false).unwrap();

        // Dense reference from the implied correlation sums:
        // blocks of Σ E[[x'; u] [x'; u]ᵀ] with u = [x_n; y_{n-1}].
        let t = fused.transition_root() * fused.transition_root().transpose();
        let s_xu = t.view((0, 1), (1, 2)).into_owned();
        let s_uu = t.view((1, 1), (2, 2)).into_owned();
        let f_x = &s_xu * s_uu.clone().try_inverse().unwrap();
        assert!((p.f().view((0, 0), (1, 2)).into_owned() - &f_x).norm() < 1e-9);

        let o = fused.observation_root() * fused.observation_root().transpose();
        let s_yu = o.view((0, 1), (1, 2)).into_owned();
        let s_uu2 = o.view((1, 1), (2, 2)).into_owned();
        let f_y = &s_yu * s_uu2.try_inverse().unwrap();
        assert!((p.f().view((1, 0), (1, 2)).into_owned() - &f_y).norm() < 1e-9);

        // Residual blocks scaled by 1/count.
        let n = fused.transitions() as f64;
        let s_xx = t[(0, 0)];
        let expected_qxx = (s_xx - (&s_xu * s_uu.try_inverse().unwrap() * s_xu.transpose())[(0, 0)]) / n;
        let qxx = p.q_root()[(0, 0)].powi(2);
        assert!((qxx - expected_qxx).abs() < 1e-9 * (1.0 + expected_qxx));

        // Cross block of the re-estimated root is zero.
        assert_eq!(p.q_root()[(0, 1)], 0.0);
    }

    #[test]
    fn test_maximize_keeps_root_invariants() {
        let mut p = params();
        let mut filter = SquareRootFilter::new(p.clone()).unwrap();
        let obs = sequence(20);
        filter.smooth(&obs).unwrap();
        let stats = accumulate(&p, filter.moments(), &obs).unwrap();
        let fused = fuse(
            std::slice::from_ref(&stats),
            InitialStatePolicy::Representative(0),
        )
        .unwrap();

        maximize(&fused, &mut p, true).unwrap();
        // The mutated parameter set still satisfies every structural
        // precondition.
        p.validate().unwrap();
    }

    #[test]
    fn test_reestimate_initial_writes_first_smoothed_moment() {
        let mut p = params();
        let mut filter = SquareRootFilter::new(p.clone()).unwrap();
        let obs = sequence(10);
        filter.smooth(&obs).unwrap();
        let stats = accumulate(&p, filter.moments(), &obs).unwrap();
        let smoothed_mean = filter.moments().smoothed_mean(0)[0];
        let fused = fuse(
            std::slice::from_ref(&stats),
            InitialStatePolicy::Representative(0),
        )
        .unwrap();

        let old_t0_y = p.t0()[1];
        maximize(&fused, &mut p, true).unwrap();
        assert_eq!(p.t0()[0], smoothed_mean);
        // The observation block of the initial state is untouched.
        assert_eq!(p.t0()[1], old_t0_y);
    }
}
