//! Derived decorrelation constants
//!
//! The filter recursion does not run on the raw `(F, Q)` pair. Because
//! the observation is a block of the state, the hidden block can be
//! conditioned on it, which removes the cross-correlation between the
//! two sub-blocks of the noise:
//!
//! ```text
//! F2    = F_x• − Q_xy · Qyy⁻¹ · F_y•
//! Q2_xy = Q_xy · Qyy⁻¹
//! Q2_xx = Q_xx − Q_xy · Qyy⁻¹ · Q_yx      (Schur complement)
//! ```
//!
//! With the canonical upper-triangular root `S = [[A, B], [0, C]]` in
//! `[x; y]` ordering these quantities come almost for free: the root of
//! `Qyy` is `C`, the root of the Schur complement is `A` (both read
//! directly off the diagonal blocks of the reduced form), and only the
//! small triangular `C` is ever inverted, as a back-substitution for
//! `Q2_xy = B · C⁻¹`. No full covariance and no full-precision inverse
//! is formed.
//!
//! These values are pure functions of [`StateSpaceParams`] and must be
//! recomputed whenever the parameters change.

use nalgebra::{DMatrix, DMatrixView, DVector};
use serde::Serialize;

use crate::common::triangular;
use crate::errors::ModelError;
use crate::model::params::StateSpaceParams;

/// Noise-structure policy for the decorrelation step.
///
/// `Correlated` uses the full noise root including the `B` block.
/// `BlockDiagonal` models the two noise sub-blocks as uncorrelated: the
/// cross term is dropped and the hidden-block noise root absorbs the
/// full marginal `Q_xx = A·Aᵀ + B·Bᵀ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NoiseStructure {
    /// Full noise root, cross-correlation honored
    #[default]
    Correlated,
    /// Cross-correlation between the sub-blocks ignored
    BlockDiagonal,
}

/// Constants derived from the parameters, consumed by every recursion.
#[derive(Debug, Clone)]
pub struct DerivedConstants {
    n_x: usize,
    n_y: usize,
    /// Decorrelated transition rows for the hidden block (n_x × n_t)
    f2: DMatrix<f64>,
    /// Root of the conditional hidden-block noise (n_x × n_x, upper)
    q2_xx_root: DMatrix<f64>,
    /// Noise regression of the hidden block on the observation (n_x × n_y)
    q2_xy: DMatrix<f64>,
    /// Root of the observation-block noise (n_y × n_y, upper)
    qyy_root: DMatrix<f64>,
}

impl DerivedConstants {
    /// Derive the constants from a validated parameter set.
    ///
    /// # Errors
    /// [`ModelError::SingularMeasurementNoise`] when the observation
    /// block of the noise root is not invertible. This is fatal for the
    /// whole setup and is not retried.
    pub fn compute(
        params: &StateSpaceParams,
        structure: NoiseStructure,
    ) -> Result<Self, ModelError> {
        let dims = params.dims();
        let (n_x, n_y, n_t) = (dims.n_x, dims.n_y, dims.n_t());

        let qyy_root = params.q_root_yy().into_owned();
        for i in 0..n_y {
            if qyy_root[(i, i)].abs() <= triangular::SINGULARITY_TOLERANCE {
                return Err(ModelError::SingularMeasurementNoise { index: i });
            }
        }

        let (f2, q2_xx_root, q2_xy) = match structure {
            NoiseStructure::Correlated => {
                // Q2_xy = B · C⁻¹ by back-substitution against C.
                let mut q2_xy = params.q_root_xy().into_owned();
                triangular::solve_right_upper_in_place(&qyy_root, (0, 0), n_y, &mut q2_xy, n_x)
                    .map_err(|index| ModelError::SingularMeasurementNoise { index })?;

                let mut f2 = params.f_x().into_owned();
                f2.gemm(-1.0, &q2_xy, &params.f_y(), 1.0);

                (f2, params.q_root_xx().into_owned(), q2_xy)
            }
            NoiseStructure::BlockDiagonal => {
                // Marginal hidden-block noise: fold B into the root of A.
                let mut buf = DMatrix::zeros(n_x, n_t);
                buf.view_mut((0, 0), (n_x, n_x))
                    .copy_from(&params.q_root_xx());
                buf.view_mut((0, n_x), (n_x, n_y))
                    .copy_from(&params.q_root_xy());
                let mut scratch = DVector::zeros(n_t);
                triangular::reduce_to_upper(&mut buf, n_x, n_t, &mut scratch);
                let q2_xx_root = buf.view((0, 0), (n_x, n_x)).into_owned();

                (
                    params.f_x().into_owned(),
                    q2_xx_root,
                    DMatrix::zeros(n_x, n_y),
                )
            }
        };

        Ok(Self {
            n_x,
            n_y,
            f2,
            q2_xx_root,
            q2_xy,
            qyy_root,
        })
    }

    /// Decorrelated transition rows (n_x × n_t)
    #[inline]
    pub fn f2(&self) -> &DMatrix<f64> {
        &self.f2
    }

    /// Hidden-state columns of `F2` (n_x × n_x)
    #[inline]
    pub fn f2_x(&self) -> DMatrixView<'_, f64> {
        self.f2.view((0, 0), (self.n_x, self.n_x))
    }

    /// Observation columns of `F2` (n_x × n_y)
    #[inline]
    pub fn f2_y(&self) -> DMatrixView<'_, f64> {
        self.f2.view((0, self.n_x), (self.n_x, self.n_y))
    }

    /// Root of the conditional hidden-block noise
    #[inline]
    pub fn q2_xx_root(&self) -> &DMatrix<f64> {
        &self.q2_xx_root
    }

    /// Noise regression of the hidden block on the observation
    #[inline]
    pub fn q2_xy(&self) -> &DMatrix<f64> {
        &self.q2_xy
    }

    /// Root of the observation-block noise
    #[inline]
    pub fn qyy_root(&self) -> &DMatrix<f64> {
        &self.qyy_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::StateDims;

    /// Parameters with a deliberately correlated noise root.
    fn correlated_params() -> StateSpaceParams {
        let dims = StateDims::new(2, 1);
        let q_root = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.8, 0.2, 0.3, //
                0.0, 0.6, 0.1, //
                0.0, 0.0, 0.5,
            ],
        );
        let f = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.9, 0.1, 0.0, //
                0.0, 0.8, 0.2, //
                0.5, 0.3, 0.4,
            ],
        );
        StateSpaceParams::new(
            dims,
            DVector::zeros(3),
            DMatrix::identity(3, 3),
            f,
            q_root,
        )
        .unwrap()
    }

    #[test]
    fn test_qyy_round_trip() {
        let params = correlated_params();
        let constants = DerivedConstants::compute(&params, NoiseStructure::Correlated).unwrap();

        let q_full = params.q_root() * params.q_root().transpose();
        let qyy = q_full.view((2, 2), (1, 1)).into_owned();
        let rebuilt = constants.qyy_root() * constants.qyy_root().transpose();
        assert!((&rebuilt - &qyy).norm() < 1e-12);
    }

    #[test]
    fn test_correlated_constants_match_dense_algebra() {
        let params = correlated_params();
        let constants = DerivedConstants::compute(&params, NoiseStructure::Correlated).unwrap();

        let q_full = params.q_root() * params.q_root().transpose();
        let q_xx = q_full.view((0, 0), (2, 2)).into_owned();
        let q_xy = q_full.view((0, 2), (2, 1)).into_owned();
        let qyy_inv = 1.0 / q_full[(2, 2)];

        // Q2_xy
        let expected_q2_xy = &q_xy * qyy_inv;
        assert!((constants.q2_xy() - &expected_q2_xy).norm() < 1e-12);

        // F2
        let expected_f2 =
            params.f_x().into_owned() - &expected_q2_xy * params.f_y().into_owned();
        assert!((constants.f2() - &expected_f2).norm() < 1e-12);

        // Q2_xx as Schur complement
        let expected_q2_xx = &q_xx - &q_xy * qyy_inv * q_xy.transpose();
        let rebuilt = constants.q2_xx_root() * constants.q2_xx_root().transpose();
        assert!((&rebuilt - &expected_q2_xx).norm() < 1e-12);
    }

    #[test]
    fn test_block_diagonal_constants() {
        let params = correlated_params();
        let constants = DerivedConstants::compute(&params, NoiseStructure::BlockDiagonal).unwrap();

        // Cross regression dropped, transition rows untouched.
        assert_eq!(constants.q2_xy().norm(), 0.0);
        assert!((constants.f2() - params.f_x().into_owned()).norm() < 1e-15);

        // Hidden-block root absorbs the full marginal Q_xx.
        let q_full = params.q_root() * params.q_root().transpose();
        let q_xx = q_full.view((0, 0), (2, 2)).into_owned();
        let rebuilt = constants.q2_xx_root() * constants.q2_xx_root().transpose();
        assert!((&rebuilt - &q_xx).norm() < 1e-12);
    }

    #[test]
    fn test_singular_measurement_noise_is_fatal() {
        let dims = StateDims::new(1, 1);
        let mut q_root = DMatrix::identity(2, 2);
        q_root[(1, 1)] = 0.0;
        let params = StateSpaceParams::new(
            dims,
            DVector::zeros(2),
            DMatrix::identity(2, 2),
            DMatrix::identity(2, 2),
            q_root,
        )
        .unwrap();

        let err = DerivedConstants::compute(&params, NoiseStructure::Correlated).unwrap_err();
        assert!(matches!(err, ModelError::SingularMeasurementNoise { index: 0 }));
    }
}
