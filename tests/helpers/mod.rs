//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use nalgebra::{DMatrix, DVector};
use sqrt_kalman_em_rs::{StateDims, StateSpaceParams};

/// Scalar model with an uninformative observation row:
/// F = [[0.9, 0.1], [0.0, 0.5]], Q = 0.01·I, t0 = 0, Q0 = I.
pub fn scalar_reference_params() -> StateSpaceParams {
    StateSpaceParams::new(
        StateDims::new(1, 1),
        DVector::from_vec(vec![0.0, 0.0]),
        DMatrix::identity(2, 2),
        DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.0, 0.5]),
        DMatrix::identity(2, 2) * 0.1,
    )
    .unwrap()
}

/// Scalar model whose observations carry information about the hidden
/// state (nonzero F_yx).
pub fn scalar_informative_params() -> StateSpaceParams {
    StateSpaceParams::new(
        StateDims::new(1, 1),
        DVector::from_vec(vec![0.0, 0.0]),
        DMatrix::identity(2, 2),
        DMatrix::from_row_slice(2, 2, &[0.9, 0.05, 0.8, 0.1]),
        DMatrix::from_row_slice(2, 2, &[0.2, 0.0, 0.0, 0.3]),
    )
    .unwrap()
}

/// Two-dimensional hidden state, scalar observation, correlated noise
/// root.
pub fn vector_params() -> StateSpaceParams {
    StateSpaceParams::new(
        StateDims::new(2, 1),
        DVector::from_vec(vec![0.2, -0.1, 0.0]),
        DMatrix::identity(3, 3),
        DMatrix::from_row_slice(
            3,
            3,
            &[
                0.85, 0.1, 0.0, //
                -0.1, 0.75, 0.05, //
                0.6, 0.3, 0.2,
            ],
        ),
        DMatrix::from_row_slice(
            3,
            3,
            &[
                0.3, 0.1, 0.05, //
                0.0, 0.25, 0.1, //
                0.0, 0.0, 0.4,
            ],
        ),
    )
    .unwrap()
}

/// Largest absolute entry of the difference of two matrices.
pub fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).abs().max()
}
