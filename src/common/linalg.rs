//! Dense linear algebra utilities.
//!
//! Gaussian density evaluation and covariance hygiene helpers shared by
//! the direct-covariance filter and the test suite. The square-root
//! recursion itself never goes through these; it works on triangular
//! factors only (see [`super::triangular`]).

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Compute the log of a multivariate Gaussian PDF.
///
/// # Arguments
/// * `x` - Point to evaluate
/// * `mu` - Mean vector
/// * `sigma` - Covariance matrix
///
/// # Returns
/// Log probability density, or `f64::NEG_INFINITY` if the covariance is
/// not positive definite.
pub fn log_gaussian_pdf(x: &DVector<f64>, mu: &DVector<f64>, sigma: &DMatrix<f64>) -> f64 {
    let n = x.len() as f64;
    let diff = x - mu;

    match sigma.clone().cholesky() {
        Some(chol) => {
            let inv_sigma_diff = chol.solve(&diff);
            let mahalanobis = diff.dot(&inv_sigma_diff);
            let log_det: f64 = chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>() * 2.0;

            -0.5 * (n * (2.0 * PI).ln() + log_det + mahalanobis)
        }
        None => f64::NEG_INFINITY,
    }
}

/// Check whether a symmetric matrix is positive definite.
///
/// # Arguments
/// * `matrix` - Matrix to check
///
/// # Returns
/// true if a Cholesky factorization exists
pub fn is_positive_definite(matrix: &DMatrix<f64>) -> bool {
    matrix.clone().cholesky().is_some()
}

/// Make a matrix symmetric by averaging with its transpose.
///
/// Used by the direct-covariance filter to keep accumulated round-off
/// from breaking symmetry over long sequences.
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (matrix + matrix.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_gaussian_pdf_standard_normal() {
        let x = DVector::from_vec(vec![0.0]);
        let mu = DVector::from_vec(vec![0.0]);
        let sigma = DMatrix::from_vec(1, 1, vec![1.0]);

        let expected = -0.5 * (2.0 * PI).ln();
        assert!((log_gaussian_pdf(&x, &mu, &sigma) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_log_gaussian_pdf_singular() {
        let x = DVector::from_vec(vec![0.0, 0.0]);
        let mu = DVector::from_vec(vec![0.0, 0.0]);
        let sigma = DMatrix::zeros(2, 2);

        assert_eq!(log_gaussian_pdf(&x, &mu, &sigma), f64::NEG_INFINITY);
    }

    #[test]
    fn test_is_positive_definite() {
        assert!(is_positive_definite(&DMatrix::identity(3, 3)));
        assert!(!is_positive_definite(&DMatrix::zeros(3, 3)));
    }

    #[test]
    fn test_symmetrize() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        let s = symmetrize(&m);
        assert_eq!(s[(0, 1)], 3.0);
        assert_eq!(s[(1, 0)], 3.0);
    }
}
