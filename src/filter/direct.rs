//! Direct-covariance filter/smoother
//!
//! The second covariance-representation policy: the same recursion as
//! [`super::sqrt::SquareRootFilter`] carried on full covariance
//! matrices, with the Joseph-form update and explicit symmetrization to
//! limit round-off drift. It has no positivity guarantee by
//! construction, which is exactly why the square-root variant is the
//! primary one; this variant exists as an independent reference the
//! square-root moments are cross-validated against.

use nalgebra::{DMatrix, DVector};

use crate::common::linalg::{log_gaussian_pdf, symmetrize};
use crate::errors::{FilterError, ModelError};
use crate::model::constants::{DerivedConstants, NoiseStructure};
use crate::model::params::StateSpaceParams;

use super::traits::SequenceSmoother;

/// Moments of one pass of the direct-covariance filter.
#[derive(Debug, Clone, Default)]
struct DirectMoments {
    predicted_means: Vec<DVector<f64>>,
    predicted_covs: Vec<DMatrix<f64>>,
    filtered_means: Vec<DVector<f64>>,
    filtered_covs: Vec<DMatrix<f64>>,
    smoothed_means: Vec<DVector<f64>>,
    smoothed_covs: Vec<DMatrix<f64>>,
    innovations: Vec<DVector<f64>>,
    innovation_covs: Vec<DMatrix<f64>>,
}

/// Kalman filter and smoother carrying full covariances.
#[derive(Debug, Clone)]
pub struct DirectFilter {
    params: StateSpaceParams,
    /// Dense versions of the decorrelation constants
    f2: DMatrix<f64>,
    q2_xx: DMatrix<f64>,
    q2_xy: DMatrix<f64>,
    qyy: DMatrix<f64>,
    moments: DirectMoments,
}

impl DirectFilter {
    /// Create a filter with the correlated noise structure.
    pub fn new(params: StateSpaceParams) -> Result<Self, ModelError> {
        Self::with_noise_structure(params, NoiseStructure::Correlated)
    }

    /// Create a filter with an explicit noise-structure policy.
    pub fn with_noise_structure(
        params: StateSpaceParams,
        structure: NoiseStructure,
    ) -> Result<Self, ModelError> {
        params.validate()?;
        // Same decorrelation as the square-root variant, densified once.
        let constants = DerivedConstants::compute(&params, structure)?;
        let q2_xx = constants.q2_xx_root() * constants.q2_xx_root().transpose();
        let qyy = constants.qyy_root() * constants.qyy_root().transpose();
        Ok(Self {
            f2: constants.f2().clone(),
            q2_xy: constants.q2_xy().clone(),
            q2_xx,
            qyy,
            params,
            moments: DirectMoments::default(),
        })
    }

    /// Current parameters
    #[inline]
    pub fn params(&self) -> &StateSpaceParams {
        &self.params
    }

    fn f2_x(&self) -> DMatrix<f64> {
        let n_x = self.params.dims().n_x;
        self.f2.view((0, 0), (n_x, n_x)).into_owned()
    }

    fn f2_y(&self) -> DMatrix<f64> {
        let dims = self.params.dims();
        self.f2.view((0, dims.n_x), (dims.n_x, dims.n_y)).into_owned()
    }

    /// Forward pass with the Joseph-form update.
    fn run_filter(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        let dims = self.params.dims();
        let (n_x, n_y) = (dims.n_x, dims.n_y);
        for (n, y) in observations.iter().enumerate() {
            if y.len() != n_y {
                return Err(FilterError::DimensionMismatch {
                    expected: n_y,
                    actual: y.len(),
                    context: format!("observation at step {}", n),
                });
            }
        }

        let n_steps = observations.len();
        let q0_xx = self.params.q0_root_xx().into_owned();
        let f_yx = self.params.f_yx().into_owned();
        let f_yy = self.params.f_yy().into_owned();
        let f2_x = self.f2_x();
        let f2_y = self.f2_y();
        let t0_y = self.params.t0_y().into_owned();
        let identity = DMatrix::<f64>::identity(n_x, n_x);

        let m = &mut self.moments;
        m.predicted_means.clear();
        m.predicted_covs.clear();
        m.filtered_means.clear();
        m.filtered_covs.clear();
        m.smoothed_means.clear();
        m.smoothed_covs.clear();
        m.innovations.clear();
        m.innovation_covs.clear();

        m.predicted_means.push(self.params.t0_x().into_owned());
        m.predicted_covs.push(&q0_xx * q0_xx.transpose());

        for n in 0..n_steps {
            let y = &observations[n];
            let y_prev = if n == 0 { &t0_y } else { &observations[n - 1] };
            let x_p = m.predicted_means[n].clone();
            let p_p = m.predicted_covs[n].clone();

            // Innovation and its covariance.
            let innovation = y - &f_yx * &x_p - &f_yy * y_prev;
            let s = symmetrize(&(&f_yx * &p_p * f_yx.transpose() + &self.qyy));

            // Gain through the Cholesky factor of S.
            let chol = s
                .clone()
                .cholesky()
                .ok_or(FilterError::SingularInnovation { step: n })?;
            let k = chol.solve(&(&f_yx * &p_p)).transpose();

            // Joseph form keeps the update symmetric.
            let x_f = &x_p + &k * &innovation;
            let i_minus_kh = &identity - &k * &f_yx;
            let p_f = symmetrize(
                &(&i_minus_kh * &p_p * i_minus_kh.transpose() + &k * &self.qyy * k.transpose()),
            );

            m.innovations.push(innovation);
            m.innovation_covs.push(s);
            m.filtered_means.push(x_f.clone());
            m.filtered_covs.push(p_f.clone());

            // One-step prediction.
            let x_next = &f2_x * &x_f + &f2_y * y_prev + &self.q2_xy * y;
            let p_next = symmetrize(&(&f2_x * &p_f * f2_x.transpose() + &self.q2_xx));
            m.predicted_means.push(x_next);
            m.predicted_covs.push(p_next);
        }
        Ok(())
    }

    /// Backward Rauch-Tung-Striebel pass.
    fn run_smooth(&mut self) -> Result<(), FilterError> {
        let n_steps = self.moments.filtered_means.len();
        let f2_x = self.f2_x();
        let m = &mut self.moments;

        m.smoothed_means = vec![DVector::zeros(0); n_steps + 1];
        m.smoothed_covs = vec![DMatrix::zeros(0, 0); n_steps + 1];
        m.smoothed_means[n_steps] = m.predicted_means[n_steps].clone();
        m.smoothed_covs[n_steps] = m.predicted_covs[n_steps].clone();

        for n in (0..n_steps).rev() {
            let p_f = &m.filtered_covs[n];
            let p_p = &m.predicted_covs[n + 1];
            let chol = p_p
                .clone()
                .cholesky()
                .ok_or(FilterError::SingularPredictedRoot { step: n + 1 })?;
            // J = P_f · F2_xᵀ · P_p⁻¹
            let j = chol.solve(&(&f2_x * p_f)).transpose();

            let mean_gap = &m.smoothed_means[n + 1] - &m.predicted_means[n + 1];
            let cov_gap = &m.smoothed_covs[n + 1] - p_p;
            m.smoothed_means[n] = &m.filtered_means[n] + &j * mean_gap;
            m.smoothed_covs[n] = symmetrize(&(p_f + &j * cov_gap * j.transpose()));
        }
        Ok(())
    }
}

impl SequenceSmoother for DirectFilter {
    fn filter(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        self.run_filter(observations)
    }

    fn smooth(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        self.run_filter(observations)?;
        self.run_smooth()
    }

    fn len(&self) -> usize {
        self.moments.filtered_means.len()
    }

    fn predicted_mean(&self, n: usize) -> &DVector<f64> {
        &self.moments.predicted_means[n]
    }

    fn predicted_covariance(&self, n: usize) -> DMatrix<f64> {
        self.moments.predicted_covs[n].clone()
    }

    fn filtered_mean(&self, n: usize) -> &DVector<f64> {
        &self.moments.filtered_means[n]
    }

    fn filtered_covariance(&self, n: usize) -> DMatrix<f64> {
        self.moments.filtered_covs[n].clone()
    }

    fn smoothed_mean(&self, n: usize) -> &DVector<f64> {
        &self.moments.smoothed_means[n]
    }

    fn smoothed_covariance(&self, n: usize) -> DMatrix<f64> {
        self.moments.smoothed_covs[n].clone()
    }

    fn log_likelihood(&self) -> f64 {
        let zero = DVector::zeros(self.params.dims().n_y);
        self.moments
            .innovations
            .iter()
            .zip(&self.moments.innovation_covs)
            .map(|(nu, s)| log_gaussian_pdf(nu, &zero, s))
            .sum()
    }
}
