//! Square-root filter/smoother
//!
//! The primary covariance-representation policy: every covariance is
//! carried as an upper-triangular root and only ever combined through
//! orthogonal reductions, so positive semi-definiteness holds by
//! construction across arbitrarily many passes. This is the variant the
//! EM estimator runs on.

use nalgebra::{DMatrix, DVector};

use crate::errors::{FilterError, ModelError};
use crate::model::constants::{DerivedConstants, NoiseStructure};
use crate::model::params::StateSpaceParams;

use super::moments::MomentSequence;
use super::prediction;
use super::smoothing;
use super::traits::SequenceSmoother;
use super::update;
use super::workspace::FilterWorkspace;

/// Square-root Kalman filter and smoother over one observation sequence.
///
/// Owns its moment storage and scratch workspace; both are sized at
/// setup and reused across calls, with reallocation only on a sequence
/// length change. Parameters can be swapped in place between passes,
/// which recomputes the derived constants.
#[derive(Debug, Clone)]
pub struct SquareRootFilter {
    params: StateSpaceParams,
    structure: NoiseStructure,
    constants: DerivedConstants,
    moments: MomentSequence,
    workspace: FilterWorkspace,
}

impl SquareRootFilter {
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
        let constants = DerivedConstants::compute(&params, structure)?;
        let dims = params.dims();
        Ok(Self {
            params,
            structure,
            constants,
            moments: MomentSequence::new(dims),
            workspace: FilterWorkspace::new(dims),
        })
    }

    /// Replace the parameters in place and re-derive the constants.
    ///
    /// The stored moments are invalidated; the next pass overwrites them.
    pub fn set_params(&mut self, params: StateSpaceParams) -> Result<(), ModelError> {
        params.validate()?;
        if params.dims() != self.params.dims() {
            return Err(ModelError::DimensionMismatch {
                expected: self.params.dims().n_t(),
                actual: params.dims().n_t(),
                context: "parameter update".to_string(),
            });
        }
        self.constants = DerivedConstants::compute(&params, self.structure)?;
        self.params = params;
        self.moments.smoothed_valid = false;
        Ok(())
    }

    /// Current parameters
    #[inline]
    pub fn params(&self) -> &StateSpaceParams {
        &self.params
    }

    /// Derived constants of the current parameters
    #[inline]
    pub fn constants(&self) -> &DerivedConstants {
        &self.constants
    }

    /// Moments of the most recent pass
    #[inline]
    pub fn moments(&self) -> &MomentSequence {
        &self.moments
    }

    /// Noise-structure policy
    #[inline]
    pub fn noise_structure(&self) -> NoiseStructure {
        self.structure
    }

    fn check_observations(&self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        let n_y = self.params.dims().n_y;
        for (n, y) in observations.iter().enumerate() {
            if y.len() != n_y {
                return Err(FilterError::DimensionMismatch {
                    expected: n_y,
                    actual: y.len(),
                    context: format!("observation at step {}", n),
                });
            }
        }
        Ok(())
    }

    /// Run the forward pass over a sequence.
    ///
    /// Fills predicted and filtered moments plus the innovation
    /// sequence. The pass is a pure function of `(observations,
    /// parameters)`: repeating it with identical inputs produces
    /// identical moments.
    pub fn filter(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        self.check_observations(observations)?;
        let n = observations.len();
        self.moments.ensure_len(n);
        prediction::initialize(&self.params, &mut self.moments);

        let t0_y = self.params.t0_y().into_owned();
        for step in 0..n {
            let y_prev = if step == 0 {
                &t0_y
            } else {
                &observations[step - 1]
            };
            update::update_step(
                &self.params,
                &self.constants,
                &mut self.moments,
                &mut self.workspace,
                step,
                &observations[step],
                y_prev,
            )?;
            prediction::predict_step(
                &self.constants,
                &mut self.moments,
                &mut self.workspace,
                step,
                &observations[step],
                y_prev,
            );
        }
        Ok(())
    }

    /// Run the forward pass followed by the backward pass.
    pub fn smooth(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        self.filter(observations)?;
        smoothing::smooth_pass(&self.constants, &mut self.moments, &mut self.workspace)
    }

    /// Log-likelihood of the last filtered sequence.
    pub fn log_likelihood(&self) -> f64 {
        self.moments.log_likelihood()
    }
}

impl SequenceSmoother for SquareRootFilter {
    fn filter(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        SquareRootFilter::filter(self, observations)
    }

    fn smooth(&mut self, observations: &[DVector<f64>]) -> Result<(), FilterError> {
        SquareRootFilter::smooth(self, observations)
    }

    fn len(&self) -> usize {
        self.moments.len()
    }

    fn predicted_mean(&self, n: usize) -> &DVector<f64> {
        self.moments.predicted_mean(n)
    }

    fn predicted_covariance(&self, n: usize) -> DMatrix<f64> {
        self.moments.predicted_covariance(n)
    }

    fn filtered_mean(&self, n: usize) -> &DVector<f64> {
        self.moments.filtered_mean(n)
    }

    fn filtered_covariance(&self, n: usize) -> DMatrix<f64> {
        self.moments.filtered_covariance(n)
    }

    fn smoothed_mean(&self, n: usize) -> &DVector<f64> {
        self.moments.smoothed_mean(n)
    }

    fn smoothed_covariance(&self, n: usize) -> DMatrix<f64> {
        self.moments.smoothed_covariance(n)
    }

    fn log_likelihood(&self) -> f64 {
        SquareRootFilter::log_likelihood(self)
    }
}
