//! EM orchestrator
//!
//! Iterates expectation and maximization for a fixed number of
//! iterations: for every sequence smooth then accumulate statistics,
//! fuse across sequences, re-estimate the parameters, re-derive the
//! constants, and optionally record a trace entry. There is no built-in
//! convergence check; early stopping between iterations is the caller's
//! decision, informed by the trace.
//!
//! The per-sequence expectation passes are mutually independent. With
//! the `rayon` feature enabled they run as parallel tasks joined before
//! fusion; results are collected in sequence order, so the fused
//! statistics are identical to the serial path.

use nalgebra::DVector;
use serde::Serialize;
use smallvec::SmallVec;

use crate::errors::{EstimationError, ModelError};
use crate::filter::sqrt::SquareRootFilter;
use crate::model::constants::NoiseStructure;
use crate::model::params::StateSpaceParams;
use crate::reporter::{EmReporter, NoOpReporter};

use super::fusion::{self, InitialStatePolicy};
use super::maximization;
use super::statistics::{self, SufficientStatistics};
use super::trace::{EmIteration, EmTrace};

/// Configuration of an EM run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmConfig {
    /// Number of EM iterations to run
    pub iterations: usize,
    /// Record an [`EmTrace`] entry per iteration
    pub track_history: bool,
    /// Re-estimate the initial mean and covariance root of the hidden
    /// block from the fused first smoothed moment
    pub reestimate_initial: bool,
    /// How per-sequence initial-state estimates are merged
    pub initial_policy: InitialStatePolicy,
    /// Noise-structure policy of the decorrelation step
    pub noise_structure: NoiseStructure,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            track_history: false,
            reestimate_initial: false,
            initial_policy: InitialStatePolicy::default(),
            noise_structure: NoiseStructure::default(),
        }
    }
}

impl EmConfig {
    /// Set the iteration count
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Enable per-iteration history tracking
    pub fn with_history(mut self) -> Self {
        self.track_history = true;
        self
    }

    /// Enable initial-state re-estimation
    pub fn with_initial_reestimation(mut self) -> Self {
        self.reestimate_initial = true;
        self
    }

    /// Set the initial-state merge policy
    pub fn with_initial_policy(mut self, policy: InitialStatePolicy) -> Self {
        self.initial_policy = policy;
        self
    }

    /// Set the noise-structure policy
    pub fn with_noise_structure(mut self, structure: NoiseStructure) -> Self {
        self.noise_structure = structure;
        self
    }
}

/// Learns the transition matrix and noise covariance of the model from
/// one or more observed sequences.
///
/// The parameter set supplied at construction is updated in place by
/// every maximization step and can be read back at any point through
/// [`params`](Self::params).
#[derive(Debug, Clone)]
pub struct EmEstimator {
    filter: SquareRootFilter,
    sequences: SmallVec<[Vec<DVector<f64>>; 4]>,
    config: EmConfig,
}

impl EmEstimator {
    /// Create an estimator around an initial parameter set.
    pub fn new(params: StateSpaceParams, config: EmConfig) -> Result<Self, ModelError> {
        let filter = SquareRootFilter::with_noise_structure(params, config.noise_structure)?;
        Ok(Self {
            filter,
            sequences: SmallVec::new(),
            config,
        })
    }

    /// Add one observation sequence.
    ///
    /// # Errors
    /// [`ModelError::EmptySequence`] for an empty sequence and
    /// [`ModelError::DimensionMismatch`] when an observation does not
    /// match the configured observation dimension.
    pub fn add_sequence(&mut self, sequence: Vec<DVector<f64>>) -> Result<(), ModelError> {
        if sequence.is_empty() {
            return Err(ModelError::EmptySequence);
        }
        let n_y = self.filter.params().dims().n_y;
        for (n, y) in sequence.iter().enumerate() {
            if y.len() != n_y {
                return Err(ModelError::DimensionMismatch {
                    expected: n_y,
                    actual: y.len(),
                    context: format!("observation at step {}", n),
                });
            }
        }
        self.sequences.push(sequence);
        Ok(())
    }

    /// Number of registered sequences
    #[inline]
    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    /// Current parameter estimate
    #[inline]
    pub fn params(&self) -> &StateSpaceParams {
        self.filter.params()
    }

    /// Configuration of this estimator
    #[inline]
    pub fn config(&self) -> &EmConfig {
        &self.config
    }

    /// Run the configured number of EM iterations.
    ///
    /// Returns the recorded trace when history tracking is enabled.
    pub fn run(&mut self) -> Result<Option<EmTrace>, EstimationError> {
        self.run_with_reporter(&mut NoOpReporter)
    }

    /// Run with per-phase observer callbacks.
    pub fn run_with_reporter<R: EmReporter>(
        &mut self,
        reporter: &mut R,
    ) -> Result<Option<EmTrace>, EstimationError> {
        if self.sequences.is_empty() {
            return Err(EstimationError::NoSequences);
        }

        let mut trace = self.config.track_history.then(EmTrace::new);

        for iteration in 0..self.config.iterations {
            let results = self.expectation_step()?;

            let mut total_log_likelihood = 0.0;
            let mut stats = SmallVec::<[SufficientStatistics; 4]>::new();
            for (index, (s, log_likelihood)) in results.into_iter().enumerate() {
                reporter.on_sequence_smoothed(index, log_likelihood);
                total_log_likelihood += log_likelihood;
                stats.push(s);
            }

            let fused = fusion::fuse(&stats, self.config.initial_policy)?;
            reporter.on_statistics_fused(fused.transitions());

            let mut params = self.filter.params().clone();
            maximization::maximize(&fused, &mut params, self.config.reestimate_initial)?;
            self.filter.set_params(params)?;

            reporter.on_iteration_complete(iteration, total_log_likelihood);
            log::debug!(
                "EM iteration {} complete: log-likelihood {:.6}",
                iteration,
                total_log_likelihood
            );

            if let Some(trace) = trace.as_mut() {
                let params = self.filter.params();
                trace.push(EmIteration {
                    t0: params.t0().clone(),
                    q0_root: params.q0_root().clone(),
                    f: params.f().clone(),
                    q_root: params.q_root().clone(),
                    log_likelihood: total_log_likelihood,
                });
            }
        }

        Ok(trace)
    }

    /// Smooth and accumulate every sequence, in sequence order.
    #[cfg(not(feature = "rayon"))]
    fn expectation_step(
        &mut self,
    ) -> Result<Vec<(SufficientStatistics, f64)>, EstimationError> {
        let mut results = Vec::with_capacity(self.sequences.len());
        for sequence in self.sequences.iter() {
            self.filter.smooth(sequence)?;
            let log_likelihood = self.filter.log_likelihood();
            let stats =
                statistics::accumulate(self.filter.params(), self.filter.moments(), sequence)?;
            results.push((stats, log_likelihood));
        }
        Ok(results)
    }

    /// Parallel expectation step; one filter clone per task, joined in
    /// sequence order before fusion.
    #[cfg(feature = "rayon")]
    fn expectation_step(
        &mut self,
    ) -> Result<Vec<(SufficientStatistics, f64)>, EstimationError> {
        use rayon::prelude::*;

        let base = self.filter.clone();
        self.sequences
            .as_slice()
            .par_iter()
            .map(|sequence| {
                let mut filter = base.clone();
                filter.smooth(sequence)?;
                let log_likelihood = filter.log_likelihood();
                let stats =
                    statistics::accumulate(filter.params(), filter.moments(), sequence)?;
                Ok((stats, log_likelihood))
            })
            .collect()
    }
}
