//! Error types for model setup, filtering and estimation
//!
//! This module provides proper error handling instead of panics. Panics
//! are reserved for internal invariant violations (programmer errors);
//! everything a caller can trigger comes back as one of these enums.

use std::fmt;

/// Errors raised while validating parameters or deriving constants
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Dimension mismatch between expected and actual
    DimensionMismatch {
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
        /// Context (e.g., "initial mean", "observation")
        context: String,
    },

    /// A covariance root is not upper triangular
    NotUpperTriangular {
        /// Which root failed the check
        context: String,
    },

    /// A covariance root has a negative diagonal entry
    NegativeRootDiagonal {
        /// Which root failed the check
        context: String,
        /// Offending diagonal index
        index: usize,
    },

    /// The measurement-noise sub-block of the noise root is singular
    SingularMeasurementNoise {
        /// Offending diagonal index within the observation block
        index: usize,
    },

    /// A supplied covariance is not positive definite
    NotPositiveDefinite {
        /// Which covariance failed the check
        context: String,
    },

    /// An observation sequence is empty
    EmptySequence,

    /// Configuration error
    Configuration {
        /// Description of the configuration issue
        description: String,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::DimensionMismatch {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "Dimension mismatch for {}: expected {}, got {}",
                    context, expected, actual
                )
            }
            ModelError::NotUpperTriangular { context } => {
                write!(f, "Covariance root is not upper triangular: {}", context)
            }
            ModelError::NegativeRootDiagonal { context, index } => {
                write!(
                    f,
                    "Covariance root has negative diagonal entry {} in {}",
                    index, context
                )
            }
            ModelError::SingularMeasurementNoise { index } => {
                write!(
                    f,
                    "Measurement-noise root is singular at diagonal entry {}",
                    index
                )
            }
            ModelError::NotPositiveDefinite { context } => {
                write!(f, "Covariance is not positive definite: {}", context)
            }
            ModelError::EmptySequence => write!(f, "Observation sequence is empty"),
            ModelError::Configuration { description } => {
                write!(f, "Configuration error: {}", description)
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// Errors that can occur during filtering or smoothing
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// The innovation-covariance root became singular at a given step
    SingularInnovation {
        /// Time index at which the inversion failed
        step: usize,
    },

    /// The predicted-covariance root became singular at a given step
    SingularPredictedRoot {
        /// Time index at which the inversion failed
        step: usize,
    },

    /// Dimension mismatch between expected and actual
    DimensionMismatch {
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
        /// Context (e.g., "observation at step 3")
        context: String,
    },

    /// Statistics were requested before a smoothing pass completed
    SmootherNotRun,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::SingularInnovation { step } => {
                write!(f, "Innovation-covariance root singular at step {}", step)
            }
            FilterError::SingularPredictedRoot { step } => {
                write!(f, "Predicted-covariance root singular at step {}", step)
            }
            FilterError::DimensionMismatch {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "Dimension mismatch for {}: expected {}, got {}",
                    context, expected, actual
                )
            }
            FilterError::SmootherNotRun => {
                write!(f, "Smoothed moments required but no smoothing pass has run")
            }
        }
    }
}

impl std::error::Error for FilterError {}

/// Errors that can occur during EM parameter estimation
#[derive(Debug, Clone, PartialEq)]
pub enum EstimationError {
    /// A filtering or smoothing pass failed
    Filter(FilterError),

    /// Re-derived parameters failed validation
    Model(ModelError),

    /// The (state, observation)-correlation root is singular
    SingularCorrelation {
        /// Which correlation root failed (e.g., "transition")
        context: String,
    },

    /// No observation sequences were supplied
    NoSequences,

    /// The representative sequence index is out of range
    InvalidRepresentative {
        /// Requested index
        index: usize,
        /// Number of available sequences
        sequences: usize,
    },
}

impl fmt::Display for EstimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationError::Filter(e) => write!(f, "Filtering failed: {}", e),
            EstimationError::Model(e) => write!(f, "Parameter update failed: {}", e),
            EstimationError::SingularCorrelation { context } => {
                write!(f, "Correlation root singular: {}", context)
            }
            EstimationError::NoSequences => write!(f, "No observation sequences supplied"),
            EstimationError::InvalidRepresentative { index, sequences } => {
                write!(
                    f,
                    "Representative sequence {} out of range ({} sequences)",
                    index, sequences
                )
            }
        }
    }
}

impl std::error::Error for EstimationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EstimationError::Filter(e) => Some(e),
            EstimationError::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FilterError> for EstimationError {
    fn from(e: FilterError) -> Self {
        EstimationError::Filter(e)
    }
}

impl From<ModelError> for EstimationError {
    fn from(e: ModelError) -> Self {
        EstimationError::Model(e)
    }
}
