/*!
# Square-root Kalman smoothing and EM estimation

Rust implementation of a numerically robust, square-root-factored Kalman
filter/smoother for linear-Gaussian state-space models whose state
concatenates a hidden sub-state with the previous observation, plus the
EM loop that learns the transition matrix and noise covariance from one
or more observed sequences.

## Features

- Filtering, smoothing and log-likelihood evaluation on triangular
  covariance roots; positive semi-definiteness holds by construction
- EM parameter estimation with square-root-factored sufficient
  statistics, multi-sequence fusion and an optional iteration trace
- A direct-covariance filter variant behind the same trait, for
  cross-validation
- Deterministic ground-truth simulation for tests and benchmarks

## Modules

- [`model`] - parameters, dimension split, derived decorrelation constants
- [`filter`] - prediction, update, smoothing; the two filter variants
- [`em`] - statistics accumulation, fusion, maximization, orchestration
- [`common`] - square-root primitives, Gaussian helpers, RNG

## Example

```rust
use sqrt_kalman_em_rs::{EmConfig, EmEstimator, StateDims, StateSpaceParams};
use nalgebra::{DMatrix, DVector};

// Scalar hidden state, scalar observation.
let params = StateSpaceParams::new(
    StateDims::new(1, 1),
    DVector::from_vec(vec![0.0, 0.0]),
    DMatrix::identity(2, 2),
    DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.0, 0.5]),
    DMatrix::identity(2, 2) * 0.1,
).unwrap();

let mut em = EmEstimator::new(
    params,
    EmConfig::default().with_iterations(5).with_history(),
).unwrap();

let observations: Vec<DVector<f64>> =
    (0..100).map(|i| DVector::from_vec(vec![(i as f64 * 0.1).sin()])).collect();
em.add_sequence(observations).unwrap();

let trace = em.run().unwrap().unwrap();
assert_eq!(trace.len(), 5);
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Square-root primitives, Gaussian helpers and the deterministic RNG
pub mod common;

/// Model parameters and derived decorrelation constants
pub mod model;

/// Filtering and smoothing recursions and the two filter variants
pub mod filter;

/// EM parameter estimation
pub mod em;

/// Error types
pub mod errors;

/// Observer callbacks for EM runs
pub mod reporter;

/// Ground-truth simulation
pub mod simulate;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// Core types
pub use model::{DerivedConstants, NoiseStructure, StateDims, StateSpaceParams};

// Filters
pub use filter::{DirectFilter, MomentSequence, SequenceSmoother, SquareRootFilter};

// Estimation
pub use em::{
    EmConfig, EmEstimator, EmIteration, EmTrace, FusedStatistics, InitialStatePolicy,
    SufficientStatistics,
};

// Errors
pub use errors::{EstimationError, FilterError, ModelError};

// Reporters
pub use reporter::{EmReporter, LogReporter, NoOpReporter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
