//! EM parameter estimation
//!
//! Expectation-maximization for the state-space model, square-root
//! factored end to end:
//!
//! - [`statistics`] - per-sequence sufficient-statistics accumulation
//! - [`fusion`] - combination of statistics across sequences
//! - [`maximization`] - closed-form re-estimation of `F` and the noise root
//! - [`estimator`] - the iteration loop
//! - [`trace`] - optional per-iteration history

pub mod estimator;
pub mod fusion;
pub mod maximization;
pub mod statistics;
pub mod trace;

pub use estimator::{EmConfig, EmEstimator};
pub use fusion::{fuse, FusedStatistics, InitialStatePolicy};
pub use maximization::maximize;
pub use statistics::{accumulate, SqrtAccumulator, SufficientStatistics};
pub use trace::{EmIteration, EmTrace};
