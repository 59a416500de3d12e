//! Filter implementations
//!
//! The forward/backward recursion split into its steps (`prediction`,
//! `update`, `smoothing`),
//!
//! and the two covariance-representation policies behind
//! [`SequenceSmoother`]:
//!
//! - [`SquareRootFilter`] - triangular covariance roots, the primary
//!   variant the EM estimator runs on
//! - [`DirectFilter`] - full covariances with the Joseph-form update,
//!   kept as an independent cross-validation reference

pub mod direct;
pub mod moments;
pub(crate) mod prediction;
pub(crate) mod smoothing;
pub mod sqrt;
pub mod traits;
pub(crate) mod update;
pub mod workspace;

pub use direct::DirectFilter;
pub use moments::MomentSequence;
pub use sqrt::SquareRootFilter;
pub use traits::SequenceSmoother;
pub use workspace::FilterWorkspace;
