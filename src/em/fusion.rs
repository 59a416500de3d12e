//! Fusion of per-sequence sufficient statistics
//!
//! Statistics from independently observed sequences of the same model
//! are combined before the shared maximization step. Because the
//! per-sequence sums are factored, the combination is one orthogonal
//! reduction of the stacked roots, which is algebraically identical to
//! summing the un-factored sums.
//!
//! The per-sequence initial-state estimates are merged under an explicit
//! policy: copy one designated sequence's first smoothed moment, or
//! combine all sequences by inverse-covariance weighting (computed in
//! root form).

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::common::triangular;
use crate::errors::EstimationError;

use super::statistics::{SqrtAccumulator, SufficientStatistics};

/// How per-sequence initial-state estimates are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitialStatePolicy {
    /// Copy the first smoothed moment of the given sequence
    Representative(usize),
    /// Inverse-covariance weighted combination of all sequences
    PrecisionWeighted,
}

impl Default for InitialStatePolicy {
    fn default() -> Self {
        InitialStatePolicy::Representative(0)
    }
}

/// Combined sufficient statistics of all sequences.
#[derive(Debug, Clone)]
pub struct FusedStatistics {
    pub(crate) transition_root: DMatrix<f64>,
    pub(crate) observation_root: DMatrix<f64>,
    pub(crate) transitions: usize,
    pub(crate) initial_mean: DVector<f64>,
    pub(crate) initial_root: DMatrix<f64>,
}

impl FusedStatistics {
    /// Root of the combined transition correlation sum
    #[inline]
    pub fn transition_root(&self) -> &DMatrix<f64> {
        &self.transition_root
    }

    /// Root of the combined observation correlation sum
    #[inline]
    pub fn observation_root(&self) -> &DMatrix<f64> {
        &self.observation_root
    }

    /// Total transition count across all fused sequences
    #[inline]
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    /// Merged initial mean (hidden block)
    #[inline]
    pub fn initial_mean(&self) -> &DVector<f64> {
        &self.initial_mean
    }

    /// Merged initial covariance root (hidden block)
    #[inline]
    pub fn initial_root(&self) -> &DMatrix<f64> {
        &self.initial_root
    }
}

/// Re-triangularize the concatenation of same-shaped accumulator roots.
fn fuse_roots<'a>(first: &SqrtAccumulator, rest: impl Iterator<Item = &'a SqrtAccumulator>) -> DMatrix<f64> {
    let dim = first.dim();
    let mut buf = DMatrix::zeros(dim, 2 * dim);
    let mut scratch = DVector::zeros(2 * dim);
    let mut acc = first.root().clone();
    for other in rest {
        debug_assert_eq!(other.dim(), dim);
        buf.view_mut((0, 0), (dim, dim)).copy_from(&acc);
        buf.view_mut((0, dim), (dim, dim)).copy_from(other.root());
        triangular::reduce_to_upper(&mut buf, dim, 2 * dim, &mut scratch);
        acc.copy_from(&buf.view((0, 0), (dim, dim)));
    }
    acc
}

/// Combine per-sequence statistics into one.
///
/// # Errors
/// - [`EstimationError::NoSequences`] for an empty input
/// - [`EstimationError::InvalidRepresentative`] when the designated
///   sequence index is out of range
/// - [`EstimationError::SingularCorrelation`] when a per-sequence
///   initial root cannot be inverted under the precision-weighted policy
pub fn fuse(
    stats: &[SufficientStatistics],
    policy: InitialStatePolicy,
) -> Result<FusedStatistics, EstimationError> {
    let first = stats.first().ok_or(EstimationError::NoSequences)?;

    let transition_root = fuse_roots(&first.transition, stats[1..].iter().map(|s| &s.transition));
    let observation_root =
        fuse_roots(&first.observation, stats[1..].iter().map(|s| &s.observation));
    let transitions = stats.iter().map(|s| s.transitions).sum();

    let (initial_mean, initial_root) = match policy {
        InitialStatePolicy::Representative(index) => {
            let chosen = stats
                .get(index)
                .ok_or(EstimationError::InvalidRepresentative {
                    index,
                    sequences: stats.len(),
                })?;
            (chosen.initial_mean.clone(), chosen.initial_root.clone())
        }
        InitialStatePolicy::PrecisionWeighted => precision_weighted_initial(stats)?,
    };

    Ok(FusedStatistics {
        transition_root,
        observation_root,
        transitions,
        initial_mean,
        initial_root,
    })
}

/// Inverse-covariance weighted merge of the first smoothed moments.
///
/// Works entirely on roots: the per-sequence information roots `S⁻ᵀ`
/// are stacked and re-triangularized into a root of the total
/// information, which is then inverted (one small triangular inverse)
/// back to a covariance root.
fn precision_weighted_initial(
    stats: &[SufficientStatistics],
) -> Result<(DVector<f64>, DMatrix<f64>), EstimationError> {
    let n_x = stats[0].initial_mean.len();
    let singular = |_| EstimationError::SingularCorrelation {
        context: "initial covariance root".to_string(),
    };

    let mut info_stack = DMatrix::zeros(n_x, n_x * stats.len());
    let mut info_vector = DVector::zeros(n_x);
    for (k, s) in stats.iter().enumerate() {
        let inv = triangular::invert_upper(&s.initial_root, (0, 0), n_x).map_err(singular)?;
        info_stack
            .view_mut((0, k * n_x), (n_x, n_x))
            .copy_from(&inv.transpose());

        // Information vector contribution S⁻ᵀ · S⁻¹ · mean.
        let mut z = s.initial_mean.clone();
        triangular::solve_upper_in_place(&s.initial_root, (0, 0), n_x, &mut z).map_err(singular)?;
        info_vector.gemv(1.0, &inv.transpose(), &z, 1.0);
    }

    let mut scratch = DVector::zeros(n_x * stats.len());
    triangular::reduce_to_upper(&mut info_stack, n_x, n_x * stats.len(), &mut scratch);
    let info_root = info_stack.view((0, 0), (n_x, n_x)).into_owned();

    // Covariance root from the information root: the transposed inverse
    // is a lower-triangular root, one reduction restores the canonical
    // upper form.
    let inv_info = triangular::invert_upper(&info_root, (0, 0), n_x).map_err(singular)?;
    let mut cov_root = inv_info.transpose();
    let mut scratch2 = DVector::zeros(n_x);
    triangular::reduce_to_upper(&mut cov_root, n_x, n_x, &mut scratch2);

    let mean = &cov_root * cov_root.transpose() * info_vector;
    Ok((mean, cov_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::em::statistics::accumulate;
    use crate::filter::sqrt::SquareRootFilter;
    use crate::model::params::{StateDims, StateSpaceParams};

    fn params() -> StateSpaceParams {
        StateSpaceParams::new(
            StateDims::new(1, 1),
            DVector::from_vec(vec![0.0, 0.0]),
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 2, &[0.9, 0.0, 0.8, 0.1]),
            DMatrix::from_row_slice(2, 2, &[0.2, 0.05, 0.0, 0.3]),
        )
        .unwrap()
    }

    fn sequence(seed: u64, n: usize) -> Vec<DVector<f64>> {
        use crate::common::rng::{Rng, SimpleRng};
        let mut rng = SimpleRng::new(seed);
        (0..n)
            .map(|_| DVector::from_vec(vec![rng.randn() * 0.5]))
            .collect()
    }

    fn stats_for(seq: &[DVector<f64>]) -> SufficientStatistics {
        let params = params();
        let mut filter = SquareRootFilter::new(params.clone()).unwrap();
        filter.smooth(seq).unwrap();
        accumulate(&params, filter.moments(), seq).unwrap()
    }

    #[test]
    fn test_fuse_empty_fails() {
        assert_eq!(
            fuse(&[], InitialStatePolicy::default()).unwrap_err(),
            EstimationError::NoSequences
        );
    }

    #[test]
    fn test_fused_sum_equals_sum_of_sums() {
        let a = stats_for(&sequence(5, 9));
        let b = stats_for(&sequence(17, 14));

        let fused = fuse(
            &[a.clone(), b.clone()],
            InitialStatePolicy::Representative(0),
        )
        .unwrap();

        let direct = a.transition.implied_sum() + b.transition.implied_sum();
        let implied = fused.transition_root() * fused.transition_root().transpose();
        assert!((&implied - &direct).norm() < 1e-9 * (1.0 + direct.norm()));

        let direct_obs = a.observation.implied_sum() + b.observation.implied_sum();
        let implied_obs = fused.observation_root() * fused.observation_root().transpose();
        assert!((&implied_obs - &direct_obs).norm() < 1e-9 * (1.0 + direct_obs.norm()));

        assert_eq!(fused.transitions(), 23);
    }

    #[test]
    fn test_representative_policy_copies_designated_sequence() {
        let a = stats_for(&sequence(5, 9));
        let b = stats_for(&sequence(17, 14));
        let fused = fuse(
            &[a.clone(), b.clone()],
            InitialStatePolicy::Representative(1),
        )
        .unwrap();
        assert_eq!(fused.initial_mean(), b.initial_mean());
        assert_eq!(fused.initial_root(), b.initial_root());
    }

    #[test]
    fn test_representative_out_of_range() {
        let a = stats_for(&sequence(5, 9));
        let err = fuse(&[a], InitialStatePolicy::Representative(3)).unwrap_err();
        assert!(matches!(err, EstimationError::InvalidRepresentative { index: 3, sequences: 1 }));
    }

    #[test]
    fn test_precision_weighted_matches_dense_information_fusion() {
        let a = stats_for(&sequence(5, 9));
        let b = stats_for(&sequence(17, 14));
        let fused = fuse(
            &[a.clone(), b.clone()],
            InitialStatePolicy::PrecisionWeighted,
        )
        .unwrap();

        // Dense reference: scalar case.
        let pa = a.initial_root()[(0, 0)].powi(2);
        let pb = b.initial_root()[(0, 0)].powi(2);
        let info = 1.0 / pa + 1.0 / pb;
        let expected_var = 1.0 / info;
        let expected_mean =
            expected_var * (a.initial_mean()[0] / pa + b.initial_mean()[0] / pb);

        let var = fused.initial_root()[(0, 0)].powi(2);
        assert!((var - expected_var).abs() < 1e-10);
        assert!((fused.initial_mean()[0] - expected_mean).abs() < 1e-10);
    }
}
