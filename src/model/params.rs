//! State-space model parameters
//!
//! The tracked model is linear-Gaussian over a composite state that
//! concatenates a hidden sub-state `x` with the previous observation `y`:
//!
//! ```text
//! t_n = [x_n; y_{n-1}]          (dimension n_t = n_x + n_y)
//! t_{n+1} = F * t_n + w_n       w_n ~ N(0, Q)
//! ```
//!
//! The observation enters through the lower block of the state, so
//! process and measurement noise are modeled jointly and may be
//! correlated. All covariances are stored as upper-triangular roots
//! `S` with `P = S * Sᵀ` and non-negative diagonal; the blocks of a root
//! in `[x; y]` ordering are
//!
//! ```text
//! S = [ A  B ]      A: n_x × n_x,  B: n_x × n_y,  C: n_y × n_y
//!     [ 0  C ]
//! ```
//!
//! Sub-blocks of `F` and the roots are exposed as index-range views into
//! the single backing buffer; they are never separately allocated.

use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};
use serde::Serialize;

use crate::common::triangular;
use crate::errors::ModelError;

/// Tolerance for the upper-triangularity check on supplied roots.
const TRIANGULARITY_TOLERANCE: f64 = 1e-12;

/// Dimensions of the composite state: hidden sub-state and observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateDims {
    /// Hidden sub-state dimension
    pub n_x: usize,
    /// Observation dimension
    pub n_y: usize,
}

impl StateDims {
    /// Create a new dimension split
    pub fn new(n_x: usize, n_y: usize) -> Self {
        Self { n_x, n_y }
    }

    /// Composite state dimension
    #[inline]
    pub fn n_t(&self) -> usize {
        self.n_x + self.n_y
    }
}

/// Full parameter set of the state-space model.
///
/// Supplied at construction and mutated in place by every EM
/// maximization step. The invariant maintained across all mutations:
/// both roots stay upper triangular with non-negative diagonal, so the
/// covariances they imply stay symmetric positive semi-definite without
/// ever being formed.
#[derive(Debug, Clone, Serialize)]
pub struct StateSpaceParams {
    dims: StateDims,
    /// Initial state mean (n_t)
    t0: DVector<f64>,
    /// Initial covariance root (n_t × n_t, upper triangular)
    q0_root: DMatrix<f64>,
    /// Transition matrix (n_t × n_t)
    f: DMatrix<f64>,
    /// Noise covariance root (n_t × n_t, upper triangular)
    q_root: DMatrix<f64>,
}

impl StateSpaceParams {
    /// Create a validated parameter set from roots.
    ///
    /// # Arguments
    /// * `dims` - the (n_x, n_y) split
    /// * `t0` - initial state mean (length n_t)
    /// * `q0_root` - initial covariance root (n_t × n_t, upper triangular)
    /// * `f` - transition matrix (n_t × n_t)
    /// * `q_root` - noise covariance root (n_t × n_t, upper triangular)
    ///
    /// # Returns
    /// The parameter set, or a [`ModelError`] describing the violated
    /// precondition.
    pub fn new(
        dims: StateDims,
        t0: DVector<f64>,
        q0_root: DMatrix<f64>,
        f: DMatrix<f64>,
        q_root: DMatrix<f64>,
    ) -> Result<Self, ModelError> {
        let params = Self {
            dims,
            t0,
            q0_root,
            f,
            q_root,
        };
        params.validate()?;
        Ok(params)
    }

    /// Create a parameter set from full covariances instead of roots.
    ///
    /// Factors `q0` and `q` internally; both must be symmetric positive
    /// definite.
    pub fn from_covariances(
        dims: StateDims,
        t0: DVector<f64>,
        q0: DMatrix<f64>,
        f: DMatrix<f64>,
        q: DMatrix<f64>,
    ) -> Result<Self, ModelError> {
        let q0_root = upper_root_of(&q0, "initial covariance")?;
        let q_root = upper_root_of(&q, "noise covariance")?;
        Self::new(dims, t0, q0_root, f, q_root)
    }

    /// Re-check all structural invariants.
    ///
    /// Called at construction and after every in-place parameter update.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n_t = self.dims.n_t();
        if self.dims.n_x == 0 || self.dims.n_y == 0 {
            return Err(ModelError::Configuration {
                description: "state and observation dimensions must both be positive".to_string(),
            });
        }
        if self.t0.len() != n_t {
            return Err(ModelError::DimensionMismatch {
                expected: n_t,
                actual: self.t0.len(),
                context: "initial mean".to_string(),
            });
        }
        for (m, name) in [
            (&self.q0_root, "initial covariance root"),
            (&self.f, "transition matrix"),
            (&self.q_root, "noise covariance root"),
        ] {
            if m.nrows() != n_t || m.ncols() != n_t {
                return Err(ModelError::DimensionMismatch {
                    expected: n_t,
                    actual: m.nrows().max(m.ncols()),
                    context: name.to_string(),
                });
            }
        }
        check_root(&self.q0_root, "initial covariance root")?;
        check_root(&self.q_root, "noise covariance root")?;
        Ok(())
    }

    /// Dimension split
    #[inline]
    pub fn dims(&self) -> StateDims {
        self.dims
    }

    /// Initial state mean
    #[inline]
    pub fn t0(&self) -> &DVector<f64> {
        &self.t0
    }

    /// Initial covariance root
    #[inline]
    pub fn q0_root(&self) -> &DMatrix<f64> {
        &self.q0_root
    }

    /// Transition matrix
    #[inline]
    pub fn f(&self) -> &DMatrix<f64> {
        &self.f
    }

    /// Noise covariance root
    #[inline]
    pub fn q_root(&self) -> &DMatrix<f64> {
        &self.q_root
    }

    // ------------------------------------------------------------------
    // Block views (index computations into the backing buffers)
    // ------------------------------------------------------------------

    /// Hidden-state block of the initial mean
    #[inline]
    pub fn t0_x(&self) -> DVectorView<'_, f64> {
        self.t0.rows(0, self.dims.n_x)
    }

    /// Observation block of the initial mean (the initial lagged
    /// observation)
    #[inline]
    pub fn t0_y(&self) -> DVectorView<'_, f64> {
        self.t0.rows(self.dims.n_x, self.dims.n_y)
    }

    /// Hidden-state rows of the transition matrix, `F_x•` (n_x × n_t)
    #[inline]
    pub fn f_x(&self) -> DMatrixView<'_, f64> {
        self.f.view((0, 0), (self.dims.n_x, self.dims.n_t()))
    }

    /// Observation rows of the transition matrix, `F_y•` (n_y × n_t)
    #[inline]
    pub fn f_y(&self) -> DMatrixView<'_, f64> {
        self.f
            .view((self.dims.n_x, 0), (self.dims.n_y, self.dims.n_t()))
    }

    /// `F_yx` block (n_y × n_x)
    #[inline]
    pub fn f_yx(&self) -> DMatrixView<'_, f64> {
        self.f
            .view((self.dims.n_x, 0), (self.dims.n_y, self.dims.n_x))
    }

    /// `F_yy` block (n_y × n_y)
    #[inline]
    pub fn f_yy(&self) -> DMatrixView<'_, f64> {
        self.f.view(
            (self.dims.n_x, self.dims.n_x),
            (self.dims.n_y, self.dims.n_y),
        )
    }

    /// `A` block of the noise root (n_x × n_x)
    #[inline]
    pub fn q_root_xx(&self) -> DMatrixView<'_, f64> {
        self.q_root.view((0, 0), (self.dims.n_x, self.dims.n_x))
    }

    /// `B` block of the noise root (n_x × n_y)
    #[inline]
    pub fn q_root_xy(&self) -> DMatrixView<'_, f64> {
        self.q_root
            .view((0, self.dims.n_x), (self.dims.n_x, self.dims.n_y))
    }

    /// `C` block of the noise root (n_y × n_y)
    #[inline]
    pub fn q_root_yy(&self) -> DMatrixView<'_, f64> {
        self.q_root.view(
            (self.dims.n_x, self.dims.n_x),
            (self.dims.n_y, self.dims.n_y),
        )
    }

    /// `A` block of the initial covariance root (n_x × n_x)
    #[inline]
    pub fn q0_root_xx(&self) -> DMatrixView<'_, f64> {
        self.q0_root.view((0, 0), (self.dims.n_x, self.dims.n_x))
    }

    // ------------------------------------------------------------------
    // In-place mutation (maximization step only)
    // ------------------------------------------------------------------

    pub(crate) fn f_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.f
    }

    pub(crate) fn q_root_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.q_root
    }

    pub(crate) fn t0_mut(&mut self) -> &mut DVector<f64> {
        &mut self.t0
    }

    pub(crate) fn q0_root_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.q0_root
    }
}

/// Check that a root is upper triangular with non-negative diagonal.
fn check_root(root: &DMatrix<f64>, context: &str) -> Result<(), ModelError> {
    let n = root.nrows();
    for i in 0..n {
        if root[(i, i)] < 0.0 {
            return Err(ModelError::NegativeRootDiagonal {
                context: context.to_string(),
                index: i,
            });
        }
        for j in 0..i {
            if root[(i, j)].abs() > TRIANGULARITY_TOLERANCE {
                return Err(ModelError::NotUpperTriangular {
                    context: context.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Factor a symmetric positive-definite covariance into an
/// upper-triangular root with `P = S * Sᵀ`.
fn upper_root_of(cov: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>, ModelError> {
    let n = cov.nrows();
    let chol = cov
        .clone()
        .cholesky()
        .ok_or_else(|| ModelError::NotPositiveDefinite {
            context: context.to_string(),
        })?;
    // Cholesky yields a lower factor; one orthogonal reduction converts
    // it to the canonical upper form.
    let mut buf = DMatrix::zeros(n, n);
    buf.copy_from(&chol.l());
    let mut scratch = DVector::zeros(n);
    triangular::reduce_to_upper(&mut buf, n, n, &mut scratch);
    Ok(buf)
}
