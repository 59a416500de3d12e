//! Square-root linear-algebra primitives.
//!
//! Every covariance in this crate is carried as an upper-triangular root
//! `S` with `P = S * Sᵀ` and a non-negative diagonal. The two operations
//! implemented here are the only ways roots are ever combined:
//!
//! - **Right-orthogonal reduction**: given a rectangular array `M` whose
//!   self-product `M * Mᵀ` is the covariance of interest, multiply `M`
//!   from the right by a sequence of Householder reflections until the
//!   leading square block is upper triangular. The self-product is
//!   invariant under right-orthogonal maps, so the leading block is a
//!   valid root of `M * Mᵀ`. Summing covariances, propagating them
//!   through linear maps and conditioning all reduce to this.
//! - **Triangular solves**: back-substitution against a small triangular
//!   factor, used wherever the reference algorithm needs a gain. The full
//!   covariance is never inverted.
//!
//! All routines operate on a window of a caller-owned buffer so the hot
//! recursion loops run without allocating.

use nalgebra::{DMatrix, DVector};

/// Entries with absolute value at or below this are treated as zero when
/// a triangular diagonal must be inverted.
pub(crate) const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Brings the row block `row0..row0 + nrows` of the logical
/// `total_rows × total_cols` array in `m` to upper-triangular form by
/// right-multiplication with Householder reflections.
///
/// The diagonal of the block is placed at columns `row0..row0 + nrows`
/// and is non-negative on return; all other entries of the processed rows
/// in columns `row0..total_cols` are exactly zero. Columns left of `row0`
/// are never touched, and the reflections are applied to every logical
/// row, so the self-product of the whole array is preserved.
///
/// Rows outside the block that already have zeros in the affected columns
/// are left untouched; this is what allows two chained calls to produce a
/// block-lower-triangular array (see [`reduce_two_block`]).
///
/// `scratch` must have length at least `total_cols`.
pub(crate) fn triangularize_block(
    m: &mut DMatrix<f64>,
    total_rows: usize,
    total_cols: usize,
    row0: usize,
    nrows: usize,
    scratch: &mut DVector<f64>,
) {
    debug_assert!(row0 + nrows <= total_rows);
    debug_assert!(row0 + nrows <= total_cols);
    debug_assert!(scratch.len() >= total_cols);

    let col0 = row0;
    let right0 = col0 + nrows;

    for i in (0..nrows).rev() {
        let pr = row0 + i;
        let pc = col0 + i;

        // Active columns for this reflection: the untriangularized part of
        // the diagonal block plus the entire right block. Rows of the block
        // below `pr` are already zero there and stay zero.
        let mut norm2 = 0.0;
        for c in (col0..=pc).chain(right0..total_cols) {
            let v = m[(pr, c)];
            norm2 += v * v;
        }
        if norm2 <= f64::MIN_POSITIVE {
            for c in (col0..=pc).chain(right0..total_cols) {
                m[(pr, c)] = 0.0;
            }
            continue;
        }

        let norm = norm2.sqrt();
        let pivot = m[(pr, pc)];
        // Reflect away from the pivot sign so v = r - alpha*e never cancels.
        let alpha = if pivot >= 0.0 { -norm } else { norm };

        for c in (col0..=pc).chain(right0..total_cols) {
            scratch[c] = m[(pr, c)];
        }
        scratch[pc] -= alpha;
        let vtv = 2.0 * (norm2 - alpha * pivot);
        let tau = 2.0 / vtv;

        for r in 0..total_rows {
            if r == pr || (r > pr && r < row0 + nrows) {
                continue;
            }
            let mut dot = 0.0;
            for c in (col0..=pc).chain(right0..total_cols) {
                dot += m[(r, c)] * scratch[c];
            }
            if dot != 0.0 {
                let scale = tau * dot;
                for c in (col0..=pc).chain(right0..total_cols) {
                    m[(r, c)] -= scale * scratch[c];
                }
            }
        }

        for c in (col0..=pc).chain(right0..total_cols) {
            m[(pr, c)] = 0.0;
        }
        m[(pr, pc)] = alpha;
    }

    // A root is only unique up to column signs; settle on a non-negative
    // diagonal. Column flips are themselves right-orthogonal maps.
    for i in 0..nrows {
        let pc = col0 + i;
        if m[(row0 + i, pc)] < 0.0 {
            for r in 0..total_rows {
                m[(r, pc)] = -m[(r, pc)];
            }
        }
    }
}

/// Reduces the logical `rows × cols` array in `m` (with `cols >= rows`)
/// to `[S | 0]` where `S` is upper triangular with non-negative diagonal
/// and `S * Sᵀ` equals the self-product of the input array.
pub(crate) fn reduce_to_upper(
    m: &mut DMatrix<f64>,
    rows: usize,
    cols: usize,
    scratch: &mut DVector<f64>,
) {
    triangularize_block(m, rows, cols, 0, rows, scratch);
}

/// Reduces the logical `rows × cols` array in `m` to the block form
///
/// ```text
/// [ S_top    0  ]
/// [ G      S_bot ]
/// ```
///
/// with `S_top` (`top × top`) and `S_bot` upper triangular. Reading the
/// block identities off the preserved self-product: `S_top` is a root of
/// the top block's self-product, `G * S_topᵀ` the cross product, and
/// `S_bot` a root of the bottom block's conditional (Schur) complement.
/// This single reduction is what yields covariance root, gain numerator
/// and conditional root simultaneously in the filter recursions.
pub(crate) fn reduce_two_block(
    m: &mut DMatrix<f64>,
    rows: usize,
    cols: usize,
    top: usize,
    scratch: &mut DVector<f64>,
) {
    debug_assert!(top <= rows);
    triangularize_block(m, rows, cols, 0, top, scratch);
    triangularize_block(m, rows, cols, top, rows - top, scratch);
}

/// Solves `X * S = B` in place for the upper-triangular `n × n` window of
/// `s` at `s_off`, overwriting the leading `x_rows × n` block of `x`
/// (which holds `B` on entry) with `X`.
///
/// Returns the offending diagonal index if the factor is numerically
/// singular; `x` is partially overwritten in that case.
pub(crate) fn solve_right_upper_in_place(
    s: &DMatrix<f64>,
    s_off: (usize, usize),
    n: usize,
    x: &mut DMatrix<f64>,
    x_rows: usize,
) -> Result<(), usize> {
    for j in 0..n {
        let d = s[(s_off.0 + j, s_off.1 + j)];
        if d.abs() <= SINGULARITY_TOLERANCE {
            return Err(j);
        }
        for r in 0..x_rows {
            let mut acc = x[(r, j)];
            for k in 0..j {
                acc -= x[(r, k)] * s[(s_off.0 + k, s_off.1 + j)];
            }
            x[(r, j)] = acc / d;
        }
    }
    Ok(())
}

/// Solves `S * z = b` in place by back-substitution for the
/// upper-triangular `n × n` window of `s` at `s_off`; `z` holds `b` on
/// entry and the solution on return.
///
/// Returns the offending diagonal index if the factor is numerically
/// singular.
pub(crate) fn solve_upper_in_place(
    s: &DMatrix<f64>,
    s_off: (usize, usize),
    n: usize,
    z: &mut DVector<f64>,
) -> Result<(), usize> {
    for i in (0..n).rev() {
        let d = s[(s_off.0 + i, s_off.1 + i)];
        if d.abs() <= SINGULARITY_TOLERANCE {
            return Err(i);
        }
        let mut acc = z[i];
        for k in i + 1..n {
            acc -= s[(s_off.0 + i, s_off.1 + k)] * z[k];
        }
        z[i] = acc / d;
    }
    Ok(())
}

/// Inverts the upper-triangular `n × n` window of `s` at `s_off` into a
/// freshly allocated matrix. Used only outside the per-step recursions.
pub(crate) fn invert_upper(
    s: &DMatrix<f64>,
    s_off: (usize, usize),
    n: usize,
) -> Result<DMatrix<f64>, usize> {
    let mut inv = DMatrix::<f64>::identity(n, n);
    for col in 0..n {
        for i in (0..n).rev() {
            let d = s[(s_off.0 + i, s_off.1 + i)];
            if d.abs() <= SINGULARITY_TOLERANCE {
                return Err(i);
            }
            let mut acc = inv[(i, col)];
            for k in i + 1..n {
                acc -= s[(s_off.0 + i, s_off.1 + k)] * inv[(k, col)];
            }
            inv[(i, col)] = acc / d;
        }
    }
    Ok(inv)
}

/// Log-determinant of the covariance implied by the upper-triangular
/// `n × n` window of `s` at `s_off`: `ln det(S * Sᵀ) = 2 Σ ln s_ii`.
///
/// The caller must have established that the diagonal is strictly
/// positive (a singular factor is rejected earlier, at the solve).
pub(crate) fn log_det_from_root(s: &DMatrix<f64>, s_off: (usize, usize), n: usize) -> f64 {
    let mut acc = 0.0;
    for i in 0..n {
        acc += s[(s_off.0 + i, s_off.1 + i)].ln();
    }
    2.0 * acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rng::{Rng, SimpleRng};

    fn random_matrix(rng: &mut SimpleRng, rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |_, _| rng.randn())
    }

    fn self_product(m: &DMatrix<f64>, rows: usize, cols: usize) -> DMatrix<f64> {
        let view = m.view((0, 0), (rows, cols));
        &view * view.transpose()
    }

    #[test]
    fn test_reduce_preserves_self_product() {
        let mut rng = SimpleRng::new(7);
        for &(rows, cols) in &[(1usize, 3usize), (3, 3), (3, 7), (5, 11)] {
            let mut m = random_matrix(&mut rng, rows, cols);
            let before = self_product(&m, rows, cols);
            let mut scratch = DVector::zeros(cols);
            reduce_to_upper(&mut m, rows, cols, &mut scratch);
            let after = self_product(&m, rows, cols);
            assert!((&before - &after).norm() < 1e-10 * (1.0 + before.norm()));
        }
    }

    #[test]
    fn test_reduce_yields_upper_triangular_nonnegative_diagonal() {
        let mut rng = SimpleRng::new(11);
        let rows = 4;
        let cols = 9;
        let mut m = random_matrix(&mut rng, rows, cols);
        let mut scratch = DVector::zeros(cols);
        reduce_to_upper(&mut m, rows, cols, &mut scratch);

        for i in 0..rows {
            assert!(m[(i, i)] >= 0.0, "diagonal must be non-negative");
            for j in 0..i {
                assert_eq!(m[(i, j)], 0.0, "below-diagonal entry must be zero");
            }
            for j in rows..cols {
                assert_eq!(m[(i, j)], 0.0, "right block must be zeroed");
            }
        }
    }

    #[test]
    fn test_two_block_structure_and_identities() {
        let mut rng = SimpleRng::new(3);
        let top = 2;
        let bottom = 3;
        let rows = top + bottom;
        let cols = rows + 2;
        let mut m = random_matrix(&mut rng, rows, cols);
        let before = self_product(&m, rows, cols);

        let mut scratch = DVector::zeros(cols);
        reduce_two_block(&mut m, rows, cols, top, &mut scratch);

        // Top rows: [S_top | 0], bottom rows: [G | S_bot | 0].
        for i in 0..top {
            for j in 0..i {
                assert!(m[(i, j)].abs() < 1e-14);
            }
            for j in top..cols {
                assert!(m[(i, j)].abs() < 1e-14);
            }
        }
        for i in 0..bottom {
            for j in top..top + i {
                assert!(m[(top + i, j)].abs() < 1e-14);
            }
            for j in rows..cols {
                assert!(m[(top + i, j)].abs() < 1e-14);
            }
        }

        // Block identities against the preserved self-product.
        let s_top = m.view((0, 0), (top, top));
        let g = m.view((top, 0), (bottom, top));
        let s_bot = m.view((top, top), (bottom, bottom));

        let top_prod = &s_top * s_top.transpose();
        assert!((&top_prod - before.view((0, 0), (top, top))).norm() < 1e-10);

        let cross = &g * s_top.transpose();
        assert!((&cross - before.view((top, 0), (bottom, top))).norm() < 1e-10);

        let bottom_total = &g * g.transpose() + &s_bot * s_bot.transpose();
        assert!((&bottom_total - before.view((top, top), (bottom, bottom))).norm() < 1e-10);
    }

    #[test]
    fn test_solve_right_upper_round_trip() {
        let mut rng = SimpleRng::new(19);
        let n = 4;
        // Well-conditioned factor: random upper triangle, dominant diagonal.
        let mut s = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                s[(i, j)] = rng.randn() * 0.3;
            }
            s[(i, i)] = 2.0 + rng.rand();
        }
        let x_true = random_matrix(&mut rng, 3, n);
        let b = &x_true * &s;

        let mut x = b.clone();
        solve_right_upper_in_place(&s, (0, 0), n, &mut x, 3).unwrap();
        assert!((&x - &x_true).norm() < 1e-10);
    }

    #[test]
    fn test_solve_right_upper_singular() {
        let mut s = DMatrix::identity(3, 3);
        s[(1, 1)] = 0.0;
        let mut x = DMatrix::from_element(2, 3, 1.0);
        assert_eq!(solve_right_upper_in_place(&s, (0, 0), 3, &mut x, 2), Err(1));
    }

    #[test]
    fn test_solve_upper_round_trip() {
        let mut rng = SimpleRng::new(23);
        let n = 5;
        let mut s = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                s[(i, j)] = rng.randn() * 0.2;
            }
            s[(i, i)] = 1.5 + rng.rand();
        }
        let z_true = DVector::from_fn(n, |_, _| rng.randn());
        let b = &s * &z_true;

        let mut z = b.clone();
        solve_upper_in_place(&s, (0, 0), n, &mut z).unwrap();
        assert!((&z - &z_true).norm() < 1e-10);
    }

    #[test]
    fn test_invert_upper() {
        let mut rng = SimpleRng::new(29);
        let n = 4;
        let mut s = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                s[(i, j)] = rng.randn() * 0.2;
            }
            s[(i, i)] = 1.0 + rng.rand();
        }
        let inv = invert_upper(&s, (0, 0), n).unwrap();
        let eye = &s * &inv;
        assert!((&eye - DMatrix::<f64>::identity(n, n)).norm() < 1e-10);
    }

    #[test]
    fn test_log_det_from_root() {
        let s = DMatrix::<f64>::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 0.5]);
        let p = &s * s.transpose();
        let expected = p.determinant().ln();
        assert!((log_det_from_root(&s, (0, 0), 2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_windowed_reduction_leaves_surroundings() {
        // The routines must respect the logical window inside a larger buffer.
        let mut rng = SimpleRng::new(31);
        let mut buf = DMatrix::from_element(6, 8, 42.0);
        let rows = 3;
        let cols = 5;
        for r in 0..rows {
            for c in 0..cols {
                buf[(r, c)] = rng.randn();
            }
        }
        let before = self_product(&buf, rows, cols);
        let mut scratch = DVector::zeros(cols);
        reduce_to_upper(&mut buf, rows, cols, &mut scratch);
        let after = self_product(&buf, rows, cols);
        assert!((&before - &after).norm() < 1e-10);

        // Entries outside the logical window are untouched.
        for r in 0..6 {
            for c in 0..8 {
                if r >= rows || c >= cols {
                    assert_eq!(buf[(r, c)], 42.0);
                }
            }
        }
    }
}
