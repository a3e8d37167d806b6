//! Dense linear-algebra helpers shared by the estimators.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};

/// Returns `(A + A') / 2`.
pub fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// Inverts a symmetric positive-definite matrix through its Cholesky factor.
///
/// Singular or indefinite input yields [`GmmError::SingularMatrix`] rather than
/// a matrix full of NaNs.
pub fn inverse_spd(matrix: &DMatrix<f64>, context: &'static str) -> Result<DMatrix<f64>> {
    if matrix.nrows() != matrix.ncols() {
        return Err(GmmError::dimension_mismatch(
            context,
            matrix.nrows(),
            matrix.ncols(),
        ));
    }
    ensure_finite(matrix.iter(), context)?;
    let cholesky = Cholesky::new(symmetrize(matrix)).ok_or_else(|| GmmError::singular(context))?;
    let inverse = cholesky.inverse();
    ensure_finite(inverse.iter(), context)?;
    Ok(symmetrize(&inverse))
}

/// Solves `A x = b` for symmetric positive-definite `A`.
pub fn solve_spd(
    matrix: &DMatrix<f64>,
    rhs: &DVector<f64>,
    context: &'static str,
) -> Result<DVector<f64>> {
    ensure_finite(matrix.iter(), context)?;
    ensure_finite(rhs.iter(), context)?;
    let cholesky = Cholesky::new(symmetrize(matrix)).ok_or_else(|| GmmError::singular(context))?;
    Ok(cholesky.solve(rhs))
}

/// Inverts a general square matrix by LU decomposition.
pub fn inverse(matrix: &DMatrix<f64>, context: &'static str) -> Result<DMatrix<f64>> {
    ensure_finite(matrix.iter(), context)?;
    matrix
        .clone()
        .try_inverse()
        .ok_or_else(|| GmmError::singular(context))
}

/// Tolerance used for rank decisions: `max(s) * max(rows, cols) * eps`.
fn rank_tolerance(matrix: &DMatrix<f64>, singular_values: &DVector<f64>) -> f64 {
    largest(singular_values) * matrix.nrows().max(matrix.ncols()) as f64 * f64::EPSILON
}

fn largest(singular_values: &DVector<f64>) -> f64 {
    singular_values.iter().cloned().fold(0.0_f64, f64::max)
}

/// Relative cutoff for matrices assembled from differences of computed
/// quantities, whose exact zeros come out as rounding noise: `sqrt(eps)`.
pub fn noise_rtol() -> f64 {
    f64::EPSILON.sqrt()
}

/// Moore-Penrose pseudo-inverse.
pub fn pinv(matrix: &DMatrix<f64>, context: &'static str) -> Result<DMatrix<f64>> {
    ensure_finite(matrix.iter(), context)?;
    let singular_values = matrix.singular_values();
    let tolerance = rank_tolerance(matrix, &singular_values);
    pseudo_inverse(matrix, tolerance, context)
}

/// Pseudo-inverse that discards singular values below `rtol * max(s)`.
pub fn pinv_rtol(matrix: &DMatrix<f64>, rtol: f64, context: &'static str) -> Result<DMatrix<f64>> {
    ensure_finite(matrix.iter(), context)?;
    let tolerance = largest(&matrix.singular_values()) * rtol;
    pseudo_inverse(matrix, tolerance, context)
}

fn pseudo_inverse(
    matrix: &DMatrix<f64>,
    tolerance: f64,
    context: &'static str,
) -> Result<DMatrix<f64>> {
    matrix
        .clone()
        .pseudo_inverse(tolerance)
        .map_err(|_| GmmError::singular(context))
}

/// Numerical rank from the singular value decomposition.
pub fn matrix_rank(matrix: &DMatrix<f64>) -> usize {
    let singular_values = matrix.singular_values();
    let tolerance = rank_tolerance(matrix, &singular_values);
    singular_values.iter().filter(|s| **s > tolerance).count()
}

/// Number of singular values above `tolerance`.
pub fn matrix_rank_tol(matrix: &DMatrix<f64>, tolerance: f64) -> usize {
    matrix
        .singular_values()
        .iter()
        .filter(|s| **s > tolerance)
        .count()
}

/// Fails with [`GmmError::NumericalError`] if any value is NaN or infinite.
pub fn ensure_finite<'a>(
    values: impl IntoIterator<Item = &'a f64>,
    context: &'static str,
) -> Result<()> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(GmmError::numerical(context))
    }
}

/// Largest absolute elementwise difference between two vectors.
pub fn max_abs_diff(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn inverse_spd_recovers_identity() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let inv = inverse_spd(&a, "test").unwrap();
        assert_relative_eq!(&a * inv, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn inverse_spd_rejects_singular_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(matches!(
            inverse_spd(&a, "test"),
            Err(GmmError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn nan_input_is_a_numerical_error() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, f64::NAN, f64::NAN, 1.0]);
        assert!(matches!(
            inverse_spd(&a, "test"),
            Err(GmmError::NumericalError { .. })
        ));
    }

    #[test]
    fn rank_and_pinv_of_rank_one_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(matrix_rank(&a), 1);
        let p = pinv(&a, "test").unwrap();
        assert_relative_eq!(&a * &p * &a, a, epsilon = 1e-10);
    }

    #[test]
    fn noise_tolerance_ignores_rounding_residue() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1e-13]);
        assert_eq!(matrix_rank(&a), 2);
        assert_eq!(matrix_rank_tol(&a, 2.0 * noise_rtol()), 1);
        let p = pinv_rtol(&a, noise_rtol(), "test").unwrap();
        assert_relative_eq!(
            p,
            DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.0]),
            epsilon = 1e-12
        );
    }
}
