//! Ordinary least squares, used for start values, the Hausman contrast and
//! equivalence checks against the IV estimators.

use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};
use crate::linalg::{ensure_finite, inverse_spd};

/// Least-squares fit of `y` on `X`.
#[derive(Clone, Debug)]
pub struct OlsResults {
    pub params: DVector<f64>,
    /// `y − Xθ̂`.
    pub resid: DVector<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    pub nobs: usize,
    /// `n − k`.
    pub df_resid: f64,
    /// `(X'X)⁻¹`.
    pub normalized_cov_params: DMatrix<f64>,
    exog: DMatrix<f64>,
}

/// Namespace for the OLS fit.
pub struct Ols;

impl Ols {
    /// Solves the normal equations by Cholesky; rejects NaN input and a
    /// rank-deficient `X`.
    pub fn fit(endog: &DVector<f64>, exog: &DMatrix<f64>) -> Result<OlsResults> {
        let nobs = endog.len();
        if exog.nrows() != nobs {
            return Err(GmmError::dimension_mismatch("exog rows", nobs, exog.nrows()));
        }
        if exog.ncols() > nobs {
            return Err(GmmError::UnderIdentified {
                moments: nobs,
                params: exog.ncols(),
            });
        }
        ensure_finite(endog.iter().chain(exog.iter()), "OLS data")?;

        let xtx_inv = inverse_spd(&(exog.transpose() * exog), "X'X")?;
        let params = &xtx_inv * (exog.transpose() * endog);
        let resid = endog - exog * &params;
        let ssr = resid.dot(&resid);

        Ok(OlsResults {
            params,
            resid,
            ssr,
            nobs,
            df_resid: (nobs - exog.ncols()) as f64,
            normalized_cov_params: xtx_inv,
            exog: exog.clone(),
        })
    }
}

impl OlsResults {
    /// `ssr / df_resid`.
    pub fn scale(&self) -> f64 {
        self.ssr / self.df_resid
    }

    /// Classical covariance `σ² (X'X)⁻¹`.
    pub fn cov_params(&self) -> DMatrix<f64> {
        &self.normalized_cov_params * self.scale()
    }

    pub fn bse(&self) -> DVector<f64> {
        self.cov_params().diagonal().map(f64::sqrt)
    }

    /// White's heteroskedasticity-robust covariance without small-sample correction.
    pub fn hc0_cov(&self) -> DMatrix<f64> {
        let mut weighted = self.exog.clone();
        for (mut row, u) in weighted.row_iter_mut().zip(self.resid.iter()) {
            row *= u * u;
        }
        let meat = self.exog.transpose() * weighted;
        &self.normalized_cov_params * meat * &self.normalized_cov_params
    }

    pub fn hc0_se(&self) -> DVector<f64> {
        self.hc0_cov().diagonal().map(f64::sqrt)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn fits_a_line() {
        let y = DVector::from_vec(vec![1.1, 1.9, 3.2, 3.9, 5.1]);
        let x = DMatrix::from_row_slice(5, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0]);
        let res = Ols::fit(&y, &x).unwrap();
        assert_relative_eq!(res.params[0], 0.04, epsilon = 1e-12);
        assert_relative_eq!(res.params[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(res.resid.sum(), 0.0, epsilon = 1e-12);
        assert_eq!(res.df_resid, 3.0);
        // ssr = 0.072 on 3 degrees of freedom, Sxx = 10.
        assert_relative_eq!(res.ssr, 0.072, epsilon = 1e-12);
        assert_relative_eq!(res.bse()[1], (0.024_f64 / 10.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn hc0_matches_hand_computation_for_a_mean() {
        let y = DVector::from_vec(vec![1.0, 2.0, 6.0]);
        let x = DMatrix::from_element(3, 1, 1.0);
        let res = Ols::fit(&y, &x).unwrap();
        // Mean 3, residuals -2, -1, 3: sum of squares 14 over n² = 9.
        assert_relative_eq!(res.hc0_se()[0], (14.0_f64 / 9.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn nan_is_rejected() {
        let y = DVector::from_vec(vec![1.0, f64::NAN, 2.0]);
        let x = DMatrix::from_element(3, 1, 1.0);
        assert!(matches!(Ols::fit(&y, &x), Err(GmmError::NumericalError { .. })));
    }
}
