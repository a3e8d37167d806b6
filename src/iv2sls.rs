//! Two-stage least squares with regression-style inference.
//!
//! The first stage projects the regressors on the instruments,
//! `X̂ = Z (Z'Z)⁻¹ Z'X`, and the second stage regresses `y` on `X̂`. Residuals
//! are always taken with respect to the original regressors `X`.

use std::fmt;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::data::IvData;
use crate::error::{GmmError, Result};
use crate::inference::{self, ContrastResults, FTestResults, Reference};
use crate::linalg::{
    ensure_finite, inverse, inverse_spd, matrix_rank_tol, noise_rtol, pinv, pinv_rtol, solve_spd,
};
use crate::ols::Ols;
use crate::summary::Summary;

/// Two-stage least squares estimator.
#[derive(Clone, Debug)]
pub struct Iv2Sls {
    data: IvData,
}

impl Iv2Sls {
    /// Checks that there are at least as many instruments as regressors and
    /// more observations than regressors.
    pub fn new(data: IvData) -> Result<Self> {
        if data.instrument_dim() < data.exog_dim() {
            return Err(GmmError::UnderIdentified {
                moments: data.instrument_dim(),
                params: data.exog_dim(),
            });
        }
        if data.nobs() <= data.exog_dim() {
            return Err(GmmError::invalid_option(
                "nobs",
                format!(
                    "{} observations leave no residual degrees of freedom for {} regressors",
                    data.nobs(),
                    data.exog_dim()
                ),
            ));
        }
        Ok(Self { data })
    }

    /// Data the estimator was built from.
    pub fn data(&self) -> &IvData {
        &self.data
    }

    /// Runs both stages and computes the regression statistics.
    ///
    /// Fails with [`GmmError::NumericalError`] on non-finite data and
    /// [`GmmError::SingularMatrix`] when `Z'Z` or `X̂'X̂` is singular.
    pub fn fit(&self) -> Result<IvRegressionResults<'_>> {
        let (y, x, z) = (self.data.endog(), self.data.exog(), self.data.instrument());
        ensure_finite(y.iter().chain(x.iter()).chain(z.iter()), "2SLS data")?;

        let ztz_inv = inverse_spd(&(z.transpose() * z), "Z'Z")?;
        let exog_hat_params = ztz_inv * (z.transpose() * x);
        let xhat = z * &exog_hat_params;

        let xhat_t = xhat.transpose();
        let xhatprod = &xhat_t * &xhat;
        let params = solve_spd(&xhatprod, &(&xhat_t * y), "X̂'X̂")?;
        let ftx_inv = inverse(&(&xhat_t * x), "X̂'X")?;
        let normalized_cov_params = ftx_inv.transpose() * &xhatprod * ftx_inv;

        let resid = y - x * &params;
        let nobs = self.data.nobs();
        let k_params = self.data.exog_dim();
        let k_constant = self.data.k_constant();

        let ssr = resid.dot(&resid);
        let uncentered_tss = y.dot(y);
        let y_centered = y.add_scalar(-y.mean());
        let centered_tss = y_centered.dot(&y_centered);
        let df_resid = (nobs - k_params) as f64;
        let df_model = (k_params - k_constant) as f64;
        let scale = ssr / df_resid;

        let (ess, rsquared) = if k_constant > 0 {
            (centered_tss - ssr, 1.0 - ssr / centered_tss)
        } else {
            (uncentered_tss - ssr, 1.0 - ssr / uncentered_tss)
        };
        let rsquared_adj = 1.0 - (nobs - k_constant) as f64 / df_resid * (1.0 - rsquared);

        let cov = &normalized_cov_params * scale;
        let bse = cov.diagonal().map(f64::sqrt);
        debug!("2SLS fitted {k_params} parameters on {nobs} observations, ssr {ssr:.6e}");

        let mut results = IvRegressionResults {
            model: self,
            params,
            bse,
            exog_hat_params,
            normalized_cov_params,
            xhatprod,
            resid,
            nobs,
            df_model,
            df_resid,
            scale,
            ssr,
            uncentered_tss,
            centered_tss,
            ess,
            rsquared,
            rsquared_adj,
            fvalue: f64::NAN,
            f_pvalue: f64::NAN,
        };

        if let Some(const_idx) = self.data.const_idx() {
            if k_params > 1 {
                let restriction = inference::exclusion_restriction(k_params, Some(const_idx));
                let f = results.f_test(&restriction, None)?;
                results.fvalue = f.fvalue;
                results.f_pvalue = f.pvalue;
            }
        }
        Ok(results)
    }
}

/// Output of the Durbin-Wu-Hausman comparison of 2SLS against OLS.
#[derive(Clone, Copy, Debug)]
pub struct HausmanResults {
    /// `(θ̂_2SLS − θ̂_OLS)' pinv(V) (θ̂_2SLS − θ̂_OLS) / σ̂²`.
    pub statistic: f64,
    /// Upper tail of χ² with `dof` degrees of freedom; NaN when `dof` is zero.
    pub pvalue: f64,
    /// Degrees of freedom used for the p-value.
    pub dof: usize,
}

/// Snapshot of a 2SLS fit.
pub struct IvRegressionResults<'a> {
    model: &'a Iv2Sls,
    /// Second-stage coefficients.
    pub params: DVector<f64>,
    /// Standard errors, `sqrt(diag(cov_params))`.
    pub bse: DVector<f64>,
    /// First-stage coefficients `(Z'Z)⁻¹ Z'X`, `m × k`.
    pub exog_hat_params: DMatrix<f64>,
    /// Covariance of `params` before scaling by [`scale`](Self::scale).
    pub normalized_cov_params: DMatrix<f64>,
    xhatprod: DMatrix<f64>,
    /// `y − Xθ̂`, computed with the original regressors.
    pub resid: DVector<f64>,
    pub nobs: usize,
    /// `k` minus one if a constant is present.
    pub df_model: f64,
    /// `n − k`.
    pub df_resid: f64,
    /// `ssr / df_resid`.
    pub scale: f64,
    /// Sum of squared residuals.
    pub ssr: f64,
    pub uncentered_tss: f64,
    pub centered_tss: f64,
    /// Explained sum of squares, against the centered total when a constant is present.
    pub ess: f64,
    pub rsquared: f64,
    pub rsquared_adj: f64,
    /// F statistic for all non-constant coefficients being zero; NaN without a constant.
    pub fvalue: f64,
    /// Upper tail of [`fvalue`](Self::fvalue) under `F(df_model, df_resid)`.
    pub f_pvalue: f64,
}

impl<'a> IvRegressionResults<'a> {
    /// Estimator that produced these results.
    pub fn model(&self) -> &'a Iv2Sls {
        self.model
    }

    /// `scale · normalized_cov_params`.
    pub fn cov_params(&self) -> DMatrix<f64> {
        &self.normalized_cov_params * self.scale
    }

    /// `Xθ̂`.
    pub fn fittedvalues(&self) -> DVector<f64> {
        self.model.data.exog() * &self.params
    }

    pub fn mse_resid(&self) -> f64 {
        self.ssr / self.df_resid
    }

    pub fn mse_model(&self) -> f64 {
        self.ess / self.df_model
    }

    pub fn mse_total(&self) -> f64 {
        let tss = if self.model.data.k_constant() > 0 {
            self.centered_tss
        } else {
            self.uncentered_tss
        };
        tss / (self.df_resid + self.df_model)
    }

    fn reference(&self) -> Reference {
        Reference::StudentT { df: self.df_resid }
    }

    /// `params / bse`.
    pub fn tvalues(&self) -> DVector<f64> {
        self.params.component_div(&self.bse)
    }

    /// Two-sided p-values from Student t with `df_resid` degrees of freedom.
    pub fn pvalues(&self) -> DVector<f64> {
        let reference = self.reference();
        self.tvalues().map(|t| reference.two_sided_pvalue(t))
    }

    /// Lower and upper `1 − alpha` bounds from Student t critical values.
    pub fn conf_int(&self, alpha: f64) -> (DVector<f64>, DVector<f64>) {
        let half = &self.bse * self.reference().critical_value(alpha);
        (&self.params - &half, &self.params + half)
    }

    /// One t statistic per row of `restriction`, testing `Rθ = 0`.
    pub fn t_test(&self, restriction: &DMatrix<f64>) -> Result<ContrastResults> {
        inference::t_test(
            &self.params,
            &self.cov_params(),
            restriction,
            None,
            self.reference(),
        )
    }

    /// Joint test of `R θ = q` (`q = 0` when omitted).
    pub fn f_test(
        &self,
        restriction: &DMatrix<f64>,
        q: Option<&DVector<f64>>,
    ) -> Result<FTestResults> {
        inference::f_test(
            &self.params,
            &self.cov_params(),
            restriction,
            q,
            self.df_resid,
        )
    }

    /// Number of regressors outside the column space of the instruments.
    ///
    /// Each first-stage residual column `x_j − x̂_j` is scaled by `‖x_j‖`;
    /// included exogenous regressors leave only rounding residue there.
    pub fn k_instrumented(&self) -> usize {
        let x = self.model.data.exog();
        let mut resid = x - self.model.data.instrument() * &self.exog_hat_params;
        for (j, mut column) in resid.column_iter_mut().enumerate() {
            let norm = x.column(j).norm();
            if norm > 0.0 {
                column /= norm;
            }
        }
        matrix_rank_tol(&resid, noise_rtol())
    }

    /// Hausman specification test of 2SLS against OLS.
    ///
    /// `dof` of `None` or `Some(0)` falls back to [`Self::k_instrumented`].
    /// The covariance difference `pinv(X̂'X̂) − (X'X)⁻¹` vanishes along the
    /// exogenous directions, so its pseudo-inverse drops singular values
    /// below `sqrt(eps)` relative to the largest.
    pub fn spec_hausman(&self, dof: Option<usize>) -> Result<HausmanResults> {
        let data = &self.model.data;
        let ols = Ols::fit(data.endog(), data.exog())?;
        let se2 = ols.ssr / self.nobs as f64;
        let diff = &self.params - &ols.params;
        let cov_diff = pinv(&self.xhatprod, "X̂'X̂")? - &ols.normalized_cov_params;
        let dof = match dof {
            Some(dof) if dof > 0 => dof,
            _ => self.k_instrumented(),
        };
        let cov_diff_inv = pinv_rtol(&cov_diff, noise_rtol(), "covariance difference")?;
        let statistic = diff.dot(&(cov_diff_inv * &diff)) / se2;
        let pvalue = if dof == 0 {
            f64::NAN
        } else {
            inference::chi2_sf(statistic, dof as f64)
        };
        debug!("Hausman statistic {statistic:.4} on {dof} degrees of freedom");
        Ok(HausmanResults {
            statistic,
            pvalue,
            dof,
        })
    }

    /// Coefficient table with the fit statistics in the header.
    pub fn summary(&self) -> Summary {
        Summary::new("IV2SLS Regression Results")
            .info("No. Observations:", self.nobs)
            .info("Df Residuals:", self.df_resid)
            .info("Df Model:", self.df_model)
            .info("R-squared:", format!("{:.4}", self.rsquared))
            .info("Adj. R-squared:", format!("{:.4}", self.rsquared_adj))
            .info("F-statistic:", format!("{:.4}", self.fvalue))
            .info("Prob (F-statistic):", format!("{:.4e}", self.f_pvalue))
            .coefficients(
                self.model.data.exog_names(),
                &self.params,
                &self.bse,
                self.reference(),
                0.05,
            )
    }
}

impl fmt::Debug for IvRegressionResults<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IvRegressionResults")
            .field("params", &self.params)
            .field("bse", &self.bse)
            .field("rsquared", &self.rsquared)
            .field("fvalue", &self.fvalue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::IvDataBuilder;

    #[test]
    fn exog_as_instruments_reduces_to_ols() {
        let y = DVector::from_vec(vec![1.1, 1.9, 3.2, 3.9, 5.1]);
        let x = DMatrix::from_row_slice(5, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0]);
        let data = IvDataBuilder::new(y.clone()).exog(x.clone()).build().unwrap();
        let model = Iv2Sls::new(data).unwrap();
        let res = model.fit().unwrap();
        let ols = Ols::fit(&y, &x).unwrap();

        assert_relative_eq!(res.params, ols.params, max_relative = 1e-9);
        assert_relative_eq!(res.bse, ols.bse(), max_relative = 1e-9);
        assert_relative_eq!(res.ess + res.ssr, res.centered_tss, max_relative = 1e-12);
        // Single slope: F equals the squared t statistic.
        assert_relative_eq!(res.fvalue, res.tvalues()[1].powi(2), max_relative = 1e-10);
    }

    #[test]
    fn no_constant_leaves_f_undefined() {
        let y = DVector::from_vec(vec![1.0, 2.1, 2.9, 4.2]);
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let data = IvDataBuilder::new(y).exog(x).build().unwrap();
        let model = Iv2Sls::new(data).unwrap();
        let res = model.fit().unwrap();
        assert!(res.fvalue.is_nan());
        assert_eq!(res.df_model, 1.0);
        assert_relative_eq!(res.ess + res.ssr, res.uncentered_tss, max_relative = 1e-12);
    }

    #[test]
    fn saturated_sample_is_rejected() {
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let data = IvDataBuilder::new(y).exog(x).build().unwrap();
        assert!(matches!(Iv2Sls::new(data), Err(GmmError::InvalidOption { .. })));
    }
}
