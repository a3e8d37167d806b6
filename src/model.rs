//! Instrumental-variables moment models.
//!
//! All models share the moment condition `g_i(θ) = z_i · (y_i − f(x_i, θ))`
//! and differ in how a single GMM step is solved:
//!
//! - [`IvGmm`]: linear `f`, finite-difference score, quasi-Newton optimizer.
//! - [`LinearIvGmm`]: linear `f`, analytic score, closed-form step.
//! - [`NonlinearIvGmm`]: arbitrary `f`, score from the numerical Jacobian of `f`.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::data::IvData;
use crate::error::{GmmError, Result};
use crate::estimation::{self, GmmResults};
use crate::linalg::{ensure_finite, solve_spd};
use crate::objective;
use crate::optimizer::{self, GmmStep};
use crate::options::{FitOptions, OptimArgs, OptimMethod, WeightArgs, WeightsMethod};
use crate::weighting;

/// Moment model estimated by [`estimation::fit`].
///
/// Only [`data`](GmmModel::data) and [`predict`](GmmModel::predict) are
/// required; everything else has a generic default that specializations may
/// override with analytic versions.
pub trait GmmModel {
    fn data(&self) -> &IvData;

    /// Fitted values `f(X, θ)`.
    fn predict(&self, params: &DVector<f64>) -> Result<DVector<f64>>;

    fn k_params(&self) -> usize {
        self.data().exog_dim()
    }

    fn param_names(&self) -> Vec<String> {
        self.data().exog_names().to_vec()
    }

    fn residuals(&self, params: &DVector<f64>) -> Result<DVector<f64>> {
        check_params(params, self.k_params())?;
        let fitted = self.predict(params)?;
        if fitted.len() != self.data().nobs() {
            return Err(GmmError::dimension_mismatch(
                "fitted values",
                self.data().nobs(),
                fitted.len(),
            ));
        }
        Ok(self.data().endog() - fitted)
    }

    /// Per-observation moments, `n × m`.
    fn momcond(&self, params: &DVector<f64>) -> Result<DMatrix<f64>> {
        let u = self.residuals(params)?;
        let mut moms = self.data().instrument().clone();
        for (mut row, ui) in moms.row_iter_mut().zip(u.iter()) {
            row *= *ui;
        }
        ensure_finite(moms.iter(), "moment conditions")?;
        Ok(moms)
    }

    fn gmm_objective(&self, params: &DVector<f64>, weights: &DMatrix<f64>) -> Result<f64> {
        objective::gmm_objective(self, params, weights)
    }

    /// Gradient of the objective.
    fn score(&self, params: &DVector<f64>, weights: &DMatrix<f64>) -> Result<DVector<f64>> {
        objective::numerical_score(self, params, weights)
    }

    /// Jacobian of the mean moments, `m × k`.
    fn gradient_momcond(&self, params: &DVector<f64>) -> Result<DMatrix<f64>> {
        objective::numerical_gradient_momcond(self, params)
    }

    /// Minimizes the objective under fixed weights.
    fn fit_gmm(
        &self,
        start: &DVector<f64>,
        weights: &DMatrix<f64>,
        method: OptimMethod,
        args: &OptimArgs,
    ) -> Result<GmmStep> {
        optimizer::minimize(self, start, weights, method, args)
    }

    /// `Z'Z / n`, the default initial inverse weighting matrix.
    fn start_inv_weights(&self) -> DMatrix<f64> {
        let z = self.data().instrument();
        z.transpose() * z / self.data().nobs() as f64
    }

    /// Moment covariance `S` used as the next inverse weighting matrix.
    fn calc_weightmatrix(
        &self,
        moms: &DMatrix<f64>,
        params: &DVector<f64>,
        method: WeightsMethod,
        wargs: &WeightArgs,
    ) -> Result<DMatrix<f64>> {
        match method {
            WeightsMethod::Cov => weighting::cov_moments(moms, wargs, self.k_params()),
            WeightsMethod::Hac => weighting::hac_moments(moms, wargs),
            WeightsMethod::Iid => {
                let u = self.residuals(params)?;
                weighting::iid_moments(self.data().instrument(), &u, wargs, self.k_params())
            }
        }
    }

    fn fit(&self, start: &DVector<f64>, options: &FitOptions) -> Result<GmmResults<'_, Self>>
    where
        Self: Sized,
    {
        estimation::fit(self, start, options)
    }
}

fn check_params(params: &DVector<f64>, k_params: usize) -> Result<()> {
    if params.len() != k_params {
        return Err(GmmError::dimension_mismatch(
            "parameter length",
            k_params,
            params.len(),
        ));
    }
    Ok(())
}

fn check_identified(data: &IvData, k_params: usize) -> Result<()> {
    if data.instrument_dim() < k_params {
        return Err(GmmError::UnderIdentified {
            moments: data.instrument_dim(),
            params: k_params,
        });
    }
    Ok(())
}

/// `−Z'X/n`, the Jacobian of the mean moments of a linear IV model.
fn linear_gradient_momcond(data: &IvData) -> DMatrix<f64> {
    -(data.instrument().transpose() * data.exog()) / data.nobs() as f64
}

/// IV model with linear prediction solved by the general-purpose optimizer.
#[derive(Clone, Debug)]
pub struct IvGmm {
    data: IvData,
}

impl IvGmm {
    /// Fails with [`GmmError::UnderIdentified`] when `Z` has fewer columns than `X`.
    pub fn new(data: IvData) -> Result<Self> {
        check_identified(&data, data.exog_dim())?;
        Ok(Self { data })
    }
}

impl GmmModel for IvGmm {
    fn data(&self) -> &IvData {
        &self.data
    }

    fn predict(&self, params: &DVector<f64>) -> Result<DVector<f64>> {
        check_params(params, self.k_params())?;
        Ok(self.data.exog() * params)
    }
}

/// Linear IV model whose GMM steps are weighted least-squares solves.
#[derive(Clone, Debug)]
pub struct LinearIvGmm {
    data: IvData,
}

impl LinearIvGmm {
    /// Fails with [`GmmError::UnderIdentified`] when `Z` has fewer columns than `X`.
    pub fn new(data: IvData) -> Result<Self> {
        check_identified(&data, data.exog_dim())?;
        Ok(Self { data })
    }
}

impl GmmModel for LinearIvGmm {
    fn data(&self) -> &IvData {
        &self.data
    }

    fn predict(&self, params: &DVector<f64>) -> Result<DVector<f64>> {
        check_params(params, self.k_params())?;
        Ok(self.data.exog() * params)
    }

    /// `−2 X'Z W Z'u / n²`.
    fn score(&self, params: &DVector<f64>, weights: &DMatrix<f64>) -> Result<DVector<f64>> {
        let u = self.residuals(params)?;
        let (x, z) = (self.data.exog(), self.data.instrument());
        let nobs = self.data.nobs() as f64;
        let ztu = z.transpose() * u;
        let score = -2.0 * (x.transpose() * z) * (weights * ztu) / (nobs * nobs);
        ensure_finite(score.iter(), "score")?;
        Ok(score)
    }

    fn gradient_momcond(&self, _params: &DVector<f64>) -> Result<DMatrix<f64>> {
        Ok(linear_gradient_momcond(&self.data))
    }

    /// `θ = (X'Z W Z'X)⁻¹ X'Z W Z'y`; the start value only fixes the dimension.
    fn fit_gmm(
        &self,
        start: &DVector<f64>,
        weights: &DMatrix<f64>,
        _method: OptimMethod,
        _args: &OptimArgs,
    ) -> Result<GmmStep> {
        check_params(start, self.k_params())?;
        let (y, x, z) = (self.data.endog(), self.data.exog(), self.data.instrument());
        if weights.nrows() != z.ncols() || weights.ncols() != z.ncols() {
            return Err(GmmError::dimension_mismatch(
                "weighting matrix",
                z.ncols(),
                weights.nrows(),
            ));
        }
        let z_t = z.transpose();
        let ztx = &z_t * x;
        let zty = z_t * y;
        let part0 = ztx.transpose() * weights;
        let params = solve_spd(&(&part0 * &ztx), &(part0 * zty), "X'ZWZ'X")?;
        Ok(GmmStep::closed_form(params))
    }
}

/// IV model with an arbitrary prediction function `f(θ, X)`.
pub struct NonlinearIvGmm<F> {
    data: IvData,
    func: F,
    k_params: usize,
}

impl<F> NonlinearIvGmm<F>
where
    F: Fn(&DVector<f64>, &DMatrix<f64>) -> DVector<f64>,
{
    /// `k_params` is the length of the parameter vector accepted by `func`.
    pub fn new(data: IvData, func: F, k_params: usize) -> Result<Self> {
        check_identified(&data, k_params)?;
        Ok(Self {
            data,
            func,
            k_params,
        })
    }

    /// Numerical Jacobian of the prediction function, `n × k`.
    pub fn jac_predict(&self, params: &DVector<f64>) -> Result<DMatrix<f64>> {
        objective::numerical_jacobian(params, |p| self.predict(p))
    }
}

impl<F> fmt::Debug for NonlinearIvGmm<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearIvGmm")
            .field("data", &self.data)
            .field("k_params", &self.k_params)
            .finish_non_exhaustive()
    }
}

impl<F> GmmModel for NonlinearIvGmm<F>
where
    F: Fn(&DVector<f64>, &DMatrix<f64>) -> DVector<f64>,
{
    fn data(&self) -> &IvData {
        &self.data
    }

    fn k_params(&self) -> usize {
        self.k_params
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.k_params).map(|j| format!("theta{j}")).collect()
    }

    fn predict(&self, params: &DVector<f64>) -> Result<DVector<f64>> {
        check_params(params, self.k_params)?;
        let fitted = (self.func)(params, self.data.exog());
        if fitted.len() != self.data.nobs() {
            return Err(GmmError::dimension_mismatch(
                "fitted values",
                self.data.nobs(),
                fitted.len(),
            ));
        }
        Ok(fitted)
    }

    /// `−2 J'Z W Z'u / n²` with `J` the Jacobian of `f`.
    fn score(&self, params: &DVector<f64>, weights: &DMatrix<f64>) -> Result<DVector<f64>> {
        let jac = self.jac_predict(params)?;
        let u = self.residuals(params)?;
        let z = self.data.instrument();
        let nobs = self.data.nobs() as f64;
        let ztu = z.transpose() * u;
        let score = -2.0 * (jac.transpose() * z) * (weights * ztu) / (nobs * nobs);
        ensure_finite(score.iter(), "score")?;
        Ok(score)
    }

    fn gradient_momcond(&self, params: &DVector<f64>) -> Result<DMatrix<f64>> {
        let jac = self.jac_predict(params)?;
        Ok(-(self.data.instrument().transpose() * jac) / self.data.nobs() as f64)
    }
}
