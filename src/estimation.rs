//! One-step, two-step and iterated GMM estimation.

use std::fmt;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};
use crate::inference::{self, ContrastResults, Reference, WaldResults};
use crate::linalg::{inverse_spd, max_abs_diff, symmetrize};
use crate::model::GmmModel;
use crate::optimizer::{GmmStep, OptimizerSummary};
use crate::options::FitOptions;
use crate::summary::Summary;
use crate::weighting::weights_from_inverse;

/// Estimates `model` starting from `start`.
///
/// With `options.maxiter == 0` the objective is minimized once under the
/// initial weights. Otherwise `maxiter` minimizations are run and the inverse
/// weighting matrix is re-estimated from the moments after each of them, so
/// `maxiter = 2` is two-step GMM and larger values iterate towards the
/// fixed point.
pub fn fit<'a, M: GmmModel + ?Sized>(
    model: &'a M,
    start: &DVector<f64>,
    options: &FitOptions,
) -> Result<GmmResults<'a, M>> {
    let k_params = model.k_params();
    if start.len() != k_params {
        return Err(GmmError::dimension_mismatch(
            "start params",
            k_params,
            start.len(),
        ));
    }
    let k_moms = model.data().instrument_dim();
    let inv_weights = match &options.inv_weights {
        Some(inv) if inv.nrows() != k_moms || inv.ncols() != k_moms => {
            return Err(GmmError::dimension_mismatch(
                "inv_weights",
                k_moms,
                inv.nrows(),
            ));
        }
        Some(inv) => inv.clone(),
        None => model.start_inv_weights(),
    };

    let mut weights_converged = false;
    let (step, weights, iterations) = if options.maxiter == 0 {
        let weights = weights_from_inverse(&inv_weights)?;
        let step = run_step(model, start, &weights, options)?;
        debug!("one-step gmm: params {:?}", step.params.as_slice());
        (step, weights, 0)
    } else {
        let mut start = start.clone();
        let mut inv_new = inv_weights;
        let mut last = None;
        let mut iterations = 0;
        for it in 0..options.maxiter {
            let weights = weights_from_inverse(&inv_new)?;
            let step = run_step(model, &start, &weights, options)?;
            let moms = model.momcond(&step.params)?;
            inv_new = model.calc_weightmatrix(
                &moms,
                &step.params,
                options.weights_method,
                &options.wargs,
            )?;
            iterations = it + 1;

            let change = max_abs_diff(&step.params, &start);
            debug!("gmm iteration {iterations}: max parameter change {change:.3e}");

            let params = step.params.clone();
            last = Some((step, weights));
            if let Some(epsilon) = options.epsilon_iter {
                if it > 2 && change < epsilon {
                    weights_converged = true;
                    break;
                }
            }
            start = params;
        }
        let (step, weights) = last.ok_or_else(|| GmmError::missing_component("gmm step"))?;
        (step, weights, iterations)
    };

    let GmmStep { params, optimizer } = step;
    let cov = compute_cov(
        model,
        &params,
        &weights,
        options,
        options.has_optimal_weights,
        false,
    )?;
    let bse = cov.diagonal().map(f64::sqrt);

    Ok(GmmResults {
        model,
        params,
        bse,
        cov,
        weights,
        iterations,
        weights_converged,
        optimizer,
        options: options.clone(),
    })
}

fn run_step<M: GmmModel + ?Sized>(
    model: &M,
    start: &DVector<f64>,
    weights: &DMatrix<f64>,
    options: &FitOptions,
) -> Result<GmmStep> {
    model.fit_gmm(start, weights, options.optim_method, &options.optim_args)
}

/// Parameter covariance on the parameter scale (already divided by `n`).
fn compute_cov<M: GmmModel + ?Sized>(
    model: &M,
    params: &DVector<f64>,
    weights: &DMatrix<f64>,
    options: &FitOptions,
    has_optimal_weights: bool,
    use_weights: bool,
) -> Result<DMatrix<f64>> {
    let nobs = model.data().nobs() as f64;
    let g = model.gradient_momcond(params)?;
    let omega = if use_weights {
        inverse_spd(weights, "weighting matrix")?
    } else {
        let moms = model.momcond(params)?;
        model.calc_weightmatrix(&moms, params, options.weights_method, &options.wargs)?
    };

    let cov = if has_optimal_weights {
        let omega_inv = inverse_spd(&omega, "moment covariance")?;
        inverse_spd(&(g.transpose() * omega_inv * &g), "G'S⁻¹G")?
    } else {
        let gw = g.transpose() * weights;
        let gwg_inv = inverse_spd(&(&gw * &g), "G'WG")?;
        &gwg_inv * (&gw * &omega * gw.transpose()) * &gwg_inv
    };
    let cov = symmetrize(&cov) / nobs;

    if cov.diagonal().iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(GmmError::NotPositiveDefinite {
            context: "parameter covariance",
        });
    }
    Ok(cov)
}

/// Overrides for [`GmmResults::cov_params_with`].
#[derive(Clone, Debug, Default)]
pub struct CovOptions {
    /// Defaults to the value used in the fit.
    pub has_optimal_weights: Option<bool>,
    /// Use the inverse of the weighting matrix as the moment covariance
    /// instead of re-estimating it at the final parameters.
    pub use_weights: bool,
    /// Weighting matrix for the sandwich; defaults to the one of the last step.
    pub weights: Option<DMatrix<f64>>,
}

/// Snapshot of a GMM fit.
pub struct GmmResults<'a, M: ?Sized> {
    model: &'a M,
    /// Estimated parameters.
    pub params: DVector<f64>,
    /// Standard errors from the covariance selected at fit time.
    pub bse: DVector<f64>,
    cov: DMatrix<f64>,
    /// Weighting matrix used in the last minimization.
    pub weights: DMatrix<f64>,
    /// Number of minimizations with weight updates (`0` for one-step GMM).
    pub iterations: usize,
    /// Whether iterated GMM stopped early on `epsilon_iter`.
    pub weights_converged: bool,
    /// Optimizer diagnostics of the last step; `None` for closed-form steps.
    pub optimizer: Option<OptimizerSummary>,
    /// Options the fit was run with.
    pub options: FitOptions,
}

impl<'a, M: GmmModel + ?Sized> GmmResults<'a, M> {
    /// The model this result was fitted from.
    pub fn model(&self) -> &'a M {
        self.model
    }

    pub fn nobs(&self) -> usize {
        self.model.data().nobs()
    }

    /// Covariance selected at fit time.
    pub fn cov_params(&self) -> &DMatrix<f64> {
        &self.cov
    }

    /// Recomputes the covariance with different assumptions.
    pub fn cov_params_with(&self, cov_options: &CovOptions) -> Result<DMatrix<f64>> {
        let weights = cov_options.weights.as_ref().unwrap_or(&self.weights);
        compute_cov(
            self.model,
            &self.params,
            weights,
            &self.options,
            cov_options
                .has_optimal_weights
                .unwrap_or(self.options.has_optimal_weights),
            cov_options.use_weights,
        )
    }

    /// z-statistics.
    pub fn tvalues(&self) -> DVector<f64> {
        self.params.component_div(&self.bse)
    }

    /// Two-sided p-values against the standard normal.
    pub fn pvalues(&self) -> DVector<f64> {
        self.tvalues()
            .map(|t| Reference::Normal.two_sided_pvalue(t))
    }

    /// `(lower, upper)` bounds of `1 - alpha` confidence intervals.
    pub fn conf_int(&self, alpha: f64) -> (DVector<f64>, DVector<f64>) {
        let critical = Reference::Normal.critical_value(alpha);
        let half = &self.bse * critical;
        (&self.params - &half, &self.params + half)
    }

    /// Objective at the estimate under the weights of the last step.
    pub fn q(&self) -> Result<f64> {
        self.model.gmm_objective(&self.params, &self.weights)
    }

    /// Hansen's J statistic, `n · q`.
    pub fn jval(&self) -> Result<f64> {
        Ok(self.q()? * self.nobs() as f64)
    }

    /// Over-identification test; `df = m − k`. The p-value is NaN when the
    /// model is exactly identified.
    pub fn jtest(&self) -> Result<WaldResults> {
        let df = self.model.data().instrument_dim() - self.model.k_params();
        let statistic = self.jval()?;
        let pvalue = if df == 0 {
            f64::NAN
        } else {
            inference::chi2_sf(statistic, df as f64)
        };
        Ok(WaldResults {
            statistic,
            pvalue,
            df,
        })
    }

    /// Individual z-tests of `R θ = 0`.
    pub fn t_test(&self, restriction: &DMatrix<f64>) -> Result<ContrastResults> {
        inference::t_test(
            &self.params,
            &self.cov,
            restriction,
            None,
            Reference::Normal,
        )
    }

    /// Joint chi-squared test of `R θ = 0`.
    pub fn wald_test(&self, restriction: &DMatrix<f64>) -> Result<WaldResults> {
        inference::wald_test(&self.params, &self.cov, restriction, None)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::new("GMM Results")
            .info("No. Observations:", self.nobs())
            .info("No. Moments:", self.model.data().instrument_dim())
            .info("No. Parameters:", self.model.k_params())
            .info("Iterations:", self.iterations)
            .info("Weights method:", format!("{:?}", self.options.weights_method));
        if let Ok(j) = self.jtest() {
            summary = summary
                .info("Hansen J:", format!("{:.4}", j.statistic))
                .info("Prob (J):", format!("{:.4}", j.pvalue));
        }
        summary.coefficients(
            &self.model.param_names(),
            &self.params,
            &self.bse,
            Reference::Normal,
            0.05,
        )
    }
}

impl<M: ?Sized> fmt::Debug for GmmResults<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmmResults")
            .field("params", &self.params)
            .field("bse", &self.bse)
            .field("iterations", &self.iterations)
            .field("weights_converged", &self.weights_converged)
            .field("optimizer", &self.optimizer)
            .finish_non_exhaustive()
    }
}
