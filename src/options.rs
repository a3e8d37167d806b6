//! Configuration structures for the GMM driver, weighting updates and the numerical optimizer.
//!
//! All structs implement `Default` and `serde::Deserialize` with every field
//! optional, so a partial JSON document such as
//! `{"maxiter": 2, "wargs": {"centered": false}}` is a complete configuration.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Estimator used to build the moment covariance `S` between iterations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsMethod {
    /// Outer product of the (optionally demeaned) moments.
    #[default]
    Cov,
    /// Homoskedastic form `Z'Z/n * u'u/d`; only meaningful for IV moments.
    Iid,
    /// Newey-West with Bartlett kernel; requires `wargs.maxlag`.
    Hac,
}

/// Degrees-of-freedom correction applied to the moment covariance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ddof {
    /// Subtract a fixed count from `n`.
    Fixed(usize),
    /// Subtract the number of parameters.
    Named(DdofKeyword),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdofKeyword {
    KParams,
}

impl Ddof {
    pub const K_PARAMS: Ddof = Ddof::Named(DdofKeyword::KParams);

    /// Number of degrees of freedom to subtract from `n`.
    pub fn resolve(self, k_params: usize) -> usize {
        match self {
            Ddof::Fixed(count) => count,
            Ddof::Named(DdofKeyword::KParams) => k_params,
        }
    }
}

/// Options forwarded to the weighting-matrix builder on every iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightArgs {
    /// Demean moments (or residuals for `Iid`) before forming `S`.
    pub centered: bool,
    /// Divisor correction; `None` divides by `n`.
    pub ddof: Option<Ddof>,
    /// Bandwidth for `Hac`.
    pub maxlag: Option<usize>,
}

impl Default for WeightArgs {
    fn default() -> Self {
        Self {
            centered: true,
            ddof: None,
            maxlag: None,
        }
    }
}

impl WeightArgs {
    pub fn uncentered() -> Self {
        Self {
            centered: false,
            ..Self::default()
        }
    }

    pub fn with_ddof(mut self, ddof: Ddof) -> Self {
        self.ddof = Some(ddof);
        self
    }

    pub fn with_maxlag(mut self, maxlag: usize) -> Self {
        self.maxlag = Some(maxlag);
        self
    }
}

/// Quasi-Newton method used by models without a closed-form solution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimMethod {
    #[default]
    Bfgs,
    Lbfgs,
}

/// Tolerances and limits of the numerical optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimArgs {
    /// Gradient-norm tolerance.
    pub gtol: f64,
    /// Maximum number of optimizer iterations per GMM step.
    pub max_iters: u64,
    /// Number of correction pairs kept by L-BFGS.
    pub history: usize,
}

impl Default for OptimArgs {
    fn default() -> Self {
        Self {
            gtol: 1e-5,
            max_iters: 1_000,
            history: 10,
        }
    }
}

impl OptimArgs {
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }
}

/// Configuration bag accepted by [`fit`](crate::estimation::fit).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// `0` for one-step GMM, otherwise the number of optimizations with
    /// weighting updates between them (`2` is two-step GMM).
    pub maxiter: usize,
    /// Initial inverse weighting matrix; defaults to `Z'Z/n`.
    pub inv_weights: Option<DMatrix<f64>>,
    pub optim_method: OptimMethod,
    pub optim_args: OptimArgs,
    pub wargs: WeightArgs,
    /// Use `(G'S⁻¹G)⁻¹` instead of the sandwich covariance.
    pub has_optimal_weights: bool,
    pub weights_method: WeightsMethod,
    /// Early stop of iterated GMM once parameters move less than this.
    pub epsilon_iter: Option<f64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            maxiter: 10,
            inv_weights: None,
            optim_method: OptimMethod::default(),
            optim_args: OptimArgs::default(),
            wargs: WeightArgs::default(),
            has_optimal_weights: true,
            weights_method: WeightsMethod::default(),
            epsilon_iter: None,
        }
    }
}

impl FitOptions {
    /// One-step GMM under the supplied (or default) initial weights.
    pub fn one_step() -> Self {
        Self {
            maxiter: 0,
            ..Self::default()
        }
    }

    pub fn with_maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = maxiter;
        self
    }

    pub fn with_inv_weights(mut self, inv_weights: DMatrix<f64>) -> Self {
        self.inv_weights = Some(inv_weights);
        self
    }

    pub fn with_optim_method(mut self, method: OptimMethod) -> Self {
        self.optim_method = method;
        self
    }

    pub fn with_optim_args(mut self, args: OptimArgs) -> Self {
        self.optim_args = args;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.optim_args.gtol = gtol;
        self
    }

    pub fn with_wargs(mut self, wargs: WeightArgs) -> Self {
        self.wargs = wargs;
        self
    }

    pub fn with_optimal_weights(mut self, optimal: bool) -> Self {
        self.has_optimal_weights = optimal;
        self
    }

    pub fn with_weights_method(mut self, method: WeightsMethod) -> Self {
        self.weights_method = method;
        self
    }

    pub fn with_epsilon_iter(mut self, epsilon: f64) -> Self {
        self.epsilon_iter = Some(epsilon);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let options: FitOptions = serde_json::from_str(
            r#"{
                "maxiter": 2,
                "optim_args": {"gtol": 1e-8},
                "wargs": {"centered": false, "ddof": "k_params"},
                "has_optimal_weights": false,
                "weights_method": "iid"
            }"#,
        )
        .unwrap();

        assert_eq!(options.maxiter, 2);
        assert_eq!(options.optim_args.gtol, 1e-8);
        assert_eq!(options.optim_args.max_iters, 1_000);
        assert!(!options.wargs.centered);
        assert_eq!(options.wargs.ddof, Some(Ddof::K_PARAMS));
        assert!(!options.has_optimal_weights);
        assert_eq!(options.weights_method, WeightsMethod::Iid);
        assert_eq!(options.optim_method, OptimMethod::Bfgs);
        assert!(options.inv_weights.is_none());
    }

    #[test]
    fn numeric_ddof_is_accepted() {
        let wargs: WeightArgs = serde_json::from_str(r#"{"ddof": 0}"#).unwrap();
        assert!(wargs.centered);
        assert_eq!(wargs.ddof, Some(Ddof::Fixed(0)));
        assert_eq!(Ddof::Fixed(3).resolve(13), 3);
        assert_eq!(Ddof::K_PARAMS.resolve(13), 13);
    }
}
