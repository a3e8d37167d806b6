//! Quasi-Newton minimization of the GMM objective under fixed weights.
//!
//! Wraps argmin's `BFGS` and `LBFGS` solvers with a More-Thuente line search.
//! Non-convergence within `max_iters` is not an error: the best iterate is
//! returned and the diagnostics in [`OptimizerSummary`] say what happened.

use std::fmt;

use argmin::core::{
    CostFunction, Executor, Gradient, IterState, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::{BFGS, LBFGS};
use log::warn;
use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};
use crate::model::GmmModel;
use crate::options::{OptimArgs, OptimMethod};

/// Diagnostics of one optimizer run.
#[derive(Clone, Debug)]
pub struct OptimizerSummary {
    pub method: OptimMethod,
    /// Whether the solver stopped on its gradient or cost tolerance.
    pub converged: bool,
    /// Solver iterations, not objective evaluations.
    pub iterations: u64,
    /// Objective value at the returned parameters.
    pub fval: f64,
    /// Euclidean norm of the score at the returned parameters.
    pub grad_norm: f64,
    /// Termination message reported by the solver.
    pub message: String,
}

impl fmt::Display for OptimizerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}(fval={:.6e}, iterations={}, grad_norm={:.3e}, converged={})",
            self.method, self.fval, self.iterations, self.grad_norm, self.converged
        )
    }
}

/// Outcome of a single GMM step.
#[derive(Clone, Debug)]
pub struct GmmStep {
    /// Minimizer of the objective under the step's weights.
    pub params: DVector<f64>,
    /// `None` for closed-form steps.
    pub optimizer: Option<OptimizerSummary>,
}

impl GmmStep {
    /// Step solved without the optimizer.
    pub fn closed_form(params: DVector<f64>) -> Self {
        Self {
            params,
            optimizer: None,
        }
    }
}

/// Adapter exposing a model's objective and score to argmin.
struct GmmProblem<'a, M: ?Sized> {
    model: &'a M,
    weights: &'a DMatrix<f64>,
}

impl<M: GmmModel + ?Sized> CostFunction for GmmProblem<'_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let params = DVector::from_column_slice(params);
        self.model
            .gmm_objective(&params, self.weights)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl<M: GmmModel + ?Sized> Gradient for GmmProblem<'_, M> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let params = DVector::from_column_slice(params);
        self.model
            .score(&params, self.weights)
            .map(|score| score.as_slice().to_vec())
            .map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

/// Best parameters, iteration count and termination status of a finished run.
fn extract<H>(
    state: &IterState<Vec<f64>, Vec<f64>, (), H, (), f64>,
    fallback: &[f64],
) -> (Vec<f64>, u64, bool, String) {
    let params = state
        .get_best_param()
        .cloned()
        .unwrap_or_else(|| fallback.to_vec());
    let termination = state.get_termination_status();
    let converged = matches!(
        termination,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    );
    (params, state.get_iter(), converged, termination.to_string())
}

fn optimizer_error(e: argmin::core::Error) -> GmmError {
    GmmError::Optimizer(e.to_string())
}

/// Minimizes `model.gmm_objective(·, weights)` starting from `start`.
pub fn minimize<M: GmmModel + ?Sized>(
    model: &M,
    start: &DVector<f64>,
    weights: &DMatrix<f64>,
    method: OptimMethod,
    args: &OptimArgs,
) -> Result<GmmStep> {
    if start.len() != model.k_params() {
        return Err(GmmError::dimension_mismatch(
            "start params",
            model.k_params(),
            start.len(),
        ));
    }
    if args.gtol.is_nan() || args.gtol <= 0.0 {
        return Err(GmmError::invalid_option("optim_args.gtol", "must be positive"));
    }
    // Surface data problems (NaN, shape) with their own error before the solver wraps them.
    model.gmm_objective(start, weights)?;
    model.score(start, weights)?;

    let init = start.as_slice().to_vec();
    let problem = GmmProblem { model, weights };
    let linesearch = MoreThuenteLineSearch::new();

    let (params, iterations, converged, message) = match method {
        OptimMethod::Bfgs => {
            let k = init.len();
            let inv_hessian: Vec<Vec<f64>> = (0..k)
                .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
                .collect();
            let solver = BFGS::new(linesearch)
                .with_tolerance_grad(args.gtol)
                .map_err(optimizer_error)?;
            let res = Executor::new(problem, solver)
                .configure(|state| {
                    state
                        .param(init.clone())
                        .inv_hessian(inv_hessian)
                        .max_iters(args.max_iters)
                })
                .run()
                .map_err(optimizer_error)?;
            extract(res.state(), &init)
        }
        OptimMethod::Lbfgs => {
            let solver = LBFGS::new(linesearch, args.history)
                .with_tolerance_grad(args.gtol)
                .map_err(optimizer_error)?;
            let res = Executor::new(problem, solver)
                .configure(|state| state.param(init.clone()).max_iters(args.max_iters))
                .run()
                .map_err(optimizer_error)?;
            extract(res.state(), &init)
        }
    };

    let params = DVector::from_vec(params);
    let fval = model.gmm_objective(&params, weights)?;
    let grad_norm = model.score(&params, weights)?.norm();
    if !converged {
        warn!(
            "{method:?} stopped without converging after {iterations} iterations ({message}); \
             gradient norm {grad_norm:.3e}"
        );
    }

    Ok(GmmStep {
        params,
        optimizer: Some(OptimizerSummary {
            method,
            converged,
            iterations,
            fval,
            grad_norm,
            message,
        }),
    })
}
