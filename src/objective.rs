//! GMM objective and the generic finite-difference derivatives.
//!
//! These functions work for any [`GmmModel`] and are independent of a model's
//! own `score` / `gradient_momcond` overrides, so specialized derivatives can
//! be checked against them directly.

use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};
use crate::model::GmmModel;

/// Relative step of central differences, `eps^(1/3)`.
fn step_size(value: f64) -> f64 {
    f64::EPSILON.cbrt() * value.abs().max(0.1)
}

/// Mean of each moment condition across observations.
pub fn mean_moments<M: GmmModel + ?Sized>(model: &M, params: &DVector<f64>) -> Result<DVector<f64>> {
    let moms = model.momcond(params)?;
    Ok(moms.row_sum().transpose() / moms.nrows() as f64)
}

/// `ḡ(θ)' W ḡ(θ)`.
pub fn gmm_objective<M: GmmModel + ?Sized>(
    model: &M,
    params: &DVector<f64>,
    weights: &DMatrix<f64>,
) -> Result<f64> {
    let gbar = mean_moments(model, params)?;
    if weights.nrows() != gbar.len() || weights.ncols() != gbar.len() {
        return Err(GmmError::dimension_mismatch(
            "weighting matrix",
            gbar.len(),
            weights.nrows(),
        ));
    }
    Ok(gbar.dot(&(weights * &gbar)))
}

/// Gradient of [`gmm_objective`] by central differences.
pub fn numerical_score<M: GmmModel + ?Sized>(
    model: &M,
    params: &DVector<f64>,
    weights: &DMatrix<f64>,
) -> Result<DVector<f64>> {
    let mut score = DVector::zeros(params.len());
    let mut shifted = params.clone();
    for j in 0..params.len() {
        let h = step_size(params[j]);
        shifted[j] = params[j] + h;
        let upper = gmm_objective(model, &shifted, weights)?;
        shifted[j] = params[j] - h;
        let lower = gmm_objective(model, &shifted, weights)?;
        shifted[j] = params[j];
        score[j] = (upper - lower) / (2.0 * h);
    }
    Ok(score)
}

/// Jacobian of the mean moments (`m × k`) by central differences.
pub fn numerical_gradient_momcond<M: GmmModel + ?Sized>(
    model: &M,
    params: &DVector<f64>,
) -> Result<DMatrix<f64>> {
    let k = params.len();
    let mut jacobian: Option<DMatrix<f64>> = None;
    let mut shifted = params.clone();
    for j in 0..k {
        let h = step_size(params[j]);
        shifted[j] = params[j] + h;
        let upper = mean_moments(model, &shifted)?;
        shifted[j] = params[j] - h;
        let lower = mean_moments(model, &shifted)?;
        shifted[j] = params[j];
        let jac = jacobian.get_or_insert_with(|| DMatrix::zeros(upper.len(), k));
        jac.set_column(j, &((upper - lower) / (2.0 * h)));
    }
    Ok(jacobian.unwrap_or_else(|| DMatrix::zeros(0, 0)))
}

/// Jacobian (`n × k`) of a vector-valued function by central differences.
pub fn numerical_jacobian<F>(params: &DVector<f64>, mut func: F) -> Result<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>>,
{
    let k = params.len();
    let mut jacobian: Option<DMatrix<f64>> = None;
    let mut shifted = params.clone();
    for j in 0..k {
        let h = step_size(params[j]);
        shifted[j] = params[j] + h;
        let upper = func(&shifted)?;
        shifted[j] = params[j] - h;
        let lower = func(&shifted)?;
        shifted[j] = params[j];
        let jac = jacobian.get_or_insert_with(|| DMatrix::zeros(upper.len(), k));
        jac.set_column(j, &((upper - lower) / (2.0 * h)));
    }
    Ok(jacobian.unwrap_or_else(|| DMatrix::zeros(0, 0)))
}
