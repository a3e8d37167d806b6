//! Reference values for the Griliches (1976) returns-to-schooling data.
//!
//! The dataset is not redistributed with the crate. Export it to CSV, set
//! `GRILICHES76_CSV` and run `cargo test -- --ignored`.

mod common;

use approx::assert_relative_eq;
use ivgmm::estimation::CovOptions;
use ivgmm::inference::exclusion_restriction;
use ivgmm::options::WeightArgs;
use ivgmm::{FitOptions, GmmModel, Iv2Sls, IvGmm, LinearIvGmm};
use nalgebra::{DMatrix, DVector};

use common::{griliches, Golden, R_IVREG, R_IVREG_PVALUES, R_IVREG_TVALUES, STATA_ONESTEP};

fn assert_close_each(
    name: &str,
    what: &str,
    actual: &DVector<f64>,
    expected: &[f64],
    rtol: f64,
    atol: f64,
) {
    for (j, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= atol + rtol * e.abs(),
            "{name}: {what}[{j}] = {a}, expected {e}"
        );
    }
}

#[test]
#[ignore = "requires GRILICHES76_CSV"]
fn iv2sls_matches_r_ivreg() {
    let Some(data) = griliches() else {
        return;
    };
    let model = Iv2Sls::new(data).unwrap();
    let res = model.fit().unwrap();

    assert_close_each(R_IVREG.name, "params", &res.params, &R_IVREG.params, 1e-7, 1e-9);
    assert_close_each(R_IVREG.name, "bse", &res.bse, &R_IVREG.bse, 0.0, 3e-7);
    assert_close_each(R_IVREG.name, "tvalues", &res.tvalues(), &R_IVREG_TVALUES, 0.0, 5e-6);
    assert_close_each(R_IVREG.name, "pvalues", &res.pvalues(), &R_IVREG_PVALUES, 5e-6, 5e-7);
    assert_relative_eq!(res.params[1], 0.1724, max_relative = 1e-3);

    let k = res.params.len();
    let t = res.t_test(&DMatrix::identity(k, k)).unwrap();
    assert_relative_eq!(t.statistic, res.tvalues(), max_relative = 1e-12);
    let f = res.f_test(&exclusion_restriction(k, Some(0)), None).unwrap();
    assert_relative_eq!(f.fvalue, res.fvalue, max_relative = 1e-12);

    let hausman = res.spec_hausman(None).unwrap();
    assert_eq!(hausman.dof, 2);
    assert!(hausman.statistic > 0.0);
}

fn onestep(golden: &Golden, res_params: &DVector<f64>, res_bse: &DVector<f64>) {
    assert_close_each(golden.name, "params", res_params, &golden.params, 1e-4, 1e-4);
    assert_close_each(golden.name, "bse", res_bse, &golden.bse, 0.09, 0.0);
}

#[test]
#[ignore = "requires GRILICHES76_CSV"]
fn onestep_gmm_matches_r_and_stata() {
    let Some(data) = griliches() else {
        return;
    };
    let generic = IvGmm::new(data.clone()).unwrap();
    let start = DVector::from_element(generic.k_params(), 1.0);
    let res = generic
        .fit(&start, &FitOptions::one_step().with_gtol(1e-8))
        .unwrap();
    onestep(&R_IVREG, &res.params, &res.bse);
    let score = generic.score(&res.params, &res.weights).unwrap();
    assert!(score.amax() < 5e-6, "score {score}");

    // Robust one-step errors: sandwich around uncentered moments.
    let linear = LinearIvGmm::new(data).unwrap();
    let options = FitOptions::one_step()
        .with_wargs(WeightArgs::uncentered())
        .with_optimal_weights(false);
    let res = linear.fit(&start, &options).unwrap();
    onestep(&STATA_ONESTEP, &res.params, &res.bse);
}

#[test]
#[ignore = "requires GRILICHES76_CSV"]
fn twostep_gmm_is_close_to_2sls_with_robust_errors() {
    let Some(data) = griliches() else {
        return;
    };
    let model = LinearIvGmm::new(data).unwrap();
    let start = DVector::zeros(model.k_params());
    let res = model
        .fit(&start, &FitOptions::default().with_maxiter(2))
        .unwrap();
    assert_relative_eq!(res.params[1], 0.1724, max_relative = 0.05);

    let j = res.jtest().unwrap();
    assert_eq!(j.df, 2);
    assert!(j.statistic >= 0.0);

    let sandwich = res
        .cov_params_with(&CovOptions {
            has_optimal_weights: Some(false),
            ..CovOptions::default()
        })
        .unwrap();
    assert!(sandwich.diagonal().iter().all(|v| *v > 0.0));
}
