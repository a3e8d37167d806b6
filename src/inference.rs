//! Wald-type hypothesis tests on estimated parameters.
//!
//! GMM results use the standard normal / chi-squared references, 2SLS results
//! Student t and F with the residual degrees of freedom.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::function::erf::{erf_inv, erfc};

use crate::error::{GmmError, Result};
use crate::linalg::inverse_spd;

/// Sampling distribution of a single test statistic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reference {
    Normal,
    StudentT { df: f64 },
}

impl Reference {
    /// Two-sided p-value of `statistic`.
    pub fn two_sided_pvalue(self, statistic: f64) -> f64 {
        if !statistic.is_finite() {
            return f64::NAN;
        }
        match self {
            Reference::Normal => erfc(statistic.abs() / std::f64::consts::SQRT_2),
            Reference::StudentT { df } => StudentsT::new(0.0, 1.0, df)
                .ok()
                .map_or(f64::NAN, |d| 2.0 * d.sf(statistic.abs())),
        }
    }

    /// Critical value for a two-sided interval of level `1 - alpha`.
    pub fn critical_value(self, alpha: f64) -> f64 {
        match self {
            Reference::Normal => std::f64::consts::SQRT_2 * erf_inv(1.0 - alpha),
            Reference::StudentT { df } => StudentsT::new(0.0, 1.0, df)
                .ok()
                .map_or(f64::NAN, |d| d.inverse_cdf(1.0 - alpha / 2.0)),
        }
    }
}

/// Upper tail of the chi-squared distribution.
pub fn chi2_sf(statistic: f64, df: f64) -> f64 {
    ChiSquared::new(df)
        .ok()
        .map_or(f64::NAN, |d| d.sf(statistic))
}

/// Upper tail of the F distribution.
pub fn f_sf(statistic: f64, df_num: f64, df_denom: f64) -> f64 {
    FisherSnedecor::new(df_num, df_denom)
        .ok()
        .map_or(f64::NAN, |d| d.sf(statistic))
}

/// Result of a set of single-restriction tests `R θ = q`.
#[derive(Clone, Debug)]
pub struct ContrastResults {
    /// `R θ`.
    pub effect: DVector<f64>,
    /// Standard errors of `R θ`.
    pub sd: DVector<f64>,
    /// `(R θ − q) / sd`.
    pub statistic: DVector<f64>,
    /// Two-sided p-values under `reference`.
    pub pvalue: DVector<f64>,
    /// Distribution the statistics are compared against.
    pub reference: Reference,
}

impl ContrastResults {
    /// Alias matching the regression naming (`tvalue`).
    pub fn tvalue(&self) -> &DVector<f64> {
        &self.statistic
    }
}

/// Joint F test of `R θ = q`.
#[derive(Clone, Copy, Debug)]
pub struct FTestResults {
    /// Wald statistic divided by the number of restrictions.
    pub fvalue: f64,
    pub pvalue: f64,
    /// Number of restrictions.
    pub df_num: usize,
    /// Residual degrees of freedom of the fit.
    pub df_denom: f64,
}

/// Joint chi-squared (Wald) test of `R θ = q`.
#[derive(Clone, Copy, Debug)]
pub struct WaldResults {
    pub statistic: f64,
    /// Upper tail of χ² with `df` degrees of freedom.
    pub pvalue: f64,
    pub df: usize,
}

fn check_restriction(
    params: &DVector<f64>,
    restriction: &DMatrix<f64>,
    q: Option<&DVector<f64>>,
) -> Result<DVector<f64>> {
    if restriction.ncols() != params.len() {
        return Err(GmmError::dimension_mismatch(
            "restriction columns",
            params.len(),
            restriction.ncols(),
        ));
    }
    let q = match q {
        Some(q) if q.len() != restriction.nrows() => {
            return Err(GmmError::dimension_mismatch(
                "restriction constants",
                restriction.nrows(),
                q.len(),
            ));
        }
        Some(q) => q.clone(),
        None => DVector::zeros(restriction.nrows()),
    };
    Ok(q)
}

/// Individual tests of each row of `R θ = q`.
pub fn t_test(
    params: &DVector<f64>,
    cov: &DMatrix<f64>,
    restriction: &DMatrix<f64>,
    q: Option<&DVector<f64>>,
    reference: Reference,
) -> Result<ContrastResults> {
    let q = check_restriction(params, restriction, q)?;
    let effect = restriction * params;
    let rcr = restriction * cov * restriction.transpose();
    let sd = rcr.diagonal().map(f64::sqrt);
    let statistic = (&effect - q).component_div(&sd);
    let pvalue = statistic.map(|t| reference.two_sided_pvalue(t));
    Ok(ContrastResults {
        effect,
        sd,
        statistic,
        pvalue,
        reference,
    })
}

/// `(Rθ − q)' (R V R')⁻¹ (Rθ − q)`.
fn wald_statistic(
    params: &DVector<f64>,
    cov: &DMatrix<f64>,
    restriction: &DMatrix<f64>,
    q: Option<&DVector<f64>>,
) -> Result<f64> {
    let q = check_restriction(params, restriction, q)?;
    let diff = restriction * params - q;
    let rcr = restriction * cov * restriction.transpose();
    let rcr_inv = inverse_spd(&rcr, "R V R'")?;
    Ok(diff.dot(&(rcr_inv * &diff)))
}

/// Joint F test with `df_denom` denominator degrees of freedom.
pub fn f_test(
    params: &DVector<f64>,
    cov: &DMatrix<f64>,
    restriction: &DMatrix<f64>,
    q: Option<&DVector<f64>>,
    df_denom: f64,
) -> Result<FTestResults> {
    let df_num = restriction.nrows();
    let fvalue = wald_statistic(params, cov, restriction, q)? / df_num as f64;
    Ok(FTestResults {
        fvalue,
        pvalue: f_sf(fvalue, df_num as f64, df_denom),
        df_num,
        df_denom,
    })
}

/// Joint chi-squared test.
pub fn wald_test(
    params: &DVector<f64>,
    cov: &DMatrix<f64>,
    restriction: &DMatrix<f64>,
    q: Option<&DVector<f64>>,
) -> Result<WaldResults> {
    let df = restriction.nrows();
    let statistic = wald_statistic(params, cov, restriction, q)?;
    Ok(WaldResults {
        statistic,
        pvalue: chi2_sf(statistic, df as f64),
        df,
    })
}

/// Identity rows for every parameter except `skip`.
pub fn exclusion_restriction(k_params: usize, skip: Option<usize>) -> DMatrix<f64> {
    let rows: Vec<usize> = (0..k_params).filter(|j| Some(*j) != skip).collect();
    DMatrix::from_fn(rows.len(), k_params, |r, c| if rows[r] == c { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn normal_reference_values() {
        let z = 1.959_963_984_540_054;
        assert_relative_eq!(Reference::Normal.two_sided_pvalue(z), 0.05, epsilon = 1e-12);
        assert_relative_eq!(Reference::Normal.critical_value(0.05), z, epsilon = 1e-9);
    }

    #[test]
    fn student_t_is_wider_than_normal() {
        let t = Reference::StudentT { df: 10.0 };
        assert!(t.two_sided_pvalue(2.0) > Reference::Normal.two_sided_pvalue(2.0));
        assert_relative_eq!(t.critical_value(0.05), 2.228_138_851_986_274, epsilon = 1e-6);
    }

    #[test]
    fn single_row_f_test_is_squared_t_test() {
        let params = DVector::from_vec(vec![1.5, -0.3]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.25, 0.01, 0.01, 0.04]);
        let r = DMatrix::from_row_slice(1, 2, &[0.0, 1.0]);
        let t = t_test(&params, &cov, &r, None, Reference::StudentT { df: 30.0 }).unwrap();
        let f = f_test(&params, &cov, &r, None, 30.0).unwrap();
        assert_relative_eq!(f.fvalue, t.statistic[0].powi(2), epsilon = 1e-12);
        assert_relative_eq!(f.pvalue, t.pvalue[0], epsilon = 1e-8);
    }

    #[test]
    fn exclusion_restriction_skips_constant() {
        let r = exclusion_restriction(3, Some(0));
        assert_eq!(r, DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn mismatched_restriction_is_rejected() {
        let params = DVector::from_vec(vec![1.0, 2.0]);
        let cov = DMatrix::identity(2, 2);
        let r = DMatrix::identity(3, 3);
        assert!(matches!(
            t_test(&params, &cov, &r, None, Reference::Normal),
            Err(GmmError::DimensionMismatch { .. })
        ));
    }
}
