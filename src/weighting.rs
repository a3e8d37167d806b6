//! Moment covariance estimators used to update the GMM weighting matrix.
//!
//! Every estimator returns `S`, the covariance of the moment conditions on the
//! average-moment scale. The weighting matrix handed to the next optimization
//! is `W = S⁻¹`, formed by [`weights_from_inverse`].

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};
use crate::linalg::{ensure_finite, inverse_spd, symmetrize};
use crate::options::WeightArgs;

/// Divisor `n - ddof`, validated to be positive.
fn divisor(nobs: usize, wargs: &WeightArgs, k_params: usize) -> Result<f64> {
    match wargs.ddof {
        None => Ok(nobs as f64),
        Some(ddof) => {
            let ddof = ddof.resolve(k_params);
            if ddof >= nobs {
                return Err(GmmError::invalid_option(
                    "wargs.ddof",
                    format!("ddof {ddof} leaves no degrees of freedom with {nobs} observations"),
                ));
            }
            Ok((nobs - ddof) as f64)
        }
    }
}

fn demean_columns(moms: &DMatrix<f64>) -> DMatrix<f64> {
    let mut centered = moms.clone();
    for mut column in centered.column_iter_mut() {
        let mean = column.mean();
        column.add_scalar_mut(-mean);
    }
    centered
}

/// Outer-product estimator `M'M / (n - ddof)`.
pub fn cov_moments(moms: &DMatrix<f64>, wargs: &WeightArgs, k_params: usize) -> Result<DMatrix<f64>> {
    ensure_finite(moms.iter(), "moment conditions")?;
    let nobs = moms.nrows();
    let centered;
    let moms = if wargs.centered {
        centered = demean_columns(moms);
        &centered
    } else {
        moms
    };
    let s = moms.transpose() * moms / divisor(nobs, wargs, k_params)?;
    trace!("cov weighting: {} moments, centered={}", s.nrows(), wargs.centered);
    Ok(symmetrize(&s))
}

/// Homoskedastic estimator `(Z'Z/n) * u'u / (n - ddof)` for IV moments.
pub fn iid_moments(
    instrument: &DMatrix<f64>,
    residuals: &DVector<f64>,
    wargs: &WeightArgs,
    k_params: usize,
) -> Result<DMatrix<f64>> {
    if instrument.nrows() != residuals.len() {
        return Err(GmmError::dimension_mismatch(
            "residual length",
            instrument.nrows(),
            residuals.len(),
        ));
    }
    ensure_finite(residuals.iter(), "residuals")?;
    let nobs = residuals.len();
    let u = if wargs.centered {
        residuals.add_scalar(-residuals.mean())
    } else {
        residuals.clone()
    };
    let sigma2 = u.dot(&u) / divisor(nobs, wargs, k_params)?;
    let ztz = instrument.transpose() * instrument / nobs as f64;
    trace!("iid weighting: sigma2={sigma2}");
    Ok(symmetrize(&(ztz * sigma2)))
}

/// Newey-West estimator with Bartlett weights `1 - l/(L+1)`.
pub fn hac_moments(moms: &DMatrix<f64>, wargs: &WeightArgs) -> Result<DMatrix<f64>> {
    let maxlag = wargs
        .maxlag
        .ok_or_else(|| GmmError::invalid_option("wargs.maxlag", "required for HAC weights"))?;
    ensure_finite(moms.iter(), "moment conditions")?;
    let nobs = moms.nrows();
    let centered;
    let moms = if wargs.centered {
        centered = demean_columns(moms);
        &centered
    } else {
        moms
    };

    let mut s = moms.transpose() * moms;
    let maxlag = maxlag.min(nobs.saturating_sub(1));
    for lag in 1..=maxlag {
        let weight = 1.0 - lag as f64 / (maxlag as f64 + 1.0);
        let lead = moms.rows(lag, nobs - lag);
        let lagged = moms.rows(0, nobs - lag);
        let gamma = lead.transpose() * lagged;
        s += (&gamma + gamma.transpose()) * weight;
    }
    trace!("hac weighting: maxlag={maxlag}");
    Ok(symmetrize(&(s / nobs as f64)))
}

/// Inverts a moment covariance into a weighting matrix.
pub fn weights_from_inverse(inv_weights: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    inverse_spd(inv_weights, "weighting matrix")
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::options::Ddof;

    fn moments() -> DMatrix<f64> {
        DMatrix::from_row_slice(4, 2, &[1.0, 0.5, -1.0, 0.0, 2.0, -0.5, 0.0, 1.0])
    }

    #[test]
    fn centering_is_irrelevant_for_mean_zero_moments() {
        let moms = DMatrix::from_row_slice(4, 2, &[1.0, 0.5, -1.0, -0.5, 2.0, 1.0, -2.0, -1.0]);
        let centered = cov_moments(&moms, &WeightArgs::default(), 1).unwrap();
        let raw = cov_moments(&moms, &WeightArgs::uncentered(), 1).unwrap();
        assert_relative_eq!(centered, raw, epsilon = 1e-14);
    }

    #[test]
    fn ddof_rescales_outer_product() {
        let moms = moments();
        let plain = cov_moments(&moms, &WeightArgs::uncentered(), 1).unwrap();
        let adjusted = cov_moments(
            &moms,
            &WeightArgs::uncentered().with_ddof(Ddof::K_PARAMS),
            1,
        )
        .unwrap();
        assert_relative_eq!(adjusted, plain * (4.0 / 3.0), epsilon = 1e-14);
    }

    #[test]
    fn ddof_consuming_all_observations_is_rejected() {
        let result = cov_moments(
            &moments(),
            &WeightArgs::default().with_ddof(Ddof::Fixed(4)),
            1,
        );
        assert!(matches!(result, Err(GmmError::InvalidOption { .. })));
    }

    #[test]
    fn hac_with_zero_lag_matches_cov() {
        let moms = moments();
        let wargs = WeightArgs::uncentered().with_maxlag(0);
        let hac = hac_moments(&moms, &wargs).unwrap();
        let cov = cov_moments(&moms, &WeightArgs::uncentered(), 1).unwrap();
        assert_relative_eq!(hac, cov, epsilon = 1e-14);
    }

    #[test]
    fn iid_scales_instrument_cross_product() {
        let z = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let u = DVector::from_vec(vec![1.0, -1.0, 2.0]);
        let s = iid_moments(&z, &u, &WeightArgs::uncentered(), 1).unwrap();
        // Z'Z/n = 14/3, u'u/n = 2
        assert_relative_eq!(s[(0, 0)], 28.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn nan_moments_are_rejected() {
        let moms = DMatrix::from_row_slice(2, 1, &[1.0, f64::NAN]);
        assert!(matches!(
            cov_moments(&moms, &WeightArgs::default(), 1),
            Err(GmmError::NumericalError { .. })
        ));
    }

    #[test]
    fn singular_covariance_cannot_become_weights() {
        let moms = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let s = cov_moments(&moms, &WeightArgs::uncentered(), 1).unwrap();
        assert!(matches!(
            weights_from_inverse(&s),
            Err(GmmError::SingularMatrix { .. })
        ));
    }
}
