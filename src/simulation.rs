//! Deterministic synthetic IV designs for tests and benchmarks.
//!
//! The generated model is
//!
//! ```text
//! x_j = Σ_l z_l + 0.5 Σ_i w_i + v_j
//! u   = ρ v_1 + sqrt(1 − ρ²) e        (scaled by sqrt(0.5 + 0.5 s²) if heteroskedastic)
//! y   = 1 + Σ_i w_i + Σ_j x_j + u
//! ```
//!
//! with `w`, `z`, `v`, `e` independent standard normal and `s` the first
//! excluded instrument (or the first exogenous regressor when there is none).

use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::data::{IvData, IvDataBuilder};
use crate::error::{GmmError, Result};

/// Builder describing a linear IV data-generating process.
#[derive(Clone, Debug)]
pub struct IvDesign {
    nobs: usize,
    exogenous: usize,
    endogenous: usize,
    excluded: usize,
    endogeneity: f64,
    heteroskedastic: bool,
    seed: u64,
}

impl IvDesign {
    /// One exogenous regressor, one endogenous regressor, two excluded
    /// instruments and `ρ = 0.5` unless changed.
    pub fn new(nobs: usize) -> Self {
        Self {
            nobs,
            exogenous: 1,
            endogenous: 1,
            excluded: 2,
            endogeneity: 0.5,
            heteroskedastic: false,
            seed: 0,
        }
    }

    /// Included exogenous regressors besides the constant.
    pub fn exogenous(mut self, count: usize) -> Self {
        self.exogenous = count;
        self
    }

    /// Instrumented regressors; the first one drives the endogeneity.
    pub fn endogenous(mut self, count: usize) -> Self {
        self.endogenous = count;
        self
    }

    /// Instruments that do not enter the outcome equation.
    pub fn excluded(mut self, count: usize) -> Self {
        self.excluded = count;
        self
    }

    /// Correlation between the structural error and the first-stage error.
    pub fn endogeneity(mut self, rho: f64) -> Self {
        self.endogeneity = rho;
        self
    }

    /// Scales the structural error by the first excluded instrument, or by
    /// the first exogenous regressor when there is none.
    pub fn heteroskedastic(mut self, enabled: bool) -> Self {
        self.heteroskedastic = enabled;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of regressors including the constant.
    pub fn k_params(&self) -> usize {
        1 + self.exogenous + self.endogenous
    }

    /// True coefficients: all ones.
    pub fn true_params(&self) -> DVector<f64> {
        DVector::from_element(self.k_params(), 1.0)
    }

    /// Draws one dataset. Rejects under-identified designs and `|ρ| ≥ 1`.
    pub fn simulate(&self) -> Result<IvData> {
        let moments = 1 + self.exogenous + self.excluded;
        if moments < self.k_params() {
            return Err(GmmError::UnderIdentified {
                moments,
                params: self.k_params(),
            });
        }
        if !(self.endogeneity.abs() < 1.0) {
            return Err(GmmError::invalid_option(
                "endogeneity",
                format!("{} is outside (-1, 1)", self.endogeneity),
            ));
        }

        let n = self.nobs;
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut normal = |rows: usize, cols: usize| {
            let values: Vec<f64> = (0..rows * cols)
                .map(|_| StandardNormal.sample(&mut rng))
                .collect();
            DMatrix::from_vec(rows, cols, values)
        };
        let w = normal(n, self.exogenous);
        let z = normal(n, self.excluded);
        let v = normal(n, self.endogenous);
        let e = normal(n, 1);

        let z_sum: DVector<f64> = z.column_sum();
        let w_sum: DVector<f64> = w.column_sum();
        let mut x = v.clone();
        for mut column in x.column_iter_mut() {
            column += &z_sum + &w_sum * 0.5;
        }

        let rho = self.endogeneity;
        let mut u: DVector<f64> = e.column(0) * (1.0 - rho * rho).sqrt();
        if self.endogenous > 0 {
            u += v.column(0) * rho;
        }
        if self.heteroskedastic {
            let driver = if self.excluded > 0 {
                Some(z.column(0))
            } else if self.exogenous > 0 {
                Some(w.column(0))
            } else {
                None
            };
            if let Some(driver) = driver {
                u.zip_apply(&driver, |ui, s| *ui *= (0.5 + 0.5 * s * s).sqrt());
            }
        }

        let ones = DMatrix::from_element(n, 1, 1.0);
        let exog = concat_columns(&[&ones, &w, &x]);
        let instrument = concat_columns(&[&ones, &w, &z]);
        let endog = &exog * self.true_params() + u;

        let exog_names = std::iter::once("const".to_string())
            .chain(numbered("w", self.exogenous))
            .chain(numbered("x", self.endogenous));
        let instrument_names = std::iter::once("const".to_string())
            .chain(numbered("w", self.exogenous))
            .chain(numbered("z", self.excluded));

        IvDataBuilder::new(endog)
            .exog(exog)
            .instrument(instrument)
            .exog_names(exog_names)
            .instrument_names(instrument_names)
            .build()
    }
}

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|j| format!("{prefix}{j}")).collect()
}

fn concat_columns(blocks: &[&DMatrix<f64>]) -> DMatrix<f64> {
    let nrows = blocks.first().map_or(0, |b| b.nrows());
    let ncols = blocks.iter().map(|b| b.ncols()).sum();
    let mut out = DMatrix::zeros(nrows, ncols);
    let mut offset = 0;
    for block in blocks {
        out.columns_mut(offset, block.ncols()).copy_from(block);
        offset += block.ncols();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_names() {
        let data = IvDesign::new(20).exogenous(2).excluded(3).seed(1).simulate().unwrap();
        assert_eq!(data.exog_dim(), 4);
        assert_eq!(data.instrument_dim(), 6);
        assert_eq!(data.exog_names(), ["const", "w1", "w2", "x1"]);
        assert_eq!(data.instrument_names(), ["const", "w1", "w2", "z1", "z2", "z3"]);
        assert_eq!(data.const_idx(), Some(0));
        assert_eq!(data.exog().column(1), data.instrument().column(1));
    }

    #[test]
    fn same_seed_same_data() {
        let a = IvDesign::new(30).seed(42).simulate().unwrap();
        let b = IvDesign::new(30).seed(42).simulate().unwrap();
        let c = IvDesign::new(30).seed(43).simulate().unwrap();
        assert_eq!(a.endog(), b.endog());
        assert_ne!(a.endog(), c.endog());
    }

    #[test]
    fn under_identified_design_is_rejected() {
        let result = IvDesign::new(10).endogenous(3).excluded(1).simulate();
        assert!(matches!(
            result,
            Err(GmmError::UnderIdentified {
                moments: 3,
                params: 5
            })
        ));
    }

    #[test]
    fn endogeneity_must_be_a_correlation() {
        assert!(IvDesign::new(10).endogeneity(1.0).simulate().is_err());
    }
}
