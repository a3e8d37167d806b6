//! Observation-level data containers and validation utilities used by the IV estimators.

use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};

/// Response, regressors and instruments for an instrumental-variables model.
///
/// Missing values are carried through as NaN; estimators detect them when
/// moments or cross-products are formed.
#[derive(Clone, Debug)]
pub struct IvData {
    endog: DVector<f64>,
    exog: DMatrix<f64>,
    instrument: DMatrix<f64>,
    exog_names: Vec<String>,
    instrument_names: Vec<String>,
    const_idx: Option<usize>,
}

impl IvData {
    /// Creates an `IvData` instance from validated components.
    pub fn new(endog: DVector<f64>, exog: DMatrix<f64>, instrument: DMatrix<f64>) -> Result<Self> {
        IvDataBuilder::new(endog)
            .exog(exog)
            .instrument(instrument)
            .build()
    }

    /// Number of observations.
    pub fn nobs(&self) -> usize {
        self.endog.len()
    }

    /// Number of regressors (`k`).
    pub fn exog_dim(&self) -> usize {
        self.exog.ncols()
    }

    /// Number of instruments (`m`).
    pub fn instrument_dim(&self) -> usize {
        self.instrument.ncols()
    }

    /// Returns a read-only view of the response vector (`y`).
    pub fn endog(&self) -> &DVector<f64> {
        &self.endog
    }

    /// Returns a read-only view of the regressor matrix (`X`).
    pub fn exog(&self) -> &DMatrix<f64> {
        &self.exog
    }

    /// Returns a read-only view of the instrument matrix (`Z`).
    pub fn instrument(&self) -> &DMatrix<f64> {
        &self.instrument
    }

    /// Column names of `X`, `x0, x1, ...` unless supplied.
    pub fn exog_names(&self) -> &[String] {
        &self.exog_names
    }

    /// Column names of `Z`; the exog names when `Z` defaulted to `X`.
    pub fn instrument_names(&self) -> &[String] {
        &self.instrument_names
    }

    /// Index of the constant column in `X`, if any.
    pub fn const_idx(&self) -> Option<usize> {
        self.const_idx
    }

    /// `1` if `X` carries a constant column, `0` otherwise.
    pub fn k_constant(&self) -> usize {
        usize::from(self.const_idx.is_some())
    }
}

/// Builder that validates dimensions before constructing [`IvData`].
#[derive(Debug)]
pub struct IvDataBuilder {
    endog: DVector<f64>,
    exog: Option<DMatrix<f64>>,
    instrument: Option<DMatrix<f64>>,
    exog_names: Option<Vec<String>>,
    instrument_names: Option<Vec<String>>,
}

impl IvDataBuilder {
    /// Start building from the response vector.
    pub fn new(endog: DVector<f64>) -> Self {
        Self {
            endog,
            exog: None,
            instrument: None,
            exog_names: None,
            instrument_names: None,
        }
    }

    /// Sets the regressor matrix (`X`).
    pub fn exog(mut self, matrix: DMatrix<f64>) -> Self {
        self.exog = Some(matrix);
        self
    }

    /// Sets the instrument matrix (`Z`). Defaults to `X` when omitted.
    pub fn instrument(mut self, matrix: DMatrix<f64>) -> Self {
        self.instrument = Some(matrix);
        self
    }

    /// Names the columns of `X`; the count is checked in [`build`](Self::build).
    pub fn exog_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.exog_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Names the columns of `Z`.
    pub fn instrument_names<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.instrument_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Finalizes construction after validating shapes.
    pub fn build(self) -> Result<IvData> {
        let n = self.endog.len();
        if n == 0 {
            return Err(GmmError::dimension_mismatch("endog length", 1, 0));
        }

        let exog = self
            .exog
            .ok_or_else(|| GmmError::missing_component("exog"))?;
        if exog.nrows() != n {
            return Err(GmmError::dimension_mismatch("exog rows", n, exog.nrows()));
        }

        let instrument = self.instrument.unwrap_or_else(|| exog.clone());
        if instrument.nrows() != n {
            return Err(GmmError::dimension_mismatch(
                "instrument rows",
                n,
                instrument.nrows(),
            ));
        }

        let exog_names = match self.exog_names {
            Some(names) if names.len() != exog.ncols() => {
                return Err(GmmError::dimension_mismatch(
                    "exog names",
                    exog.ncols(),
                    names.len(),
                ));
            }
            Some(names) => names,
            None => default_names("x", exog.ncols()),
        };
        let instrument_names = match self.instrument_names {
            Some(names) if names.len() != instrument.ncols() => {
                return Err(GmmError::dimension_mismatch(
                    "instrument names",
                    instrument.ncols(),
                    names.len(),
                ));
            }
            Some(names) => names,
            None => default_names("z", instrument.ncols()),
        };

        let const_idx = find_constant(&exog);

        Ok(IvData {
            endog: self.endog,
            exog,
            instrument,
            exog_names,
            instrument_names,
            const_idx,
        })
    }
}

fn default_names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|j| format!("{prefix}{j}")).collect()
}

/// First column whose entries are all exactly one.
fn find_constant(matrix: &DMatrix<f64>) -> Option<usize> {
    matrix
        .column_iter()
        .position(|column| column.iter().all(|v| *v == 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_validates_and_detects_constant() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = DMatrix::from_row_slice(3, 2, &[0.5, 1.0, 1.5, 1.0, 2.5, 1.0]);
        let data = IvDataBuilder::new(y)
            .exog(x)
            .exog_names(["slope", "const"])
            .build()
            .expect("valid data");

        assert_eq!(data.nobs(), 3);
        assert_eq!(data.const_idx(), Some(1));
        assert_eq!(data.instrument_dim(), 2);
        assert_eq!(data.instrument_names(), ["z0", "z1"]);
    }

    #[test]
    fn builder_rejects_mismatched_instrument_rows() {
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = DMatrix::from_element(3, 1, 1.0);
        let z = DMatrix::from_element(2, 1, 1.0);

        let result = IvData::new(y, x, z);
        assert!(matches!(
            result,
            Err(GmmError::DimensionMismatch {
                context: "instrument rows",
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn missing_values_are_kept() {
        let y = DVector::from_vec(vec![1.0, f64::NAN]);
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        let data = IvDataBuilder::new(y).exog(x).build().unwrap();
        assert!(data.endog()[1].is_nan());
    }
}
