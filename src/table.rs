//! Numeric tables loaded from CSV files and turned into design matrices.
//!
//! Missing entries (`""`, `"."`, `"NA"`, `"NaN"`) are stored as NaN and carried
//! into every derived column. Nothing is imputed or dropped; the estimators
//! reject non-finite data when they form moments.

use std::io;
use std::path::Path;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::{GmmError, Result};

const MISSING: [&str; 4] = ["", ".", "NA", "NaN"];

/// Column-oriented table of `f64` values.
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    nrows: usize,
}

fn parse_cell(value: &str, row: usize, column: &str) -> Result<f64> {
    let trimmed = value.trim();
    if MISSING.contains(&trimmed) {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| GmmError::ParseValue {
        row,
        column: column.to_string(),
        value: value.to_string(),
    })
}

impl DataTable {
    /// Reads a CSV file with a header row. Empty cells, `.`, `NA` and `NaN`
    /// become NaN; anything else that does not parse is an error.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        let table = Self::from_csv(reader)?;
        debug!(
            "loaded {} rows and {} columns from {}",
            table.nrows,
            table.names.len(),
            path.display()
        );
        Ok(table)
    }

    /// Same as [`from_path`](Self::from_path) for any reader.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        Self::from_csv(csv::ReaderBuilder::new().has_headers(true).from_reader(reader))
    }

    fn from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let names: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut columns = vec![Vec::new(); names.len()];
        let mut nrows = 0;
        for record in reader.records() {
            let record = record?;
            nrows += 1;
            for ((column, name), value) in columns.iter_mut().zip(&names).zip(record.iter()) {
                column.push(parse_cell(value, nrows, name)?);
            }
        }
        Ok(Self {
            names,
            columns,
            nrows,
        })
    }

    /// Number of data rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Column names in file order, including added columns.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| GmmError::UnknownColumn(name.to_string()))
    }

    /// Values of a column, or [`GmmError::UnknownColumn`].
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        Ok(&self.columns[self.position(name)?])
    }

    /// Appends a column; names must be unique and lengths must match.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(GmmError::invalid_option(
                "column",
                format!("`{name}` already exists"),
            ));
        }
        if self.names.is_empty() {
            self.nrows = values.len();
        } else if values.len() != self.nrows {
            return Err(GmmError::dimension_mismatch(
                "column length",
                self.nrows,
                values.len(),
            ));
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Adds a column of ones.
    pub fn add_constant(&mut self, name: impl Into<String>) -> Result<()> {
        self.push_column(name, vec![1.0; self.nrows])
    }

    /// Adds one 0/1 column per distinct value of `column`, named
    /// `{prefix}{value}` and ordered by first appearance. Rows where the source
    /// is missing are NaN in every indicator. Returns the new column names.
    pub fn add_indicators(&mut self, column: &str, prefix: &str) -> Result<Vec<String>> {
        let source = self.column(column)?.to_vec();
        let mut levels: Vec<f64> = Vec::new();
        for value in source.iter().filter(|v| !v.is_nan()) {
            if !levels.contains(value) {
                levels.push(*value);
            }
        }

        let mut added = Vec::with_capacity(levels.len());
        for level in levels {
            let name = format!("{prefix}{level}");
            let values = source
                .iter()
                .map(|v| {
                    if v.is_nan() {
                        f64::NAN
                    } else if *v == level {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            self.push_column(name.clone(), values)?;
            added.push(name);
        }
        Ok(added)
    }

    pub fn vector(&self, column: &str) -> Result<DVector<f64>> {
        Ok(DVector::from_column_slice(self.column(column)?))
    }

    /// `n × columns.len()` matrix in the listed order.
    pub fn matrix<S: AsRef<str>>(&self, columns: &[S]) -> Result<DMatrix<f64>> {
        let selected = columns
            .iter()
            .map(|name| self.column(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(DMatrix::from_fn(self.nrows, selected.len(), |i, j| {
            selected[j][i]
        }))
    }
}
