//! Plain-text coefficient tables for fitted models.

use std::fmt;

use nalgebra::DVector;

use crate::inference::Reference;

/// One line of the coefficient table.
#[derive(Clone, Debug)]
pub struct CoefficientRow {
    pub name: String,
    pub coef: f64,
    pub std_err: f64,
    /// z or t statistic, depending on the reference distribution.
    pub statistic: f64,
    pub pvalue: f64,
    /// Lower confidence bound.
    pub lower: f64,
    /// Upper confidence bound.
    pub upper: f64,
}

/// Header statistics plus a coefficient table; rendered through `Display`.
#[derive(Clone, Debug)]
pub struct Summary {
    title: String,
    info: Vec<(String, String)>,
    statistic_label: &'static str,
    rows: Vec<CoefficientRow>,
}

impl Summary {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            info: Vec::new(),
            statistic_label: "z",
            rows: Vec::new(),
        }
    }

    /// Adds a `key: value` line to the header.
    pub fn info(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.info.push((key.into(), value.to_string()));
        self
    }

    /// Fills the coefficient table with `1 - alpha` confidence intervals.
    pub fn coefficients(
        mut self,
        names: &[String],
        params: &DVector<f64>,
        bse: &DVector<f64>,
        reference: Reference,
        alpha: f64,
    ) -> Self {
        self.statistic_label = match reference {
            Reference::Normal => "z",
            Reference::StudentT { .. } => "t",
        };
        let critical = reference.critical_value(alpha);
        self.rows = names
            .iter()
            .zip(params.iter().zip(bse.iter()))
            .map(|(name, (&coef, &std_err))| {
                let statistic = coef / std_err;
                CoefficientRow {
                    name: name.clone(),
                    coef,
                    std_err,
                    statistic,
                    pvalue: reference.two_sided_pvalue(statistic),
                    lower: coef - critical * std_err,
                    upper: coef + critical * std_err,
                }
            })
            .collect();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rows(&self) -> &[CoefficientRow] {
        &self.rows
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .rows
            .iter()
            .map(|row| row.name.len())
            .max()
            .unwrap_or(0)
            .max(8);
        let width = name_width + 6 * 12;
        let rule = "=".repeat(width);

        writeln!(f, "{:^width$}", self.title)?;
        writeln!(f, "{rule}")?;
        for (key, value) in &self.info {
            writeln!(f, "{key:<24}{value:>24}")?;
        }
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "{:<name_width$}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}",
            "",
            "coef",
            "std err",
            self.statistic_label,
            format!("P>|{}|", self.statistic_label),
            "[0.025",
            "0.975]"
        )?;
        writeln!(f, "{}", "-".repeat(width))?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<name_width$}{:>12.4}{:>12.4}{:>12.3}{:>12.3}{:>12.3}{:>12.3}",
                row.name, row.coef, row.std_err, row.statistic, row.pvalue, row.lower, row.upper
            )?;
        }
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rows_and_header() {
        let names = vec!["const".to_string(), "x1".to_string()];
        let params = DVector::from_vec(vec![1.0, 0.5]);
        let bse = DVector::from_vec(vec![0.1, 0.25]);
        let summary = Summary::new("GMM Results")
            .info("No. Observations:", 100)
            .coefficients(&names, &params, &bse, Reference::Normal, 0.05);

        let text = summary.to_string();
        assert!(text.contains("GMM Results"));
        assert!(text.contains("No. Observations:"));
        assert!(text.contains("P>|z|"));
        assert_eq!(summary.rows().len(), 2);
        assert!((summary.rows()[1].statistic - 2.0).abs() < 1e-12);
    }
}
