use thiserror::Error;

/// Unified error type for `ivgmm` operations.
#[derive(Debug, Error)]
pub enum GmmError {
    /// Raised when provided arrays or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, often the model-implied value.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when there are fewer moment conditions than parameters.
    #[error("model is under-identified: {moments} moment conditions for {params} parameters")]
    UnderIdentified {
        /// Number of instruments.
        moments: usize,
        /// Number of parameters to estimate.
        params: usize,
    },

    /// Raised when linear algebra operations encounter a singular system.
    #[error("matrix in {context} is singular")]
    SingularMatrix { context: &'static str },

    /// Raised when a covariance estimate has a non-positive or non-finite diagonal.
    #[error("{context} is not positive definite")]
    NotPositiveDefinite { context: &'static str },

    /// Raised when numerical routines produce NaN or infinite values.
    #[error("encountered NaN during {context}")]
    NumericalError { context: &'static str },

    /// Raised when an option value is outside its valid domain.
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption {
        /// Name of the offending option.
        option: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Raised when the numerical optimizer itself fails (not mere non-convergence).
    #[error("optimizer failed: {0}")]
    Optimizer(String),

    /// Raised when a required component has not been provided to a builder.
    #[error("{component} must be provided before building")]
    MissingComponent { component: &'static str },

    /// Raised when a named column does not exist in a data table.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// Raised when a table cell cannot be parsed as a number.
    #[error("cannot parse `{value}` in column `{column}` at row {row}")]
    ParseValue {
        /// Zero-based data row, header excluded.
        row: usize,
        column: String,
        value: String,
    },

    /// Raised by the CSV reader for malformed records.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Raised when a data file cannot be opened or read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GmmError {
    /// Helper to format a [`DimensionMismatch`](GmmError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper to raise when a matrix factorization fails due to singularity.
    pub fn singular(context: &'static str) -> Self {
        Self::SingularMatrix { context }
    }

    /// Helper for non-finite intermediate results.
    pub fn numerical(context: &'static str) -> Self {
        Self::NumericalError { context }
    }

    /// Helper for bubbling up missing component errors from builders.
    pub fn missing_component(component: &'static str) -> Self {
        Self::MissingComponent { component }
    }

    /// Helper for rejected option values.
    pub fn invalid_option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            reason: reason.into(),
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, GmmError>;
