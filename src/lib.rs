//! Generalized method of moments and instrumental-variables estimation.
//!
//! This crate estimates linear and nonlinear instrumental-variables models
//! through the moment conditions `E[z_i (y_i − f(x_i, θ))] = 0`. It offers
//!
//! - validated response / regressor / instrument containers (`data`, `table`),
//! - one-step, two-step and iterated GMM with interchangeable weighting-matrix
//!   estimators (`estimation`, `weighting`, `model`),
//! - closed-form linear GMM, optimizer-based nonlinear GMM (`model`,
//!   `optimizer`),
//! - two-stage least squares with regression statistics and the Hausman
//!   specification test (`iv2sls`), and
//! - t, F and Wald tests on the estimates (`inference`).
//!
//! # Quick start
//!
//! ```no_run
//! use ivgmm::data::IvDataBuilder;
//! use ivgmm::model::{GmmModel, LinearIvGmm};
//! use ivgmm::options::FitOptions;
//! use nalgebra::{DMatrix, DVector};
//!
//! let y = DVector::from_vec(vec![1.2, 1.9, 3.1, 4.2, 4.8, 6.1]);
//! let x = DMatrix::from_row_slice(6, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0, 1.0, 5.0, 1.0, 6.0]);
//! let z = DMatrix::from_row_slice(
//!     6,
//!     3,
//!     &[1.0, 0.9, 0.2, 1.0, 2.1, 0.1, 1.0, 2.8, 0.4, 1.0, 4.1, 0.3, 1.0, 5.2, 0.2, 1.0, 5.9, 0.5],
//! );
//!
//! let data = IvDataBuilder::new(y)
//!     .exog(x)
//!     .instrument(z)
//!     .exog_names(["const", "x"])
//!     .build()
//!     .expect("validated data");
//!
//! let model = LinearIvGmm::new(data).expect("identified model");
//! let options = FitOptions::default().with_maxiter(2);
//! let start = DVector::zeros(model.k_params());
//! let result = model.fit(&start, &options).expect("two-step GMM");
//!
//! println!("{}", result.summary());
//! println!("Hansen J: {:?}", result.jtest());
//! ```

pub mod data;
pub mod error;
pub mod estimation;
pub mod inference;
pub mod iv2sls;
pub mod linalg;
pub mod model;
pub mod objective;
pub mod ols;
pub mod optimizer;
pub mod options;
pub mod simulation;
pub mod summary;
pub mod table;
pub mod weighting;

pub use data::{IvData, IvDataBuilder};
pub use error::{GmmError, Result};
pub use estimation::{CovOptions, GmmResults};
pub use iv2sls::{HausmanResults, Iv2Sls, IvRegressionResults};
pub use model::{GmmModel, IvGmm, LinearIvGmm, NonlinearIvGmm};
pub use options::{FitOptions, OptimArgs, OptimMethod, WeightArgs, WeightsMethod};
