//! `mzfitter` fits one dimensional peak shape models to short runs of signal,
//! the building block feature finders use to decide whether a region of an
//! m/z or retention time axis holds a peak, where it is and how well a model
//! describes it.
//!
//! A [`Fitter1D`] is chosen by name from a closed set of fitters and run on a
//! [`RawDataArray`] with a [`FitterConfig`]. The [`FitResult`] holds an
//! [`InterpolationModel`], the fitted [`PeakShape`] sampled on a regular grid,
//! and a quality score, the Pearson correlation of the model with the signal.
//!
//! Signal that cannot be fit is not an error. A fit that fails reports the
//! sentinel quality [`FAILED_QUALITY`] so callers can filter on quality alone.
//!
//! # Usage
//! ```
//! use mzfitter::{Fitter1D, FitterConfig, PeakShape, RawDataArray};
//!
//! let positions: Vec<f64> = (0..60).map(|i| 10.0 + i as f64 * 0.1).collect();
//! let intensity: Vec<f64> = positions
//!     .iter()
//!     .map(|x| 500.0 * (-0.5 * (x - 13.0f64).powi(2) / 0.25).exp())
//!     .collect();
//! let data = RawDataArray::from((positions, intensity));
//!
//! let config = FitterConfig::builder()
//!     .interpolation_step(0.02)
//!     .build()
//!     .unwrap();
//! let result = Fitter1D::Gauss.fit1d(&data, &config).unwrap();
//! assert!(result.quality > 0.99);
//! if let PeakShape::Gaussian(shape) = result.model.shape() {
//!     assert!((shape.mean - 13.0).abs() < 0.05);
//! }
//! ```
//!
//! The least squares fitters are driven by the general purpose solver in
//! [`optimize`], which can be used with any [`LeastSquaresProblem`].
//!
//! ## Features
//! - `parallelism`, on by default, fits batches with [`fit_batch`] on the
//!   `rayon` thread pool.
//! - `serde` makes the models and configuration serializable.

#[cfg(test)]
macro_rules! assert_is_close {
    ($t1:expr, $t2:expr, $tol:expr, $label:literal) => {
        assert!(
            ($t1 - $t2).abs() < $tol,
            "Observed {} {}, expected {}, difference {}",
            $label,
            $t1,
            $t2,
            $t1 - $t2,
        );
    };
    ($t1:expr, $t2:expr, $tol:expr, $label:literal, $obj:ident) => {
        assert!(
            ($t1 - $t2).abs() < $tol,
            "Observed {} {}, expected {}, difference {} from {:?}",
            $label,
            $t1,
            $t2,
            $t1 - $t2,
            $obj
        );
    };
}

pub mod arrayops;
pub mod data;
pub mod fitter;
pub mod model;
pub mod optimize;
pub mod peak_statistics;
pub mod statistics;

pub use crate::arrayops::{gridspace, trapz};
pub use crate::data::{RawDataArray, Sample};
pub use crate::fitter::{
    fit_batch, FitFailure, FitResult, FitStatus, Fitter1D, FitterConfig, FitterConfigBuilder,
    FitterError, FAILED_QUALITY,
};
pub use crate::model::{
    InterpolationModel, ModelError, ParametricShape, PeakShape, PeakShapeModel,
};
pub use crate::optimize::{LeastSquaresProblem, LevenbergMarquardt, OptimizerError};
