//! Continuous peak shapes and their discretely sampled representation.
//!
//! A [`PeakShape`] is a closed-form function of position. Wrapping it in an
//! [`InterpolationModel`] samples it on a regular grid over a bounding box so it
//! can be cheaply evaluated anywhere, translated without resampling, and
//! compared against observed signal.
use thiserror::Error;

mod interpolation;
pub mod isotope_distribution;
mod shapes;

pub use interpolation::{InterpolationModel, LinearInterpolation};
pub use isotope_distribution::{Averagine, IsotopeDistribution, PROTON};
pub use shapes::{
    BiGaussianShape, EmgMzShape, EmgShape, GaussianShape, IsotopeShape, LogNormalShape,
    ParametricShape, PeakShape, PeakShapeModel,
};

/// Invalid arguments used to construct a shape or a model. These are usage
/// errors, not properties of the signal being fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("The bounding box minimum {min} must be less than its maximum {max}")]
    InvertedBoundingBox { min: f64, max: f64 },
    #[error("The interpolation step must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("The variance must be positive, got {0}")]
    NonPositiveVariance(f64),
    #[error("The charge state must be at least 1, got {0}")]
    InvalidCharge(i32),
    #[error("The shape parameter {name} has an invalid value {value}")]
    InvalidShapeParameter { name: &'static str, value: f64 },
}
