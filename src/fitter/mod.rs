//! One dimensional peak shape fitters.
//!
//! A [`Fitter1D`] turns a short run of [`RawDataArray`] samples into an
//! [`InterpolationModel`] and a quality score, the Pearson correlation between
//! the model and the observed intensities. There are two families:
//!
//! - Maximum likelihood fitters ([`Fitter1D::Gauss`], [`Fitter1D::Isotope`])
//!   estimate the shape from the intensity weighted moments of the signal and
//!   then search for the offset that best aligns it with the data.
//! - Least squares fitters refine a seeded shape with
//!   [`LevenbergMarquardt`](crate::optimize::LevenbergMarquardt)
//!   using the shape's analytic gradient.
//!
//! Problems with the signal itself never produce an `Err`. They are reported as a
//! [`FitResult`] with a failed [`FitStatus`] and the sentinel quality
//! [`FAILED_QUALITY`], so a batch of fits can be screened on quality alone. Only
//! misuse, like an invalid [`FitterConfig`] or empty input, is an error.
//!
//! # Example
//!
//! ```rust
//! use mzfitter::{Fitter1D, FitterConfig, RawDataArray};
//!
//! let data = RawDataArray::from((
//!     vec![1.0, 2.0, 3.0, 4.0, 5.0],
//!     vec![10.0, 40.0, 90.0, 40.0, 10.0],
//! ));
//! let fitter = Fitter1D::from_name("GaussFitter1D").unwrap();
//! let result = fitter.fit1d(&data, &FitterConfig::default()).unwrap();
//! assert!(result.quality > 0.9);
//! assert!((result.model.center() - 3.0).abs() < 0.2);
//! ```
use std::fmt::Display;

use cfg_if::cfg_if;
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::data::RawDataArray;
use crate::model::{InterpolationModel, ModelError};
use crate::optimize::OptimizerError;

mod asymmetric;
mod config;
mod gauss;
mod isotope;
mod levmarq;
mod offset;

pub use config::{FitterConfig, FitterConfigBuilder, DEFAULT_ISOTOPE_STDEVS};
pub use levmarq::{refine_shape, ShapeProblem};
pub use offset::{correlation_quality, fit_offset};

/// The quality reported for a fit that could not be meaningfully scored
pub const FAILED_QUALITY: f64 = -1.0;

/// Errors from misusing a fitter. Noisy or degenerate signal is reported through
/// [`FitStatus::Failed`] instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitterError {
    #[error("Invalid fitter parameter: {0}")]
    InvalidParameter(String),
    #[error("{0:?} is not a known fitter")]
    UnknownFitter(String),
    #[error("Cannot fit a model to an empty signal")]
    EmptyInput,
    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),
    #[error("Optimization failed: {0}")]
    Optimizer(#[from] OptimizerError),
}

/// Why a fit failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitFailure {
    #[error("{0}")]
    Optimizer(OptimizerError),
    #[error("The correlation between the model and the signal is undefined")]
    UndefinedCorrelation,
    #[error("The fitted parameters left the region covered by the signal")]
    Diverged,
}

/// How a [`FitResult`] was reached
#[derive(Debug, Clone, PartialEq)]
pub enum FitStatus {
    /// Estimated in closed form
    Fitted,
    /// The optimizer met its convergence criteria
    Converged,
    /// The optimizer ran out of iterations, the best parameters seen were kept
    MaxIterations,
    Failed(FitFailure),
}

impl FitStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fitted => write!(f, "fitted"),
            Self::Converged => write!(f, "converged"),
            Self::MaxIterations => write!(f, "max iterations"),
            Self::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

/// The outcome of [`Fitter1D::fit1d`]
#[derive(Debug, Clone)]
pub struct FitResult {
    pub model: InterpolationModel,
    /// The Pearson correlation of the model with the signal, or [`FAILED_QUALITY`]
    pub quality: f64,
    pub status: FitStatus,
    /// The number of optimizer iterations, zero for closed form fits
    pub iterations: usize,
}

impl FitResult {
    pub fn new(model: InterpolationModel, quality: f64, status: FitStatus, iterations: usize) -> Self {
        Self {
            model,
            quality,
            status,
            iterations,
        }
    }

    /// A failed fit carrying the model the fit started from
    pub fn failed(model: InterpolationModel, failure: FitFailure, iterations: usize) -> Self {
        log::debug!("Fit failed: {failure}");
        Self::new(model, FAILED_QUALITY, FitStatus::Failed(failure), iterations)
    }

    pub fn is_success(&self) -> bool {
        !self.status.is_failed()
    }
}

/// The closed set of one dimensional fitters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fitter1D {
    /// Gaussian by maximum likelihood with an offset search
    Gauss,
    /// Gaussian by least squares
    LmaGauss,
    /// Gaussian with separate left and right widths, by least squares
    BiGauss,
    /// Exponentially modified Gaussian tailing to the right, by least squares
    Emg,
    /// Exponentially modified Gaussian fronting to the left, by least squares
    EmgMz,
    /// Siano-Metzler log-normal, by least squares
    LogNormal,
    /// Averagine isotope envelope by maximum likelihood with an offset search
    Isotope,
    /// Averagine isotope envelope by least squares
    LmaIsotope,
}

const PRODUCT_SUFFIX: &str = "Fitter1D";

impl Fitter1D {
    pub const fn all() -> [Fitter1D; 8] {
        [
            Self::Gauss,
            Self::LmaGauss,
            Self::BiGauss,
            Self::Emg,
            Self::EmgMz,
            Self::LogNormal,
            Self::Isotope,
            Self::LmaIsotope,
        ]
    }

    pub const fn product_name(&self) -> &'static str {
        match self {
            Self::Gauss => "GaussFitter1D",
            Self::LmaGauss => "LmaGaussFitter1D",
            Self::BiGauss => "BiGaussFitter1D",
            Self::Emg => "EmgFitter1D",
            Self::EmgMz => "EmgMzFitter1D",
            Self::LogNormal => "LogNormalFitter1D",
            Self::Isotope => "IsotopeFitter1D",
            Self::LmaIsotope => "LmaIsotopeFitter1D",
        }
    }

    /// Look up a fitter by its product name, with or without the `Fitter1D` suffix
    pub fn from_name(name: &str) -> Result<Self, FitterError> {
        Self::all()
            .into_iter()
            .find(|fitter| {
                let product = fitter.product_name();
                product == name || product.strip_suffix(PRODUCT_SUFFIX) == Some(name)
            })
            .ok_or_else(|| FitterError::UnknownFitter(name.to_string()))
    }

    /// Whether this fitter is refined by least squares
    pub const fn is_least_squares(&self) -> bool {
        !matches!(self, Self::Gauss | Self::Isotope)
    }

    /// Fit this fitter's model to `data`.
    ///
    /// Negative intensities are treated as zero. Returns an error only when `data`
    /// is empty or the configuration is unusable. Signal that cannot be fit gives a
    /// failed [`FitResult`].
    pub fn fit1d(&self, data: &RawDataArray, config: &FitterConfig) -> Result<FitResult, FitterError> {
        if data.is_empty() {
            return Err(FitterError::EmptyInput);
        }
        let data = data.clamp_negative();
        let result = match self {
            Self::Gauss => gauss::fit_gauss(&data, config),
            Self::LmaGauss => gauss::fit_lma_gauss(&data, config),
            Self::BiGauss => asymmetric::fit_bigauss(&data, config),
            Self::Emg => asymmetric::fit_emg(&data, config),
            Self::EmgMz => asymmetric::fit_emg_mz(&data, config),
            Self::LogNormal => asymmetric::fit_lognormal(&data, config),
            Self::Isotope => isotope::fit_isotope(&data, config),
            Self::LmaIsotope => isotope::fit_lma_isotope(&data, config),
        }?;
        log::debug!(
            "{} fit {} samples with quality {:0.4} ({})",
            self.product_name(),
            data.len(),
            result.quality,
            result.status
        );
        Ok(result)
    }
}

impl Display for Fitter1D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.product_name())
    }
}

impl std::str::FromStr for Fitter1D {
    type Err = FitterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Fit every signal in `inputs` independently, returning results in input order.
///
/// With the `parallelism` feature the fits are spread over the `rayon` thread pool.
pub fn fit_batch(
    fitter: Fitter1D,
    config: &FitterConfig,
    inputs: &[RawDataArray],
) -> Vec<Result<FitResult, FitterError>> {
    cfg_if! {
        if #[cfg(feature = "parallelism")] {
            inputs.par_iter().map(|data| fitter.fit1d(data, config)).collect()
        } else {
            inputs.iter().map(|data| fitter.fit1d(data, config)).collect()
        }
    }
}

/// Sample counts above this are treated as a runaway bounding box
pub(crate) const MAX_GRID_POINTS: f64 = 4_000_000.0;

/// Replace a width estimate that cannot describe a peak with `fallback`
pub(crate) fn sanitize_width(width: f64, fallback: f64) -> f64 {
    if width > 0.0 && width.is_finite() {
        width
    } else {
        fallback
    }
}

/// Extend `[lo, hi]` so it holds at least one grid step
pub(crate) fn ensure_box(lo: f64, hi: f64, step: f64) -> (f64, f64) {
    if hi - lo < step {
        (lo, lo + step)
    } else {
        (lo, hi)
    }
}

/// Grid points of the stand-in model for a seed too wide to sample at the configured step
const OVERSIZED_GRID_POINTS: f64 = 1000.0;

/// A seed shape sampled over the bounding box derived from the data
pub(crate) enum SeedModel {
    Sampled(InterpolationModel),
    /// The box needs more than [`MAX_GRID_POINTS`] samples at the configured step,
    /// so it was sampled on a coarse grid instead and cannot be fit
    Oversized(InterpolationModel),
}

impl SeedModel {
    /// The sampled model, or the failed result to report for an oversized seed
    pub(crate) fn or_diverged(self) -> Result<InterpolationModel, FitResult> {
        match self {
            Self::Sampled(model) => Ok(model),
            Self::Oversized(model) => Err(FitResult::failed(model, FitFailure::Diverged, 0)),
        }
    }
}

/// Sample a model of a seed shape estimated from the data. A bounding box too wide
/// for the grid step is a property of the data, not of the configuration.
pub(crate) fn seed_model(
    shape: crate::model::PeakShape,
    bounding_box: (f64, f64),
    step: f64,
) -> Result<SeedModel, FitterError> {
    let width = bounding_box.1 - bounding_box.0;
    if width / step <= MAX_GRID_POINTS {
        return Ok(SeedModel::Sampled(InterpolationModel::new(
            shape,
            bounding_box,
            step,
        )?));
    }
    log::debug!(
        "A bounding box of ({}, {}) is too wide to sample every {step}",
        bounding_box.0,
        bounding_box.1
    );
    let coarse_step = width / OVERSIZED_GRID_POINTS;
    Ok(SeedModel::Oversized(InterpolationModel::new(
        shape,
        bounding_box,
        coarse_step,
    )?))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data::Sample;

    #[test]
    fn test_registry_names() {
        for fitter in Fitter1D::all() {
            let name = fitter.product_name();
            assert_eq!(Fitter1D::from_name(name).unwrap(), fitter);
            let short = name.strip_suffix("Fitter1D").unwrap();
            assert_eq!(Fitter1D::from_name(short).unwrap(), fitter);
            assert_eq!(name.parse::<Fitter1D>().unwrap(), fitter);
            assert_eq!(fitter.to_string(), name);
        }
        assert_eq!(Fitter1D::from_name("EmgFitter1D").unwrap(), Fitter1D::Emg);
        assert!(matches!(
            Fitter1D::from_name("gaussfitter1d"),
            Err(FitterError::UnknownFitter(_))
        ));
        assert!(Fitter1D::from_name("").is_err());
        assert!(!Fitter1D::Gauss.is_least_squares());
        assert!(Fitter1D::Emg.is_least_squares());
    }

    #[test]
    fn test_empty_input() {
        let data = RawDataArray::from((Vec::<f64>::new(), Vec::<f64>::new()));
        for fitter in Fitter1D::all() {
            assert!(matches!(
                fitter.fit1d(&data, &FitterConfig::default()),
                Err(FitterError::EmptyInput)
            ));
        }
    }

    #[test_log::test]
    fn test_single_sample_every_fitter() {
        let data = RawDataArray::from(vec![Sample::new(500.2, 1000.0)]);
        let config = FitterConfig::default();
        for fitter in Fitter1D::all() {
            let result = fitter.fit1d(&data, &config).unwrap();
            assert_eq!(result.quality, FAILED_QUALITY, "{fitter}");
            assert!(result.status.is_failed(), "{fitter}");
            assert!(result.model.shape().is_finite(), "{fitter}");
            assert!(result.model.intensity(500.2).is_finite(), "{fitter}");
            let (lo, hi) = result.model.bounding_box();
            assert!(lo < hi, "{fitter}");
        }
    }

    #[test_log::test]
    fn test_distant_sample_fails_softly() {
        let data = RawDataArray::from((vec![0.0, 1.0, 2.0, 500000.0], vec![1.0, 5.0, 1.0, 1.0]));
        let config = FitterConfig::default();
        for fitter in Fitter1D::all() {
            let result = fitter.fit1d(&data, &config).unwrap();
            assert_eq!(result.quality, FAILED_QUALITY, "{fitter}");
            assert_eq!(result.status, FitStatus::Failed(FitFailure::Diverged), "{fitter}");
            assert!(result.model.shape().is_finite(), "{fitter}");
            assert!(result.model.intensity(1.0).is_finite(), "{fitter}");
            assert!(result.model.interpolation().len() <= 1001, "{fitter}");
        }
    }

    #[test]
    fn test_oversized_seed_is_coarse() {
        let shape = crate::model::GaussianShape::new(0.0, 1.0, 1.0).into();
        let seeded = seed_model(shape, (-1e6, 1e6), 0.1).unwrap();
        let SeedModel::Oversized(model) = seeded else {
            panic!("Expected an oversized seed");
        };
        assert_eq!(model.bounding_box(), (-1e6, 1e6));
        let failed = SeedModel::Oversized(model).or_diverged().unwrap_err();
        assert_eq!(failed.status, FitStatus::Failed(FitFailure::Diverged));

        let shape = crate::model::GaussianShape::new(0.0, 1.0, 1.0).into();
        assert!(matches!(
            seed_model(shape, (-5.0, 5.0), 0.1).unwrap(),
            SeedModel::Sampled(_)
        ));
    }

    #[test_log::test]
    fn test_constant_signal_is_undefined() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let ys = vec![5.0; xs.len()];
        let data = RawDataArray::from((xs, ys));
        for fitter in [Fitter1D::Gauss, Fitter1D::Isotope] {
            let result = fitter.fit1d(&data, &FitterConfig::default()).unwrap();
            assert_eq!(result.quality, FAILED_QUALITY, "{fitter}");
            assert_eq!(
                result.status,
                FitStatus::Failed(FitFailure::UndefinedCorrelation),
                "{fitter}"
            );
        }
    }

    #[test_log::test]
    fn test_quality_bounds() {
        let xs: Vec<f64> = (0..60).map(|i| 20.0 + i as f64 * 0.2).collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|x| 50.0 * (-0.5 * (x - 25.0f64).powi(2) / 1.5).exp() + (x * 7.3).sin().abs())
            .collect();
        let data = RawDataArray::from((xs, ys));
        let config = FitterConfig::default();
        for fitter in Fitter1D::all() {
            let result = fitter.fit1d(&data, &config).unwrap();
            let q = result.quality;
            assert!(!q.is_nan(), "{fitter}");
            assert!((-1.0..=1.0).contains(&q), "{fitter} {q}");
            let x = 25.0;
            assert_eq!(result.model.intensity(x), result.model.intensity(x));
        }
    }

    #[test_log::test]
    fn test_batch_preserves_order() {
        let inputs: Vec<RawDataArray> = [3.0, 5.0, 7.0, 9.0]
            .iter()
            .map(|mean: &f64| {
                let xs: Vec<f64> = (0..101).map(|i| i as f64 * 0.12).collect();
                let ys = xs
                    .iter()
                    .map(|x| 100.0 * (-0.5 * (x - mean).powi(2) / 0.49).exp())
                    .collect();
                RawDataArray::from((xs, ys))
            })
            .collect();
        let config = FitterConfig::builder().interpolation_step(0.02).build().unwrap();
        let results = fit_batch(Fitter1D::Gauss, &config, &inputs);
        assert_eq!(results.len(), 4);
        for (result, mean) in results.iter().zip([3.0, 5.0, 7.0, 9.0]) {
            let result = result.as_ref().unwrap();
            assert_is_close!(result.model.center(), mean, 0.05, "center");
            assert!(result.quality > 0.99);
        }
    }

    #[test]
    fn test_box_helpers() {
        assert_eq!(ensure_box(1.0, 1.0, 0.1), (1.0, 1.1));
        assert_eq!(ensure_box(1.0, 3.0, 0.1), (1.0, 3.0));
        assert_eq!(sanitize_width(f64::NAN, 0.1), 0.1);
        assert_eq!(sanitize_width(-2.0, 0.1), 0.1);
        assert_eq!(sanitize_width(0.5, 0.1), 0.5);
    }
}
