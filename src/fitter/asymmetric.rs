//! Seeding for the least squares fitters of asymmetric peak shapes. Each seed
//! is refined by [`fit_parametric`].
use std::f64::consts::PI;

use crate::data::RawDataArray;
use crate::model::{BiGaussianShape, EmgMzShape, EmgShape, LogNormalShape};
use crate::peak_statistics::{full_width_at_half_max, FWHM_TO_SIGMA};
use crate::statistics::{weighted_median_index, AsymmetricStatistics};

use super::levmarq::fit_parametric;
use super::{sanitize_width, FitResult, FitterConfig, FitterError};

/// The symmetry used when the signal is one sided
const ONE_SIDED_SYMMETRY: f64 = 10.0;

/// Added to symmetry estimates below 1 so the exponential starts out dominant
const SYMMETRY_BOOST: f64 = 5.0;

/// Log-normal symmetry seeds closer than this to 1 are pushed away from the
/// symmetric singularity
const MIN_LOGNORMAL_ASYMMETRY: f64 = 0.05;

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// The smallest sensible width: the sample spacing, or the grid step if there
/// is only one sample
fn minimum_width(data: &RawDataArray, config: &FitterConfig) -> f64 {
    sanitize_width(data.average_spacing(), config.interpolation_step())
}

pub(crate) fn fit_bigauss(
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<FitResult, FitterError> {
    let median = weighted_median_index(&data.intensity);
    let stats = AsymmetricStatistics::from_data(data);
    let fallback = sanitize_width(stats.basic.stdev(), config.interpolation_step());
    let sigma_left = sanitize_width(
        config.stdev1().unwrap_or_else(|| stats.variance1.sqrt()),
        fallback,
    );
    let sigma_right = sanitize_width(
        config.stdev2().unwrap_or_else(|| stats.variance2.sqrt()),
        fallback,
    );
    let height = finite_or(data.intensity[median], 1.0);
    let mean = config.mean().unwrap_or(data.position[median]);
    log::trace!("BiGaussian seed {mean:0.4} ({sigma_left:0.4}, {sigma_right:0.4}) x {height:0.3}");
    fit_parametric(
        BiGaussianShape::new(mean, sigma_left, sigma_right, height),
        data,
        config,
        config.interpolation_step(),
    )
}

/// The ratio of the signal's extent right of `position` to its extent left of it,
/// with the adjustments used to seed [`EmgShape`]
fn emg_symmetry(data: &RawDataArray, position: f64) -> f64 {
    let right = (data.last_position() - position).abs();
    let left = (position - data.first_position()).abs();
    let mut symmetry = right / left;
    if !symmetry.is_finite() {
        log::trace!("One sided signal at {position}, seeding as symmetric");
        symmetry = ONE_SIDED_SYMMETRY;
    }
    if symmetry < 1.0 {
        symmetry += SYMMETRY_BOOST;
    }
    symmetry
}

pub(crate) fn fit_emg(data: &RawDataArray, config: &FitterConfig) -> Result<FitResult, FitterError> {
    let median = weighted_median_index(&data.intensity);
    let retention = config.mean().unwrap_or(data.position[median]);
    let height = finite_or(data.intensity[median], 1.0);
    // The symmetry ratio is unitless, bound it by the signal's extent
    let symmetry = emg_symmetry(data, data.position[median]);
    let upper = data.duration().max(config.interpolation_step());
    let lower = minimum_width(data, config);
    let symmetry = symmetry.min(upper).max(lower);
    let width = symmetry.min(upper / 2.0).max(lower);
    log::trace!("EMG seed {retention:0.4}: w = {width:0.4}, s = {symmetry:0.4} x {height:0.3}");
    fit_parametric(
        EmgShape::new(height, width, symmetry, retention),
        data,
        config,
        config.interpolation_step(),
    )
}

pub(crate) fn fit_emg_mz(
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<FitResult, FitterError> {
    let apex = data.argmax();
    let widths = full_width_at_half_max(&data.position, &data.intensity, apex);
    let width = sanitize_width(
        widths.full_width_at_half_max / FWHM_TO_SIGMA,
        minimum_width(data, config),
    );
    // The tail is on the left, so a wider left side means a longer time constant
    let ratio = finite_or(widths.left_width / widths.right_width, 1.0);
    let symmetry = width * ratio.max(0.2);
    let area = data.integrate();
    let height = if area > 0.0 {
        area / (width * (2.0 * PI).sqrt())
    } else {
        finite_or(data.intensity[apex], 1.0)
    };
    let retention = config.mean().unwrap_or(data.position[apex]);
    log::trace!("EMG m/z seed {retention:0.4}: w = {width:0.4}, s = {symmetry:0.4} x {height:0.3}");
    fit_parametric(
        EmgMzShape::new(height, width, symmetry, retention),
        data,
        config,
        config.interpolation_step(),
    )
}

pub(crate) fn fit_lognormal(
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<FitResult, FitterError> {
    let apex = data.argmax();
    let r = config.lognormal_r();
    let widths = full_width_at_half_max(&data.position, &data.intensity, apex);
    // Widths are measured at half height, rescale to 1/r of the height
    let width = sanitize_width(
        widths.full_width_at_half_max * (r.ln() / 2f64.ln()).sqrt(),
        2.0 * minimum_width(data, config),
    );
    let mut symmetry = widths.asymmetry();
    if symmetry.is_nan() || (symmetry - 1.0).abs() < MIN_LOGNORMAL_ASYMMETRY {
        symmetry = 1.0 + MIN_LOGNORMAL_ASYMMETRY;
    }
    let symmetry = symmetry.clamp(0.1, 10.0);
    let height = finite_or(data.intensity[apex], 1.0);
    let retention = config.mean().unwrap_or(data.position[apex]);
    log::trace!("Log-normal seed {retention:0.4}: w = {width:0.4}, s = {symmetry:0.4} x {height:0.3}");
    fit_parametric(
        LogNormalShape::new(height, width, symmetry, retention, r),
        data,
        config,
        config.interpolation_step(),
    )
}
