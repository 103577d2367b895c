use crate::data::RawDataArray;
use crate::model::GaussianShape;
use crate::statistics::{weighted_median_index, BasicStatistics};

use super::levmarq::fit_parametric;
use super::offset::{fit_offset, shape_bounding_box};
use super::{
    sanitize_width, seed_model, FitFailure, FitResult, FitStatus, FitterConfig, FitterError,
    FAILED_QUALITY,
};

/// The location and spread of the signal, preferring configured values
fn location_and_spread(data: &RawDataArray, config: &FitterConfig) -> (f64, f64) {
    let stats = BasicStatistics::from_data(data);
    let mean = config.mean().unwrap_or(stats.mean);
    let stdev = config.stdev().unwrap_or_else(|| stats.stdev());
    (mean, sanitize_width(stdev, config.interpolation_step()))
}

/// Maximum likelihood Gaussian: the weighted moments give the shape, the offset
/// search aligns it and a least squares scale puts it in data units.
pub(crate) fn fit_gauss(data: &RawDataArray, config: &FitterConfig) -> Result<FitResult, FitterError> {
    let (mean, stdev) = location_and_spread(data, config);
    let shape = GaussianShape::new(mean, stdev, 1.0);
    let k = config.tolerance_stdev_bounding_box();
    let step = config.interpolation_step();
    let bounding_box = shape_bounding_box(&shape, data, k, step);
    let mut model = match seed_model(shape.into(), bounding_box, step)?.or_diverged() {
        Ok(model) => model,
        Err(failed) => return Ok(failed),
    };

    let search = k * stdev;
    let quality = fit_offset(&mut model, data, search, search, config.offset_step());
    model.fit_scaling(&data.position, &data.intensity);
    log::trace!(
        "Gaussian mean {mean:0.4} moved to {:0.4} with sigma {stdev:0.4}",
        model.center()
    );
    if quality <= FAILED_QUALITY {
        return Ok(FitResult::failed(model, FitFailure::UndefinedCorrelation, 0));
    }
    Ok(FitResult::new(model, quality, FitStatus::Fitted, 0))
}

/// Least squares Gaussian seeded at the weighted median
pub(crate) fn fit_lma_gauss(
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<FitResult, FitterError> {
    let median = weighted_median_index(&data.intensity);
    let (_, stdev) = location_and_spread(data, config);
    let height = data.intensity[median];
    let height = if height.is_finite() { height } else { 1.0 };
    let mean = config.mean().unwrap_or(data.position[median]);
    let seed = GaussianShape::new(mean, stdev, height);
    fit_parametric(seed, data, config, config.interpolation_step())
}
