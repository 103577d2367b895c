//! Isotope envelope fitters.
//!
//! The envelope's relative peak heights come from the averagine model for the
//! candidate charge, so only the monoisotopic position, the width of each peak
//! and the overall scale are free. Every candidate charge and peak width is
//! tried and the best correlated fit is kept.
use crate::data::RawDataArray;
use crate::model::{InterpolationModel, IsotopeShape, PeakShape, PeakShapeModel};
use crate::statistics::BasicStatistics;

use super::levmarq::fit_parametric;
use super::offset::fit_offset;
use super::{
    ensure_box, sanitize_width, seed_model, FitFailure, FitResult, FitStatus, FitterConfig,
    FitterError, SeedModel, FAILED_QUALITY,
};

/// The number of grid points per isotope standard deviation, at least
const GRID_POINTS_PER_STDEV: f64 = 4.0;

/// The grid step fine enough to resolve peaks of width `isotope_stdev`
fn envelope_step(step: f64, isotope_stdev: f64) -> f64 {
    step.min(isotope_stdev / GRID_POINTS_PER_STDEV)
}

/// Where the envelope search starts and how far it may move
struct EnvelopeSeed {
    monoisotopic: f64,
    data_stdev: f64,
}

impl EnvelopeSeed {
    fn from_data(data: &RawDataArray, config: &FitterConfig) -> Self {
        let stats = BasicStatistics::from_data(data);
        let monoisotopic = config.mean().unwrap_or(stats.mean);
        let data_stdev = sanitize_width(
            config.stdev().unwrap_or_else(|| stats.stdev()),
            config.interpolation_step(),
        );
        Self {
            monoisotopic,
            data_stdev,
        }
    }
}

/// A maximum likelihood envelope for one charge and peak width
struct EnvelopeFit {
    model: InterpolationModel,
    quality: f64,
    /// The envelope's box was too wide to sample at the grid step
    oversized: bool,
}

impl EnvelopeFit {
    fn into_result(self) -> FitResult {
        if self.oversized {
            FitResult::failed(self.model, FitFailure::Diverged, 0)
        } else if self.quality <= FAILED_QUALITY {
            FitResult::failed(self.model, FitFailure::UndefinedCorrelation, 0)
        } else {
            FitResult::new(self.model, self.quality, FitStatus::Fitted, 0)
        }
    }
}

fn fit_envelope(
    data: &RawDataArray,
    config: &FitterConfig,
    seed: &EnvelopeSeed,
    charge: i32,
    isotope_stdev: f64,
) -> Result<EnvelopeFit, FitterError> {
    let shape = IsotopeShape::from_averagine(
        seed.monoisotopic,
        charge,
        isotope_stdev,
        config.isotope_distance(),
        config.isotope_maximum(),
        config.isotope_trim_right_cutoff(),
    );
    let step = envelope_step(config.interpolation_step(), isotope_stdev);
    let offset_step = envelope_step(config.offset_step(), isotope_stdev);

    let margin = config.tolerance_stdev_bounding_box() * seed.data_stdev;
    let (_, reach) = shape.reach();
    let (lo, hi) = ensure_box(
        data.first_position().min(seed.monoisotopic) - margin,
        data.last_position().max(seed.monoisotopic + reach) + margin,
        step,
    );
    let mut model = match seed_model(shape.into(), (lo, hi), step)? {
        SeedModel::Sampled(model) => model,
        SeedModel::Oversized(model) => {
            return Ok(EnvelopeFit {
                model,
                quality: FAILED_QUALITY,
                oversized: true,
            })
        }
    };
    let quality = fit_offset(&mut model, data, margin, margin, offset_step);
    model.fit_scaling(&data.position, &data.intensity);
    log::trace!(
        "Charge {charge} with isotope sigma {isotope_stdev}: monoisotopic {:0.4}, quality {quality:0.4}",
        model.center()
    );
    Ok(EnvelopeFit {
        model,
        quality,
        oversized: false,
    })
}

/// The best envelope over every configured charge and peak width. Ties keep the
/// lower charge and the narrower peaks.
fn best_envelope(data: &RawDataArray, config: &FitterConfig) -> Result<EnvelopeFit, FitterError> {
    let seed = EnvelopeSeed::from_data(data, config);
    let mut best: Option<EnvelopeFit> = None;
    for charge in config.charges() {
        for isotope_stdev in config.isotope_stdevs() {
            let fit = fit_envelope(data, config, &seed, charge, isotope_stdev)?;
            if best.as_ref().map_or(true, |b| fit.quality > b.quality) {
                best = Some(fit);
            }
        }
    }
    best.ok_or_else(|| {
        FitterError::InvalidParameter("no charge states or isotope widths to try".to_string())
    })
}

/// Maximum likelihood isotope envelope with an offset search, scanning charges
/// and peak widths.
pub(crate) fn fit_isotope(
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<FitResult, FitterError> {
    Ok(best_envelope(data, config)?.into_result())
}

/// Least squares isotope envelope. The charge is the one chosen by the maximum
/// likelihood scan, whose peak widths are fixed, and its envelope seeds a refinement
/// of the scale, peak width and monoisotopic position.
pub(crate) fn fit_lma_isotope(
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<FitResult, FitterError> {
    let envelope = best_envelope(data, config)?;
    if envelope.oversized {
        return Ok(envelope.into_result());
    }
    let PeakShape::Isotope(mut shape) = envelope.model.shape() else {
        return Ok(envelope.into_result());
    };
    shape.scale = envelope.model.scaling();
    log::trace!(
        "Refining the charge {} envelope with quality {:0.4}",
        shape.charge,
        envelope.quality
    );
    let step = envelope_step(config.interpolation_step(), shape.isotope_stdev);
    fit_parametric(shape, data, config, step)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arrayops::gridspace;
    use crate::Fitter1D;

    /// Four Gaussian peaks half a unit apart, a 2+ envelope
    fn charge_two_envelope() -> RawDataArray<'static> {
        let xs: Vec<f64> = gridspace(499.5, 502.0, 0.01);
        let peaks = [(500.0, 100.0), (500.5, 60.0), (501.0, 25.0), (501.5, 8.0)];
        let ys = xs
            .iter()
            .map(|x| {
                peaks
                    .iter()
                    .map(|(mu, h)| h * (-0.5 * (x - mu).powi(2) / 0.05f64.powi(2)).exp())
                    .sum()
            })
            .collect();
        RawDataArray::from((xs, ys))
    }

    fn fitted_envelope(result: &FitResult) -> IsotopeShape {
        match result.model.shape() {
            PeakShape::Isotope(shape) => shape,
            other => panic!("Expected an isotope envelope, got {other:?}"),
        }
    }

    /// Centroided 2+ envelope, one sample per isotope peak
    fn charge_two_centroids() -> RawDataArray<'static> {
        RawDataArray::from((
            vec![500.0, 500.5, 501.0, 501.5],
            vec![100.0, 60.0, 25.0, 8.0],
        ))
    }

    #[test]
    fn test_envelope_step() {
        assert_eq!(envelope_step(0.1, 0.04), 0.01);
        assert_eq!(envelope_step(0.005, 0.04), 0.005);
    }

    #[test_log::test]
    fn test_isotope_recovers_charge() {
        let data = charge_two_envelope();
        let config = FitterConfig::builder().interpolation_step(0.01).build().unwrap();
        let result = Fitter1D::Isotope.fit1d(&data, &config).unwrap();
        let shape = fitted_envelope(&result);
        assert_eq!(shape.charge, 2);
        assert!(result.quality > 0.8, "{}", result.quality);
        assert_is_close!(shape.monoisotopic, 500.0, 0.03, "monoisotopic");
        assert_eq!(result.status, FitStatus::Fitted);
    }

    #[test_log::test]
    fn test_isotope_fixed_charge() {
        let data = charge_two_envelope();
        let config = FitterConfig::builder()
            .interpolation_step(0.01)
            .charge(1)
            .isotope_stdev(0.05)
            .build()
            .unwrap();
        let result = Fitter1D::Isotope.fit1d(&data, &config).unwrap();
        let shape = fitted_envelope(&result);
        assert_eq!(shape.charge, 1);
        assert_eq!(shape.isotope_stdev, 0.05);
        let free = Fitter1D::Isotope
            .fit1d(&data, &FitterConfig::builder().interpolation_step(0.01).build().unwrap())
            .unwrap();
        assert!(free.quality > result.quality);
    }

    #[test_log::test]
    fn test_lma_isotope_recovers_charge() {
        let data = charge_two_envelope();
        let config = FitterConfig::builder().interpolation_step(0.01).build().unwrap();
        let result = Fitter1D::LmaIsotope.fit1d(&data, &config).unwrap();
        let shape = fitted_envelope(&result);
        assert_eq!(shape.charge, 2);
        assert!(!result.status.is_failed(), "{}", result.status);
        assert!(result.quality > 0.8, "{}", result.quality);
        assert_is_close!(shape.isotope_stdev, 0.05, 0.01, "isotope_stdev");
        assert_is_close!(shape.monoisotopic, 500.0, 0.02, "monoisotopic");
    }

    #[test_log::test]
    fn test_centroided_envelope_charge() {
        let data = charge_two_centroids();
        let config = FitterConfig::default();
        for fitter in [Fitter1D::Isotope, Fitter1D::LmaIsotope] {
            let result = fitter.fit1d(&data, &config).unwrap();
            let shape = fitted_envelope(&result);
            assert!(!result.status.is_failed(), "{fitter} {}", result.status);
            assert_eq!(shape.charge, 2, "{fitter}");
            assert!(result.quality > 0.8, "{fitter} {}", result.quality);
        }
    }

    #[test_log::test]
    fn test_lma_isotope_keeps_scanned_charge() {
        let data = charge_two_centroids();
        let config = FitterConfig::default();
        let scanned = Fitter1D::Isotope.fit1d(&data, &config).unwrap();
        let refined = Fitter1D::LmaIsotope.fit1d(&data, &config).unwrap();
        assert_eq!(
            fitted_envelope(&refined).charge,
            fitted_envelope(&scanned).charge
        );
    }
}
