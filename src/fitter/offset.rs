//! Scoring a model against the signal and aligning it by translation.
use crate::data::RawDataArray;
use crate::model::{InterpolationModel, PeakShapeModel};
use crate::statistics::pearson_correlation;

use super::FAILED_QUALITY;

/// Normalize an undefined correlation to [`FAILED_QUALITY`]
#[inline]
fn defined_or_failed(r: f64) -> f64 {
    if r.is_nan() {
        FAILED_QUALITY
    } else {
        r
    }
}

/// The Pearson correlation of `model` with the intensities of `data` at its
/// positions, or [`FAILED_QUALITY`] when it is undefined
pub fn correlation_quality(model: &InterpolationModel, data: &RawDataArray) -> f64 {
    let predicted = model.predict(&data.position);
    defined_or_failed(pearson_correlation(&predicted, &data.intensity[..]))
}

fn correlation_at_offset(model: &InterpolationModel, data: &RawDataArray, offset: f64) -> f64 {
    let interpolation = model.interpolation();
    let predicted: Vec<f64> = data
        .position
        .iter()
        .map(|x| interpolation.value_with_offset(*x, offset))
        .collect();
    defined_or_failed(pearson_correlation(&predicted, &data.intensity[..]))
}

/// Translate `model` to the offset in `[native - stdev1, native + stdev2]` that
/// maximizes its correlation with `data`, stepping by `offset_step`, where
/// `native` is the start of the model's support when it was sampled.
///
/// The model's current offset is always a candidate, so the result is never
/// worse than the correlation before the search. The model is only moved once
/// the best candidate is known. Returns the best correlation, or
/// [`FAILED_QUALITY`] if no candidate has a defined correlation.
pub fn fit_offset(
    model: &mut InterpolationModel,
    data: &RawDataArray,
    stdev1: f64,
    stdev2: f64,
    offset_step: f64,
) -> f64 {
    let mut best_offset = model.offset();
    let mut best_quality = correlation_at_offset(model, data, best_offset);
    log::trace!("Baseline offset {best_offset:0.4}: {best_quality:0.5}");

    let start = model.native_offset() - stdev1.abs();
    let end = model.native_offset() + stdev2.abs();
    if offset_step > 0.0 && offset_step.is_finite() && start.is_finite() && end.is_finite() {
        let steps = ((end - start) / offset_step + 1e-9).floor() as usize;
        for i in 0..=steps {
            let offset = start + i as f64 * offset_step;
            let quality = correlation_at_offset(model, data, offset);
            log::trace!("Offset {offset:0.4}: {quality:0.5}");
            if quality > best_quality {
                best_quality = quality;
                best_offset = offset;
            }
        }
    }

    model.set_offset(best_offset);
    best_quality
}

/// The bounding box that covers both the data and the shape's support out to
/// `k` of its spreads on either side
pub(crate) fn shape_bounding_box<S: PeakShapeModel>(
    shape: &S,
    data: &RawDataArray,
    k: f64,
    step: f64,
) -> (f64, f64) {
    let center = shape.center();
    let (left_reach, right_reach) = shape.reach();
    let (left_spread, right_spread) = shape.spread();
    let lo = data.first_position().min(center - left_reach) - k * left_spread;
    let hi = data.last_position().max(center + right_reach) + k * right_spread;
    super::ensure_box(lo, hi, step)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::GaussianShape;

    fn signal() -> RawDataArray<'static> {
        let xs: Vec<f64> = (0..81).map(|i| 2.0 + i as f64 * 0.1).collect();
        let ys = xs
            .iter()
            .map(|x| 40.0 * (-0.5 * (x - 6.3f64).powi(2) / 0.36).exp())
            .collect();
        RawDataArray::from((xs, ys))
    }

    #[test_log::test]
    fn test_offset_recovers_shift() {
        let data = signal();
        // Sampled half a unit left of the signal's apex
        let shape = GaussianShape::new(5.8, 0.6, 1.0);
        let mut model = InterpolationModel::new(shape.into(), (4.0, 7.6), 0.01).unwrap();
        let before = correlation_quality(&model, &data);
        let after = fit_offset(&mut model, &data, 1.0, 1.0, 0.01);
        assert!(after >= before);
        assert!(after > 0.999, "{after}");
        assert_is_close!(model.center(), 6.3, 0.011, "center");
        assert_is_close!(correlation_quality(&model, &data), after, 1e-9, "quality");
    }

    #[rstest::rstest]
    #[case(0.0, 0.0)]
    #[case(0.05, 0.05)]
    #[case(0.3, 0.0)]
    #[case(0.0, 2.0)]
    fn test_offset_never_regresses(#[case] stdev1: f64, #[case] stdev2: f64) {
        let data = signal();
        for shift in [-0.8, -0.2, 0.0, 0.4] {
            let shape = GaussianShape::new(6.3 + shift, 0.6, 1.0);
            let mut model =
                InterpolationModel::new(shape.into(), (3.0 + shift, 9.6 + shift), 0.05).unwrap();
            let baseline = correlation_quality(&model, &data);
            let quality = fit_offset(&mut model, &data, stdev1, stdev2, 0.05);
            assert!(quality >= baseline, "{quality} < {baseline} at {shift}");
        }
    }

    #[test]
    fn test_undefined_correlation_is_sentinel() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let data = RawDataArray::from((xs, vec![3.0; 10]));
        let mut model =
            InterpolationModel::new(GaussianShape::new(4.5, 1.0, 1.0).into(), (0.0, 9.0), 0.1)
                .unwrap();
        assert_eq!(correlation_quality(&model, &data), FAILED_QUALITY);
        assert_eq!(fit_offset(&mut model, &data, 1.0, 1.0, 0.1), FAILED_QUALITY);
        assert_eq!(model.offset(), 0.0);
    }

    #[test]
    fn test_shape_bounding_box() {
        let data = signal();
        let shape = GaussianShape::new(6.3, 0.6, 1.0);
        let (lo, hi) = shape_bounding_box(&shape, &data, 3.0, 0.1);
        assert_is_close!(lo, 2.0 - 1.8, 1e-9, "lo");
        assert_is_close!(hi, 10.0 + 1.8, 1e-9, "hi");
    }
}
