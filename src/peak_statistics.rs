//! Peak width estimates from the raw signal, used to seed the widths of
//! the asymmetric peak shapes before optimization.
use num_traits::{Float, FromPrimitive};

fn isclose_within<T>(x: T, y: T, rtol: T, atol: T) -> bool
where
    T: Float,
{
    (x - y).abs() <= (atol + rtol * y.abs())
}

fn isclose<T>(x: T, y: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose_within(x, y, T::from_f64(1e-5).unwrap(), T::from_f64(1e-8).unwrap())
}

fn aboutzero<T>(x: T) -> bool
where
    T: Float + FromPrimitive,
{
    isclose(x, T::zero())
}

/// Conversion between a full width at half max and a Gaussian standard deviation
pub const FWHM_TO_SIGMA: f64 = 2.3548200450309493;

#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct WidthFit {
    pub right_width: f64,
    pub left_width: f64,
    pub full_width_at_half_max: f64,
}

impl WidthFit {
    /// The ratio of the right half width to the left half width, `NaN` when either is missing
    pub fn asymmetry(&self) -> f64 {
        if self.left_width > 0.0 && self.right_width > 0.0 {
            self.right_width / self.left_width
        } else {
            f64::NAN
        }
    }
}

/// Linear interpolation of the position where the signal crosses `level`
/// between index `i` (above) and `j` (below)
fn interpolate_crossing<Y: Float>(positions: &[f64], intensity: &[Y], i: usize, j: usize, level: Y) -> f64 {
    let yi = intensity[i].to_f64().unwrap();
    let yj = intensity[j].to_f64().unwrap();
    let level = level.to_f64().unwrap();
    let (xi, xj) = (positions[i], positions[j]);
    if aboutzero(yi - yj) {
        return xj;
    }
    xi + (xj - xi) * (yi - level) / (yi - yj)
}

/// Find the position left of `data_index` where the signal falls below half of
/// the intensity at `data_index`.
///
/// If the signal starts rising again before crossing the half max, or never
/// crosses it, the last position visited is used.
pub fn fit_rising_side_width<Y: Float>(positions: &[f64], intensity: &[Y], data_index: usize) -> f64 {
    let peak = intensity[data_index];
    let peak_half = peak / Y::from(2.0).unwrap();
    let mut last = data_index;
    for index in (0..data_index).rev() {
        let y = intensity[index];
        if y < peak_half {
            return interpolate_crossing(positions, intensity, last, index, peak_half);
        }
        if y > intensity[last] {
            break;
        }
        last = index;
    }
    positions[last]
}

/// Find the position right of `data_index` where the signal falls below half of
/// the intensity at `data_index`.
///
/// See [`fit_rising_side_width`]
pub fn fit_falling_side_width<Y: Float>(positions: &[f64], intensity: &[Y], data_index: usize) -> f64 {
    let peak = intensity[data_index];
    let peak_half = peak / Y::from(2.0).unwrap();
    let mut last = data_index;
    for index in (data_index + 1)..positions.len() {
        let y = intensity[index];
        if y < peak_half {
            return interpolate_crossing(positions, intensity, last, index, peak_half);
        }
        if y > intensity[last] {
            break;
        }
        last = index;
    }
    positions[last]
}

/// Estimate the half widths and full width at half max of the peak with its
/// apex at `data_index`.
///
/// A side which never falls below the half max contributes no width, in which
/// case the full width is twice the other side. When neither side does the fit
/// is all zeros.
pub fn full_width_at_half_max<Y: Float>(positions: &[f64], intensity: &[Y], data_index: usize) -> WidthFit {
    let mut fit = WidthFit::default();
    if data_index >= positions.len() || intensity[data_index] <= Y::zero() {
        return fit;
    }
    let apex = positions[data_index];

    fit.left_width = (apex - fit_rising_side_width(positions, intensity, data_index)).abs();
    fit.right_width = (fit_falling_side_width(positions, intensity, data_index) - apex).abs();

    fit.full_width_at_half_max = match (aboutzero(fit.left_width), aboutzero(fit.right_width)) {
        (true, true) => 0.0,
        (true, false) => 2.0 * fit.right_width,
        (false, true) => 2.0 * fit.left_width,
        (false, false) => fit.left_width + fit.right_width,
    };
    fit
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_symmetric_width() {
        let x: Vec<f64> = (0..101).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|x| (-0.5 * (x - 5.0f64).powi(2) / 0.5f64.powi(2)).exp()).collect();
        let fit = full_width_at_half_max(&x, &y, 50);
        let expected = 0.5 * FWHM_TO_SIGMA;
        assert!((fit.full_width_at_half_max - expected).abs() < 0.02, "{fit:?}");
        assert!((fit.asymmetry() - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_one_sided() {
        let x = [1.0, 2.0, 3.0];
        let y = [10.0f32, 9.0, 2.0];
        let fit = full_width_at_half_max(&x, &y, 0);
        assert_eq!(fit.left_width, 0.0);
        assert!(fit.right_width > 1.0 && fit.right_width < 2.0);
        assert_eq!(fit.full_width_at_half_max, 2.0 * fit.right_width);
        assert!(fit.asymmetry().is_nan());
    }

    #[test]
    fn test_flat_is_empty() {
        let x = [1.0, 2.0];
        let y = [0.0, 0.0];
        let fit = full_width_at_half_max(&x, &y, 0);
        assert_eq!(fit, WidthFit::default());
    }
}
