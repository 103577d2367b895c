//! Intensity weighted summary statistics over a [`RawDataArray`] and the
//! correlation measure used to score a fit.
//!
//! All estimators treat the intensity as a weight on the position, so negative
//! intensities are expected to have been clamped beforehand.
use num_traits::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::RawDataArray;

/// Intensity weighted mean and variance of positions
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicStatistics {
    pub sum: f64,
    pub mean: f64,
    pub variance: f64,
}

impl BasicStatistics {
    pub fn new(sum: f64, mean: f64, variance: f64) -> Self {
        Self {
            sum,
            mean,
            variance,
        }
    }

    /// Compute the weighted moments of `data`.
    ///
    /// When the total weight is zero the positions are weighted uniformly
    /// instead, so an all-zero signal still has a location.
    pub fn from_data(data: &RawDataArray) -> Self {
        if data.is_empty() {
            return Self::default();
        }
        let sum = data.total_intensity();
        let uniform = !(sum > 0.0);
        let weight = |y: f64| if uniform { 1.0 } else { y };
        let norm = if uniform { data.len() as f64 } else { sum };

        let mean = data.iter().map(|(x, y)| x * weight(y)).sum::<f64>() / norm;
        let variance = data
            .iter()
            .map(|(x, y)| (x - mean).powi(2) * weight(y))
            .sum::<f64>()
            / norm;
        Self::new(sum, mean, variance)
    }

    pub fn stdev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// [`BasicStatistics`] extended with separate variances for the positions left
/// and right of the mean, for asymmetric peak shapes.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AsymmetricStatistics {
    pub basic: BasicStatistics,
    /// Variance of the positions at or below the mean
    pub variance1: f64,
    /// Variance of the positions above the mean
    pub variance2: f64,
}

impl AsymmetricStatistics {
    pub fn from_data(data: &RawDataArray) -> Self {
        let basic = BasicStatistics::from_data(data);
        let mut left = (0.0, 0.0);
        let mut right = (0.0, 0.0);
        for (x, y) in data.iter() {
            let delta = (x - basic.mean).powi(2);
            if x <= basic.mean {
                left.0 += delta * y;
                left.1 += y;
            } else {
                right.0 += delta * y;
                right.1 += y;
            }
        }
        let variance1 = if left.1 > 0.0 { left.0 / left.1 } else { 0.0 };
        let variance2 = if right.1 > 0.0 { right.0 / right.1 } else { 0.0 };
        Self {
            basic,
            variance1,
            variance2,
        }
    }

    pub fn mean(&self) -> f64 {
        self.basic.mean
    }

    pub fn variance(&self) -> f64 {
        self.basic.variance
    }
}

/// Find the index at which the cumulative intensity first reaches half of the
/// total intensity.
///
/// This is the position where the signal mass is split in half, which is more
/// robust to a one-sided tail than the weighted mean.
pub fn weighted_median_index(intensity: &[f64]) -> usize {
    let half = intensity.iter().sum::<f64>() / 2.0;
    let mut acc = 0.0;
    for (i, y) in intensity.iter().enumerate() {
        acc += y;
        if acc >= half {
            return i;
        }
    }
    intensity.len().saturating_sub(1)
}

/// Compute the Pearson correlation coefficient between `xs` and `ys`.
///
/// The result is NaN when either sequence has zero variance or the lengths
/// differ, it is up to the caller to decide what that means.
pub fn pearson_correlation<T: Float>(xs: &[T], ys: &[T]) -> f64 {
    let n = xs.len();
    if n == 0 || n != ys.len() {
        return f64::NAN;
    }
    let nf = n as f64;
    let xmean = xs.iter().map(|x| x.to_f64().unwrap()).sum::<f64>() / nf;
    let ymean = ys.iter().map(|y| y.to_f64().unwrap()).sum::<f64>() / nf;

    let mut numerator = 0.0;
    let mut xdenom = 0.0;
    let mut ydenom = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x.to_f64().unwrap() - xmean;
        let dy = y.to_f64().unwrap() - ymean;
        numerator += dx * dy;
        xdenom += dx * dx;
        ydenom += dy * dy;
    }
    let r = numerator / (xdenom * ydenom).sqrt();
    // Rounding can push a perfect correlation a hair past the bound
    if r.is_nan() {
        r
    } else {
        r.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_basic_statistics() {
        let data = RawDataArray::from((vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![10.0, 40.0, 90.0, 40.0, 10.0]));
        let stats = BasicStatistics::from_data(&data);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert!((stats.variance - 160.0 / 190.0).abs() < 1e-12);
        assert_eq!(stats.sum, 190.0);
    }

    #[test]
    fn test_zero_weight_falls_back_to_uniform() {
        let data = RawDataArray::from((vec![1.0, 3.0], vec![0.0, 0.0]));
        let stats = BasicStatistics::from_data(&data);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.variance, 1.0);
    }

    #[test]
    fn test_asymmetric_statistics() {
        let data = RawDataArray::from((
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![10.0, 80.0, 40.0, 20.0, 10.0, 5.0],
        ));
        let stats = AsymmetricStatistics::from_data(&data);
        assert!(stats.variance2 > stats.variance1);
        assert!(stats.variance() > 0.0);
    }

    #[test]
    fn test_weighted_median_index() {
        assert_eq!(weighted_median_index(&[10.0, 40.0, 90.0, 40.0, 10.0]), 2);
        assert_eq!(weighted_median_index(&[90.0, 40.0, 20.0, 10.0, 5.0]), 0);
        assert_eq!(weighted_median_index(&[1.0, 1.0, 1.0, 1.0]), 1);
        assert_eq!(weighted_median_index(&[5.0]), 0);
        assert_eq!(weighted_median_index(&[]), 0);
    }

    #[test]
    fn test_pearson_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson_correlation(&a, &b) - 1.0).abs() < 1e-12);
        let c = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson_correlation(&a, &c) + 1.0).abs() < 1e-12);
        let flat = [3.0, 3.0, 3.0, 3.0];
        assert!(pearson_correlation(&a, &flat).is_nan());
    }
}
