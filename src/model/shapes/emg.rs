//! Exponentially modified Gaussian peak shapes.
//!
//! Both shapes share the parameterization `(height, width, symmetry, retention)`
//! where `width` is the standard deviation of the Gaussian component, `symmetry`
//! is the time constant of the exponential component and `retention` is the
//! Gaussian center. They differ in the direction of the tail and in how the
//! complementary error function is evaluated.
use std::f64::consts::{PI, SQRT_2};

use libm::erfc;
use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{require_finite, require_positive, ParametricShape, PeakShapeModel};
use crate::model::ModelError;

/// The slope of the logistic curve approximating the normal CDF, `2.4055 / sqrt(2)`
const LOGISTIC_SLOPE: f64 = -1.700_952_668_133_487_4;

/// Keeps the exponential's time constant from collapsing against the Gaussian
/// width, where the logistic approximation diverges
const MIN_SYMMETRY_RATIO: f64 = 0.05;

/// Largest log-density passed to `exp`
const MAX_LOG_DENSITY: f64 = 700.0;

/// `ln(1 + exp(z))` without overflow
#[inline]
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(erfc(u))`, switching to the asymptotic series once `erfc` would underflow
fn ln_erfc(u: f64) -> f64 {
    if u < 25.0 {
        erfc(u).ln()
    } else {
        let u2 = u * u;
        let series = 1.0 - 1.0 / (2.0 * u2) + 3.0 / (4.0 * u2 * u2);
        -u2 - (u * PI.sqrt()).ln() + series.ln()
    }
}

/// `2 / sqrt(pi) * exp(-u^2) / erfc(u)`, the negated derivative of [`ln_erfc`]
#[inline]
fn erfc_log_slope(u: f64) -> f64 {
    2.0 / PI.sqrt() * (-u * u - ln_erfc(u)).exp()
}

fn validate_emg(height: f64, width: f64, symmetry: f64, retention: f64) -> Result<(), ModelError> {
    require_finite("height", height)?;
    require_positive("width", width)?;
    require_positive("symmetry", symmetry)?;
    require_finite("retention", retention)?;
    Ok(())
}

fn constrain_emg(params: &mut DVector<f64>) {
    params[1] = params[1].abs().max(f64::EPSILON.sqrt());
    params[2] = params[2].abs().max(params[1] * MIN_SYMMETRY_RATIO);
}

/// Exponentially modified Gaussian with the tail toward larger positions, as seen
/// in chromatographic elution profiles.
///
/// The complementary error function is replaced by a logistic curve:
///
/// ```math
/// y = \frac{h w \sqrt{2\pi}}{s}
///     \frac{\exp\left(\frac{w^2}{2s^2} - \frac{x - r}{s}\right)}
///     {1 + \exp\left(k\left(\frac{x - r}{w} - \frac{w}{s}\right)\right)}
/// \quad k = \frac{-2.4055}{\sqrt 2}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmgShape {
    pub height: f64,
    pub width: f64,
    pub symmetry: f64,
    pub retention: f64,
}

impl EmgShape {
    pub fn new(height: f64, width: f64, symmetry: f64, retention: f64) -> Self {
        Self {
            height,
            width,
            symmetry,
            retention,
        }
    }

    /// The log of the density without the height term, and the logistic's
    /// argument
    #[inline]
    fn log_kernel(&self, x: f64) -> (f64, f64) {
        let (w, s) = (self.width, self.symmetry);
        let t = x - self.retention;
        let z = LOGISTIC_SLOPE * (t / w - w / s);
        let log_kernel = w.ln() - s.ln() + 0.5 * (2.0 * PI).ln() + w * w / (2.0 * s * s)
            - t / s
            - softplus(z);
        (log_kernel.min(MAX_LOG_DENSITY), z)
    }
}

impl PeakShapeModel for EmgShape {
    fn density(&self, x: f64) -> f64 {
        self.height * self.log_kernel(x).0.exp()
    }

    fn area(&self) -> f64 {
        self.height * self.width * (2.0 * PI).sqrt()
    }

    fn center(&self) -> f64 {
        self.retention
    }

    fn spread(&self) -> (f64, f64) {
        (self.width, self.width + 2.0 * self.symmetry)
    }

    fn translate(&mut self, delta: f64) {
        self.retention += delta;
    }

    fn validate(&self) -> Result<(), ModelError> {
        validate_emg(self.height, self.width, self.symmetry, self.retention)
    }
}

impl ParametricShape for EmgShape {
    fn parameter_count(&self) -> usize {
        4
    }

    /// `[height, width, symmetry, retention]`
    fn parameters(&self) -> DVector<f64> {
        DVector::from_column_slice(&[self.height, self.width, self.symmetry, self.retention])
    }

    fn set_parameters(&mut self, params: &DVector<f64>) {
        self.height = params[0];
        self.width = params[1];
        self.symmetry = params[2];
        self.retention = params[3];
    }

    fn gradient(&self, x: f64, out: &mut [f64]) {
        let (w, s) = (self.width, self.symmetry);
        let t = x - self.retention;
        let (log_kernel, z) = self.log_kernel(x);
        let kernel = log_kernel.exp();
        let f = self.height * kernel;
        let q = sigmoid(z) * LOGISTIC_SLOPE;

        out[0] = kernel;
        out[1] = f * (1.0 / w + w / (s * s) - q * (-t / (w * w) - 1.0 / s));
        out[2] = f * (-1.0 / s - w * w / (s * s * s) + t / (s * s) - q * (w / (s * s)));
        out[3] = f * (1.0 / s + q / w);
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        constrain_emg(params)
    }
}

/// Exponentially modified Gaussian with the tail toward smaller positions, the
/// fronting seen on m/z profile peaks, evaluated with the exact complementary
/// error function:
///
/// ```math
/// y = \frac{h w}{s}\sqrt{\frac{\pi}{2}}
///     \exp\left(\frac{w^2}{2s^2} - \frac{r - x}{s}\right)
///     \operatorname{erfc}\left(\frac{1}{\sqrt 2}\left(\frac{w}{s} - \frac{r - x}{w}\right)\right)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmgMzShape {
    pub height: f64,
    pub width: f64,
    pub symmetry: f64,
    pub retention: f64,
}

impl EmgMzShape {
    pub fn new(height: f64, width: f64, symmetry: f64, retention: f64) -> Self {
        Self {
            height,
            width,
            symmetry,
            retention,
        }
    }

    #[inline]
    fn log_kernel(&self, x: f64) -> (f64, f64) {
        let (w, s) = (self.width, self.symmetry);
        let t = self.retention - x;
        let u = (w / s - t / w) / SQRT_2;
        let log_kernel =
            w.ln() - s.ln() + 0.5 * (PI / 2.0).ln() + w * w / (2.0 * s * s) - t / s + ln_erfc(u);
        (log_kernel.min(MAX_LOG_DENSITY), u)
    }
}

impl PeakShapeModel for EmgMzShape {
    fn density(&self, x: f64) -> f64 {
        self.height * self.log_kernel(x).0.exp()
    }

    fn area(&self) -> f64 {
        self.height * self.width * (2.0 * PI).sqrt()
    }

    fn center(&self) -> f64 {
        self.retention
    }

    fn spread(&self) -> (f64, f64) {
        (self.width + 2.0 * self.symmetry, self.width)
    }

    fn translate(&mut self, delta: f64) {
        self.retention += delta;
    }

    fn validate(&self) -> Result<(), ModelError> {
        validate_emg(self.height, self.width, self.symmetry, self.retention)
    }
}

impl ParametricShape for EmgMzShape {
    fn parameter_count(&self) -> usize {
        4
    }

    /// `[height, width, symmetry, retention]`
    fn parameters(&self) -> DVector<f64> {
        DVector::from_column_slice(&[self.height, self.width, self.symmetry, self.retention])
    }

    fn set_parameters(&mut self, params: &DVector<f64>) {
        self.height = params[0];
        self.width = params[1];
        self.symmetry = params[2];
        self.retention = params[3];
    }

    fn gradient(&self, x: f64, out: &mut [f64]) {
        let (w, s) = (self.width, self.symmetry);
        let t = self.retention - x;
        let (log_kernel, u) = self.log_kernel(x);
        let kernel = log_kernel.exp();
        let f = self.height * kernel;
        let m = erfc_log_slope(u);

        out[0] = kernel;
        out[1] = f * (1.0 / w + w / (s * s) - m * (1.0 / s + t / (w * w)) / SQRT_2);
        out[2] = f * (-1.0 / s - w * w / (s * s * s) + t / (s * s) + m * (w / (s * s)) / SQRT_2);
        out[3] = f * (-1.0 / s + m / (w * SQRT_2));
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        params[1] = params[1].abs().max(f64::EPSILON.sqrt());
        params[2] = params[2].abs().max(f64::EPSILON.sqrt());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::shapes::test::{check_area, check_gradient};

    #[test]
    fn test_ln_erfc_is_continuous() {
        let below = ln_erfc(25.0 - 1e-9);
        let above = ln_erfc(25.0);
        assert!((below - above).abs() / below.abs() < 1e-6, "{below} {above}");
        assert!(ln_erfc(-10.0) - 2f64.ln() < 1e-12);
    }

    #[test]
    fn test_emg_tail_direction() {
        let shape = EmgShape::new(10.0, 1.0, 2.0, 20.0);
        let apex = (0..400)
            .map(|i| 10.0 + i as f64 * 0.05)
            .max_by(|a, b| shape.density(*a).total_cmp(&shape.density(*b)))
            .unwrap();
        assert!(apex > 20.0);
        assert!(shape.density(apex + 3.0) > shape.density(apex - 3.0));

        let shape = EmgMzShape::new(10.0, 1.0, 2.0, 20.0);
        let apex = (0..400)
            .map(|i| 10.0 + i as f64 * 0.05)
            .max_by(|a, b| shape.density(*a).total_cmp(&shape.density(*b)))
            .unwrap();
        assert!(apex < 20.0);
        assert!(shape.density(apex - 3.0) > shape.density(apex + 3.0));
    }

    #[test]
    fn test_emg_finite_when_narrow() {
        let shape = EmgMzShape::new(1.0, 1.0, 0.001, 5.0);
        for x in [-100.0, 0.0, 4.0, 5.0, 6.0, 100.0] {
            let y = shape.density(x);
            assert!(y.is_finite(), "{x} {y}");
        }
        // With a negligible tail it is a Gaussian of unit height
        assert!((shape.density(5.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_gradient() {
        check_gradient(&EmgShape::new(10.0, 1.0, 2.0, 20.0), &[17.0, 19.5, 20.0, 21.3, 25.0]);
        check_gradient(&EmgMzShape::new(10.0, 0.02, 0.05, 500.0), &[499.8, 499.95, 500.0, 500.04]);
    }

    #[test]
    fn test_area() {
        check_area(&EmgMzShape::new(10.0, 1.0, 2.0, 20.0), -20.0, 40.0);
        let shape = EmgShape::new(10.0, 1.0, 2.0, 20.0);
        let xs = crate::arrayops::gridspace(0.0, 60.0, 0.001);
        let numeric: f64 = crate::arrayops::trapz(&xs, &shape.predict(&xs));
        // The logistic curve only approximates the error function
        assert!((numeric - shape.area()).abs() / shape.area() < 0.1);
    }
}
