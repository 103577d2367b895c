use std::f64::consts::PI;

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{require_finite, ParametricShape, PeakShapeModel};
use crate::model::ModelError;

/// Gaussian peak shape model
///
/// ```math
/// y = h\exp\left({\frac{-(x - \mu)^2}{2\sigma^2}}\right)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaussianShape {
    pub mean: f64,
    pub sigma: f64,
    pub height: f64,
}

impl GaussianShape {
    pub fn new(mean: f64, sigma: f64, height: f64) -> Self {
        Self {
            mean,
            sigma,
            height,
        }
    }

    pub fn variance(&self) -> f64 {
        self.sigma.powi(2)
    }
}

impl PeakShapeModel for GaussianShape {
    fn density(&self, x: f64) -> f64 {
        self.height * (-0.5 * (x - self.mean).powi(2) / self.sigma.powi(2)).exp()
    }

    fn area(&self) -> f64 {
        self.height * self.sigma * (2.0 * PI).sqrt()
    }

    fn center(&self) -> f64 {
        self.mean
    }

    fn spread(&self) -> (f64, f64) {
        (self.sigma, self.sigma)
    }

    fn translate(&mut self, delta: f64) {
        self.mean += delta;
    }

    fn validate(&self) -> Result<(), ModelError> {
        require_finite("mean", self.mean)?;
        require_finite("height", self.height)?;
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(ModelError::NonPositiveVariance(self.variance()));
        }
        Ok(())
    }
}

impl ParametricShape for GaussianShape {
    fn parameter_count(&self) -> usize {
        3
    }

    /// `[height, mean, sigma]`
    fn parameters(&self) -> DVector<f64> {
        DVector::from_column_slice(&[self.height, self.mean, self.sigma])
    }

    fn set_parameters(&mut self, params: &DVector<f64>) {
        self.height = params[0];
        self.mean = params[1];
        self.sigma = params[2];
    }

    fn gradient(&self, x: f64, out: &mut [f64]) {
        let delta = x - self.mean;
        let sigma_squared = self.sigma.powi(2);
        let base = (-0.5 * delta.powi(2) / sigma_squared).exp();
        let f = self.height * base;
        out[0] = base;
        out[1] = f * delta / sigma_squared;
        out[2] = f * delta.powi(2) / (sigma_squared * self.sigma);
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        params[2] = params[2].abs().max(f64::EPSILON.sqrt());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::shapes::test::{check_area, check_gradient};

    #[test]
    fn test_density() {
        let shape = GaussianShape::new(5.0, 0.5, 2.0);
        assert_eq!(shape.density(5.0), 2.0);
        let half = shape.density(5.0 + 0.5 * 1.1774100225154747);
        assert!((half - 1.0).abs() < 1e-9);
        assert!((shape.density(4.0) - shape.density(6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_gradient() {
        let shape = GaussianShape::new(5.0, 0.5, 2.0);
        check_gradient(&shape, &[3.9, 4.6, 5.0, 5.2, 6.3]);
    }

    #[test]
    fn test_area() {
        check_area(&GaussianShape::new(5.0, 0.5, 2.0), 0.0, 10.0);
    }
}
