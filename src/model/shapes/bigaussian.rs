use std::f64::consts::PI;

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{require_finite, ParametricShape, PeakShapeModel};
use crate::model::ModelError;

/// BiGaussian peak shape model, two half Gaussians joined at their shared mode
///
/// ```math
/// y = \begin{cases}
///     h\exp\left({\frac{-(x - \mu)^2}{2\sigma_l^2}}\right) & x \le \mu \\
///     h\exp\left({\frac{-(x - \mu)^2}{2\sigma_r^2}}\right) & x > \mu
/// \end{cases}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BiGaussianShape {
    pub mean: f64,
    pub sigma_left: f64,
    pub sigma_right: f64,
    pub height: f64,
}

impl BiGaussianShape {
    pub fn new(mean: f64, sigma_left: f64, sigma_right: f64, height: f64) -> Self {
        Self {
            mean,
            sigma_left,
            sigma_right,
            height,
        }
    }

    #[inline]
    fn sigma_at(&self, x: f64) -> f64 {
        if x <= self.mean {
            self.sigma_left
        } else {
            self.sigma_right
        }
    }
}

impl PeakShapeModel for BiGaussianShape {
    fn density(&self, x: f64) -> f64 {
        self.height * (-0.5 * (x - self.mean).powi(2) / self.sigma_at(x).powi(2)).exp()
    }

    fn area(&self) -> f64 {
        self.height * (PI / 2.0).sqrt() * (self.sigma_left + self.sigma_right)
    }

    fn center(&self) -> f64 {
        self.mean
    }

    fn spread(&self) -> (f64, f64) {
        (self.sigma_left, self.sigma_right)
    }

    fn translate(&mut self, delta: f64) {
        self.mean += delta;
    }

    fn validate(&self) -> Result<(), ModelError> {
        require_finite("mean", self.mean)?;
        require_finite("height", self.height)?;
        for sigma in [self.sigma_left, self.sigma_right] {
            if !(sigma > 0.0 && sigma.is_finite()) {
                return Err(ModelError::NonPositiveVariance(sigma.powi(2)));
            }
        }
        Ok(())
    }
}

impl ParametricShape for BiGaussianShape {
    fn parameter_count(&self) -> usize {
        4
    }

    /// `[height, mean, sigma_left, sigma_right]`
    fn parameters(&self) -> DVector<f64> {
        DVector::from_column_slice(&[self.height, self.mean, self.sigma_left, self.sigma_right])
    }

    fn set_parameters(&mut self, params: &DVector<f64>) {
        self.height = params[0];
        self.mean = params[1];
        self.sigma_left = params[2];
        self.sigma_right = params[3];
    }

    fn gradient(&self, x: f64, out: &mut [f64]) {
        let delta = x - self.mean;
        let sigma = self.sigma_at(x);
        let sigma_squared = sigma.powi(2);
        let base = (-0.5 * delta.powi(2) / sigma_squared).exp();
        let f = self.height * base;
        let sigma_grad = f * delta.powi(2) / (sigma_squared * sigma);
        out[0] = base;
        out[1] = f * delta / sigma_squared;
        if x <= self.mean {
            out[2] = sigma_grad;
            out[3] = 0.0;
        } else {
            out[2] = 0.0;
            out[3] = sigma_grad;
        }
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        params[2] = params[2].abs().max(f64::EPSILON.sqrt());
        params[3] = params[3].abs().max(f64::EPSILON.sqrt());
    }
}
