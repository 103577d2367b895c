use std::f64::consts::PI;

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{require_finite, require_positive, ParametricShape, PeakShapeModel};
use crate::model::ModelError;

/// Below this `|ln s|` the shape is evaluated as its symmetric Gaussian limit
const SYMMETRIC_LIMIT: f64 = 1e-6;

/// The smallest distance from 1 the fitted symmetry is allowed to reach, keeping
/// the symmetry derivative defined
const MIN_ASYMMETRY: f64 = 1e-3;

/// Siano-Metzler log-normal peak shape.
///
/// `width` is the full width at `1/r` of the height, `symmetry` is the ratio of
/// the right to left half widths at that height and `retention` is the position of
/// the apex.
///
/// ```math
/// g = 1 + \frac{(x - t)(s^2 - 1)}{w s} \\
/// y = \begin{cases}
///     h\exp\left(-\frac{\ln r}{\ln^2 s}\ln^2 g\right) & g > 0 \\
///     0 & g \le 0
/// \end{cases}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogNormalShape {
    pub height: f64,
    pub width: f64,
    pub symmetry: f64,
    pub retention: f64,
    /// The fraction of the height `width` is measured at, 2 for a FWHM
    pub r: f64,
}

impl LogNormalShape {
    pub fn new(height: f64, width: f64, symmetry: f64, retention: f64, r: f64) -> Self {
        Self {
            height,
            width,
            symmetry,
            retention,
            r,
        }
    }

    #[inline]
    fn is_symmetric(&self) -> bool {
        self.symmetry.ln().abs() < SYMMETRIC_LIMIT
    }

    /// `g`, the argument of the logarithm
    #[inline]
    fn log_argument(&self, x: f64) -> f64 {
        let s = self.symmetry;
        1.0 + (x - self.retention) * (s * s - 1.0) / (self.width * s)
    }

    /// The density at unit height
    fn kernel(&self, x: f64) -> f64 {
        let ln_r = self.r.ln();
        if self.is_symmetric() {
            return (-4.0 * ln_r * (x - self.retention).powi(2) / self.width.powi(2)).exp();
        }
        let g = self.log_argument(x);
        if g <= 0.0 {
            return 0.0;
        }
        let c = ln_r / self.symmetry.ln().powi(2);
        (-c * g.ln().powi(2)).exp()
    }

    /// The half widths left and right of the apex at `1/r` of the height
    pub fn half_widths(&self) -> (f64, f64) {
        let left = self.width / (1.0 + self.symmetry);
        (left, left * self.symmetry)
    }
}

impl PeakShapeModel for LogNormalShape {
    fn density(&self, x: f64) -> f64 {
        self.height * self.kernel(x)
    }

    fn area(&self) -> f64 {
        let ln_r = self.r.ln();
        let (w, s) = (self.width, self.symmetry);
        if self.is_symmetric() {
            return self.height * w / 2.0 * (PI / ln_r).sqrt();
        }
        let ln_s = s.ln();
        self.height * w * s * ln_s / (s * s - 1.0)
            * (PI / ln_r).sqrt()
            * (ln_s * ln_s / (4.0 * ln_r)).exp()
    }

    fn center(&self) -> f64 {
        self.retention
    }

    fn spread(&self) -> (f64, f64) {
        // Convert the half widths at 1/r of the height to Gaussian sigmas
        let to_sigma = (2.0 * self.r.ln()).sqrt();
        let (left, right) = self.half_widths();
        (left / to_sigma, right / to_sigma)
    }

    fn translate(&mut self, delta: f64) {
        self.retention += delta;
    }

    fn validate(&self) -> Result<(), ModelError> {
        require_finite("height", self.height)?;
        require_positive("width", self.width)?;
        require_positive("symmetry", self.symmetry)?;
        require_finite("retention", self.retention)?;
        if !(self.r > 1.0 && self.r.is_finite()) {
            return Err(ModelError::InvalidShapeParameter {
                name: "r",
                value: self.r,
            });
        }
        Ok(())
    }
}

impl ParametricShape for LogNormalShape {
    fn parameter_count(&self) -> usize {
        4
    }

    /// `[height, width, symmetry, retention]`, `r` is held fixed
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
        let (w, s, t) = (self.width, self.symmetry, self.retention);
        let ln_r = self.r.ln();
        let kernel = self.kernel(x);
        let f = self.height * kernel;
        out[0] = kernel;
        if kernel == 0.0 {
            out[1..4].iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        if self.is_symmetric() {
            let d = x - t;
            let k = 4.0 * ln_r / (w * w);
            out[1] = f * 2.0 * k * d * d / w;
            // The symmetry derivative vanishes at s = 1
            out[2] = 0.0;
            out[3] = f * 2.0 * k * d;
            return;
        }
        let ln_s = s.ln();
        let c = ln_r / (ln_s * ln_s);
        let g = self.log_argument(x);
        let l = g.ln();
        let dl = -2.0 * c * l / g;
        out[1] = f * dl * (-(g - 1.0) / w);
        let dg_ds = (x - t) / w * (1.0 + 1.0 / (s * s));
        let dc_ds = -2.0 * ln_r / (ln_s * ln_s * ln_s) / s;
        out[2] = f * (-dc_ds * l * l + dl * dg_ds);
        out[3] = f * dl * (-(s * s - 1.0) / (w * s));
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        params[1] = params[1].abs().max(f64::EPSILON.sqrt());
        let s = params[2].abs().clamp(0.01, 100.0);
        params[2] = if (s - 1.0).abs() < MIN_ASYMMETRY {
            if s < 1.0 {
                1.0 - MIN_ASYMMETRY
            } else {
                1.0 + MIN_ASYMMETRY
            }
        } else {
            s
        };
    }
}
