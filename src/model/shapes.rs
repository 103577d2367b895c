use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::ModelError;

mod bigaussian;
mod emg;
mod gaussian;
mod isotope;
mod lognormal;

pub use bigaussian::BiGaussianShape;
pub use emg::{EmgMzShape, EmgShape};
pub use gaussian::GaussianShape;
pub use isotope::IsotopeShape;
pub use lognormal::LogNormalShape;

/// The capabilities every peak shape exposes
pub trait PeakShapeModel {
    /// Compute the theoretical intensity at a specified coordinate
    fn density(&self, x: f64) -> f64;

    /// The analytic integral of [`PeakShapeModel::density`] over the real line
    fn area(&self) -> f64;

    /// The location parameter of the shape
    fn center(&self) -> f64;

    /// Standard deviation-like scales left and right of the shape's extent,
    /// used to size bounding boxes
    fn spread(&self) -> (f64, f64);

    /// How far left and right of [`PeakShapeModel::center`] the shape has
    /// structure beyond its spread, only non-zero for multi-peak shapes
    fn reach(&self) -> (f64, f64) {
        (0.0, 0.0)
    }

    /// Move the shape along the position axis
    fn translate(&mut self, delta: f64);

    /// Check that the shape's parameters describe a valid function
    fn validate(&self) -> Result<(), ModelError>;

    /// Compute the theoretical intensity at every coordinate in `xs`
    fn predict(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|x| self.density(*x)).collect()
    }
}

/// A shape whose parameters can be refined by a least squares optimizer using
/// analytic partial derivatives
pub trait ParametricShape: PeakShapeModel + Clone {
    /// The number of free parameters
    fn parameter_count(&self) -> usize;

    /// The free parameters packed into a vector, in the order used by
    /// [`ParametricShape::gradient`]
    fn parameters(&self) -> DVector<f64>;

    /// Unpack the free parameters from a vector produced by [`ParametricShape::parameters`]
    fn set_parameters(&mut self, params: &DVector<f64>);

    /// Write the partial derivatives of [`PeakShapeModel::density`] at `x` with respect
    /// to each free parameter into `out`
    fn gradient(&self, x: f64, out: &mut [f64]);

    /// Project a parameter vector back into the valid domain of the shape
    fn constrain(&self, params: &mut DVector<f64>);
}

/// A closed set of peak shapes
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PeakShape {
    Gaussian(GaussianShape),
    BiGaussian(BiGaussianShape),
    Emg(EmgShape),
    EmgMz(EmgMzShape),
    LogNormal(LogNormalShape),
    Isotope(IsotopeShape),
}

macro_rules! dispatch_shape {
    ($d:ident, $r:ident, $e:expr) => {
        match $d {
            PeakShape::Gaussian($r) => $e,
            PeakShape::BiGaussian($r) => $e,
            PeakShape::Emg($r) => $e,
            PeakShape::EmgMz($r) => $e,
            PeakShape::LogNormal($r) => $e,
            PeakShape::Isotope($r) => $e,
        }
    };
}

impl From<GaussianShape> for PeakShape {
    fn from(value: GaussianShape) -> Self {
        Self::Gaussian(value)
    }
}

impl From<BiGaussianShape> for PeakShape {
    fn from(value: BiGaussianShape) -> Self {
        Self::BiGaussian(value)
    }
}

impl From<EmgShape> for PeakShape {
    fn from(value: EmgShape) -> Self {
        Self::Emg(value)
    }
}

impl From<EmgMzShape> for PeakShape {
    fn from(value: EmgMzShape) -> Self {
        Self::EmgMz(value)
    }
}

impl From<LogNormalShape> for PeakShape {
    fn from(value: LogNormalShape) -> Self {
        Self::LogNormal(value)
    }
}

impl From<IsotopeShape> for PeakShape {
    fn from(value: IsotopeShape) -> Self {
        Self::Isotope(value)
    }
}

impl PeakShape {
    pub fn name(&self) -> &'static str {
        match self {
            PeakShape::Gaussian(_) => "Gaussian",
            PeakShape::BiGaussian(_) => "BiGaussian",
            PeakShape::Emg(_) => "Emg",
            PeakShape::EmgMz(_) => "EmgMz",
            PeakShape::LogNormal(_) => "LogNormal",
            PeakShape::Isotope(_) => "Isotope",
        }
    }

    /// Whether every parameter of the shape is a finite number
    pub fn is_finite(&self) -> bool {
        dispatch_shape!(self, p, p.parameters().iter().all(|v| v.is_finite()))
    }
}

impl PeakShapeModel for PeakShape {
    fn density(&self, x: f64) -> f64 {
        dispatch_shape!(self, p, p.density(x))
    }

    fn area(&self) -> f64 {
        dispatch_shape!(self, p, p.area())
    }

    fn center(&self) -> f64 {
        dispatch_shape!(self, p, p.center())
    }

    fn spread(&self) -> (f64, f64) {
        dispatch_shape!(self, p, p.spread())
    }

    fn reach(&self) -> (f64, f64) {
        dispatch_shape!(self, p, p.reach())
    }

    fn translate(&mut self, delta: f64) {
        dispatch_shape!(self, p, p.translate(delta))
    }

    fn validate(&self) -> Result<(), ModelError> {
        dispatch_shape!(self, p, p.validate())
    }
}

/// Reject a parameter which is not finite and strictly positive
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidShapeParameter { name, value })
    }
}

pub(crate) fn require_finite(name: &'static str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidShapeParameter { name, value })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Check each analytic partial derivative against a central finite difference
    pub(crate) fn check_gradient<S: ParametricShape>(shape: &S, xs: &[f64]) {
        let n = shape.parameter_count();
        let mut grad = vec![0.0; n];
        let params = shape.parameters();
        for x in xs.iter().copied() {
            shape.gradient(x, &mut grad);
            for i in 0..n {
                let h = 1e-7 * params[i].abs().max(1e-2);
                let mut up = params.clone();
                up[i] += h;
                let mut down = params.clone();
                down[i] -= h;
                let mut s_up = shape.clone();
                s_up.set_parameters(&up);
                let mut s_down = shape.clone();
                s_down.set_parameters(&down);
                let numeric = (s_up.density(x) - s_down.density(x)) / (2.0 * h);
                let scale = numeric.abs().max(grad[i].abs()).max(1e-3);
                assert!(
                    (numeric - grad[i]).abs() / scale < 1e-3,
                    "d/dp{i} at {x}: analytic {} numeric {numeric}",
                    grad[i]
                );
            }
        }
    }

    /// Check the analytic area against a dense trapezoid integral
    pub(crate) fn check_area<S: PeakShapeModel>(shape: &S, lo: f64, hi: f64) {
        let xs = crate::arrayops::gridspace(lo, hi, (hi - lo) / 20000.0);
        let ys = shape.predict(&xs);
        let numeric: f64 = crate::arrayops::trapz(&xs, &ys);
        let analytic = shape.area();
        assert!(
            (numeric - analytic).abs() / analytic < 1e-3,
            "analytic area {analytic} numeric {numeric}"
        );
    }

    #[test]
    fn test_dispatch() {
        let mut shape: PeakShape = GaussianShape::new(10.0, 2.0, 1.0).into();
        assert_eq!(shape.name(), "Gaussian");
        assert_eq!(shape.center(), 10.0);
        shape.translate(-1.5);
        assert_eq!(shape.center(), 8.5);
        assert_eq!(shape.density(8.5), 1.0);
        assert!(shape.validate().is_ok());
        assert!(shape.is_finite());

        let bad: PeakShape = GaussianShape::new(10.0, 0.0, 1.0).into();
        assert!(matches!(bad.validate(), Err(ModelError::NonPositiveVariance(_))));
    }
}
