#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{gridspace, trapz};

use super::shapes::{PeakShape, PeakShapeModel};
use super::ModelError;

/// A function sampled on a regular grid and linearly interpolated between
/// grid points. `offset` is the position of the first grid point, so moving the
/// function is a single assignment.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearInterpolation {
    data: Vec<f64>,
    scale: f64,
    offset: f64,
}

impl LinearInterpolation {
    pub fn new(data: Vec<f64>, scale: f64, offset: f64) -> Self {
        Self {
            data,
            scale,
            offset,
        }
    }

    /// The sampled values
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// The grid spacing
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The position of the first grid point
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn support_min(&self) -> f64 {
        self.offset
    }

    pub fn support_max(&self) -> f64 {
        self.offset + self.data.len().saturating_sub(1) as f64 * self.scale
    }

    /// The position of the `index`-th grid point
    pub fn index_to_key(&self, index: usize) -> f64 {
        self.offset + index as f64 * self.scale
    }

    /// Evaluate the function at `x`, zero outside the support
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        self.value_with_offset(x, self.offset)
    }

    /// Evaluate the function at `x` as if its support started at `offset`,
    /// without modifying it
    pub fn value_with_offset(&self, x: f64, offset: f64) -> f64 {
        let n = self.data.len();
        if n == 0 {
            return 0.0;
        }
        let pos = (x - offset) / self.scale;
        let last = (n - 1) as f64;
        if !(pos >= 0.0 && pos <= last) {
            return 0.0;
        }
        let i = pos.floor() as usize;
        if i + 1 >= n {
            return self.data[n - 1];
        }
        let frac = pos - i as f64;
        self.data[i] + (self.data[i + 1] - self.data[i]) * frac
    }

    /// The grid positions at the current offset
    pub fn keys(&self) -> Vec<f64> {
        (0..self.data.len()).map(|i| self.index_to_key(i)).collect()
    }
}

/// A [`PeakShape`] sampled over a bounding box for fast evaluation.
///
/// The model can be translated with [`InterpolationModel::set_offset`] without
/// resampling the shape. `bounding_box`, `center` and `shape` all report the
/// translated location.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InterpolationModel {
    shape: PeakShape,
    interpolation: LinearInterpolation,
    /// The offset the shape was sampled at
    native_offset: f64,
    scaling: f64,
}

fn validate_box(bounding_box: (f64, f64), step: f64) -> Result<(), ModelError> {
    let (min, max) = bounding_box;
    if !(min < max) || !min.is_finite() || !max.is_finite() {
        return Err(ModelError::InvertedBoundingBox { min, max });
    }
    if !(step > 0.0) || !step.is_finite() {
        return Err(ModelError::NonPositiveStep(step));
    }
    Ok(())
}

fn sample(shape: &PeakShape, bounding_box: (f64, f64), step: f64) -> LinearInterpolation {
    let grid = gridspace(bounding_box.0, bounding_box.1, step);
    let data = shape.predict(&grid);
    LinearInterpolation::new(data, step, bounding_box.0)
}

impl InterpolationModel {
    /// Sample `shape` over `bounding_box` every `interpolation_step`
    pub fn new(
        shape: PeakShape,
        bounding_box: (f64, f64),
        interpolation_step: f64,
    ) -> Result<Self, ModelError> {
        validate_box(bounding_box, interpolation_step)?;
        shape.validate()?;
        let interpolation = sample(&shape, bounding_box, interpolation_step);
        Ok(Self {
            shape,
            interpolation,
            native_offset: bounding_box.0,
            scaling: 1.0,
        })
    }

    /// Replace the shape and bounding box, resampling at the current step. Any
    /// offset is discarded.
    pub fn set_parameters(
        &mut self,
        shape: PeakShape,
        bounding_box: (f64, f64),
    ) -> Result<(), ModelError> {
        let step = self.interpolation.scale();
        validate_box(bounding_box, step)?;
        shape.validate()?;
        self.interpolation = sample(&shape, bounding_box, step);
        self.shape = shape;
        self.native_offset = bounding_box.0;
        Ok(())
    }

    /// Resample the shape every `step`, keeping the current offset
    pub fn set_interpolation_step(&mut self, step: f64) -> Result<(), ModelError> {
        let shift = self.shift();
        let native_box = (
            self.native_offset,
            self.interpolation.support_max() - shift,
        );
        validate_box(native_box, step)?;
        self.interpolation = sample(&self.shape, native_box, step);
        self.interpolation.set_offset(self.native_offset + shift);
        Ok(())
    }

    pub fn interpolation_step(&self) -> f64 {
        self.interpolation.scale()
    }

    /// Move the start of the model's support to `offset`
    pub fn set_offset(&mut self, offset: f64) {
        self.interpolation.set_offset(offset);
    }

    pub fn offset(&self) -> f64 {
        self.interpolation.offset()
    }

    /// The start of the model's support before any offset was applied
    pub fn native_offset(&self) -> f64 {
        self.native_offset
    }

    /// How far the model has been moved from where it was sampled
    pub fn shift(&self) -> f64 {
        self.interpolation.offset() - self.native_offset
    }

    /// The intensity of the model at `position`, zero outside the bounding box
    pub fn intensity(&self, position: f64) -> f64 {
        self.scaling * self.interpolation.value(position)
    }

    pub fn predict(&self, positions: &[f64]) -> Vec<f64> {
        positions.iter().map(|x| self.intensity(*x)).collect()
    }

    pub fn interpolation(&self) -> &LinearInterpolation {
        &self.interpolation
    }

    /// The current support of the model
    pub fn bounding_box(&self) -> (f64, f64) {
        (
            self.interpolation.support_min(),
            self.interpolation.support_max(),
        )
    }

    /// The shape's location parameter after the offset
    pub fn center(&self) -> f64 {
        self.shape.center() + self.shift()
    }

    /// The shape as it was sampled, ignoring any offset
    pub fn native_shape(&self) -> &PeakShape {
        &self.shape
    }

    /// The shape moved to the model's current offset
    pub fn shape(&self) -> PeakShape {
        let mut shape = self.shape.clone();
        shape.translate(self.shift());
        shape
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    pub fn set_scaling(&mut self, scaling: f64) {
        self.scaling = scaling;
    }

    /// Choose the scaling that minimizes the squared error against `intensity`
    /// observed at `positions`, leaving it unchanged when the model is zero everywhere
    pub fn fit_scaling(&mut self, positions: &[f64], intensity: &[f64]) -> f64 {
        let mut cross = 0.0;
        let mut norm = 0.0;
        for (x, y) in positions.iter().zip(intensity.iter()) {
            let m = self.interpolation.value(*x);
            cross += m * y;
            norm += m * m;
        }
        if norm > 0.0 && cross.is_finite() {
            self.scaling = cross / norm;
        }
        self.scaling
    }

    /// The trapezoid integral of the sampled model
    pub fn area(&self) -> f64 {
        let keys = self.interpolation.keys();
        self.scaling * trapz(&keys, self.interpolation.data())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::shapes::{GaussianShape, IsotopeShape, LogNormalShape};
    use crate::model::{BiGaussianShape, EmgMzShape, EmgShape, IsotopeDistribution};

    fn gaussian_model() -> InterpolationModel {
        InterpolationModel::new(GaussianShape::new(5.0, 0.5, 1.0).into(), (3.5, 6.5), 0.01).unwrap()
    }

    #[test]
    fn test_linear_interpolation() {
        let interp = LinearInterpolation::new(vec![0.0, 2.0, 4.0, 2.0], 0.5, 1.0);
        assert_eq!(interp.support_max(), 2.5);
        assert_eq!(interp.value(1.25), 1.0);
        assert_eq!(interp.value(2.5), 2.0);
        assert_eq!(interp.value(0.999), 0.0);
        assert_eq!(interp.value(2.501), 0.0);
        assert_eq!(interp.value_with_offset(2.25, 2.0), 1.0);
    }

    #[test]
    fn test_intensity_and_offset() {
        let mut model = gaussian_model();
        let apex = model.intensity(5.0);
        assert!((apex - 1.0).abs() < 1e-9);
        assert_eq!(model.intensity(5.0), apex);
        assert_eq!(model.center(), 5.0);

        model.set_offset(model.native_offset() + 1.0);
        assert!((model.intensity(6.0) - 1.0).abs() < 1e-9);
        assert!((model.center() - 6.0).abs() < 1e-12);
        assert!((model.bounding_box().0 - 4.5).abs() < 1e-12);
        assert_eq!(model.intensity(4.4), 0.0);
        if let PeakShape::Gaussian(g) = model.shape() {
            assert!((g.mean - 6.0).abs() < 1e-12);
        } else {
            panic!("wrong shape")
        }
    }

    #[test]
    fn test_invalid_construction() {
        let shape: PeakShape = GaussianShape::new(5.0, 0.5, 1.0).into();
        assert!(matches!(
            InterpolationModel::new(shape.clone(), (6.0, 3.0), 0.1),
            Err(ModelError::InvertedBoundingBox { .. })
        ));
        assert!(matches!(
            InterpolationModel::new(shape.clone(), (3.0, 3.0), 0.1),
            Err(ModelError::InvertedBoundingBox { .. })
        ));
        assert!(matches!(
            InterpolationModel::new(shape, (3.0, 6.0), 0.0),
            Err(ModelError::NonPositiveStep(_))
        ));
        let flat: PeakShape = GaussianShape::new(5.0, 0.0, 1.0).into();
        assert!(matches!(
            InterpolationModel::new(flat, (3.0, 6.0), 0.1),
            Err(ModelError::NonPositiveVariance(_))
        ));
    }

    #[test]
    fn test_resample_keeps_offset() {
        let mut model = gaussian_model();
        model.set_offset(model.native_offset() - 0.5);
        model.set_interpolation_step(0.05).unwrap();
        assert_eq!(model.interpolation_step(), 0.05);
        assert!((model.center() - 4.5).abs() < 1e-12);
        assert!((model.intensity(4.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_area_and_scaling() {
        let mut model =
            InterpolationModel::new(GaussianShape::new(5.0, 0.5, 1.0).into(), (1.0, 9.0), 0.01)
                .unwrap();
        let expected = 0.5 * (2.0 * std::f64::consts::PI).sqrt();
        assert!((model.area() - expected).abs() / expected < 1e-3);
        let xs = [4.5, 5.0, 5.5];
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * model.intensity(*x)).collect();
        let scaling = model.fit_scaling(&xs, &ys);
        assert!((scaling - 3.0).abs() < 1e-9);
        assert!((model.area() - 3.0 * expected).abs() / expected < 3e-3);
    }

    #[test]
    fn test_zero_outside_box_for_every_shape() {
        let shapes: Vec<PeakShape> = vec![
            GaussianShape::new(5.0, 0.5, 1.0).into(),
            BiGaussianShape::new(5.0, 0.3, 0.8, 1.0).into(),
            EmgShape::new(1.0, 0.5, 0.5, 5.0).into(),
            EmgMzShape::new(1.0, 0.5, 0.5, 5.0).into(),
            LogNormalShape::new(1.0, 1.0, 1.3, 5.0, 2.0).into(),
            IsotopeShape::new(5.0, 2, 0.05, 1.000495, IsotopeDistribution::new(vec![0.6, 0.4]), 1.0)
                .into(),
        ];
        for shape in shapes {
            let name = shape.name();
            let mut model = InterpolationModel::new(shape, (4.0, 6.0), 0.05).unwrap();
            model.set_offset(4.3);
            let (lo, hi) = model.bounding_box();
            for x in [lo - 1e-9, lo - 1.0, hi + 1e-9, hi + 5.0] {
                assert_eq!(model.intensity(x), 0.0, "{name} at {x}");
            }
            assert!(model.intensity(lo + 0.7) > 0.0, "{name}");
        }
    }
}
