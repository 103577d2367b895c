use std::f64::consts::PI;

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{require_finite, ParametricShape, PeakShapeModel};
use crate::model::isotope_distribution::{Averagine, IsotopeDistribution};
use crate::model::ModelError;

/// Isotope peaks further than this many standard deviations from `x` are skipped
const PEAK_CUTOFF_SIGMAS: f64 = 10.0;

/// An isotope envelope, a sum of Gaussians of equal width spaced `distance / z` apart
/// and weighted by an [`IsotopeDistribution`]
///
/// ```math
/// y = a\sum_k p_k \exp\left(\frac{-(x - m - kd/z)^2}{2\sigma^2}\right)
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IsotopeShape {
    /// The position of the monoisotopic peak
    pub monoisotopic: f64,
    pub charge: i32,
    /// The standard deviation of each isotope peak
    pub isotope_stdev: f64,
    /// The mass difference between successive isotopes, divided by the charge for spacing
    pub isotope_distance: f64,
    pub distribution: IsotopeDistribution,
    pub scale: f64,
}

impl IsotopeShape {
    pub fn new(
        monoisotopic: f64,
        charge: i32,
        isotope_stdev: f64,
        isotope_distance: f64,
        distribution: IsotopeDistribution,
        scale: f64,
    ) -> Self {
        Self {
            monoisotopic,
            charge,
            isotope_stdev,
            isotope_distance,
            distribution,
            scale,
        }
    }

    /// Build the envelope of a peptide-like ion from the averagine model
    pub fn from_averagine(
        monoisotopic: f64,
        charge: i32,
        isotope_stdev: f64,
        isotope_distance: f64,
        max_isotope: usize,
        trim_right_cutoff: f64,
    ) -> Self {
        let distribution = IsotopeDistribution::from_averagine(
            monoisotopic,
            charge,
            &Averagine::default(),
            max_isotope,
            trim_right_cutoff,
        );
        Self::new(
            monoisotopic,
            charge,
            isotope_stdev,
            isotope_distance,
            distribution,
            1.0,
        )
    }

    /// The distance between successive isotope peaks
    pub fn spacing(&self) -> f64 {
        self.isotope_distance / self.charge.max(1) as f64
    }

    /// The abundance weighted average position of the envelope
    pub fn average_position(&self) -> f64 {
        let spacing = self.spacing();
        self.monoisotopic
            + self
                .distribution
                .iter()
                .enumerate()
                .map(|(k, p)| k as f64 * spacing * p)
                .sum::<f64>()
    }

    /// Iterate over each isotope peak's offset from `x` and its abundance, skipping
    /// peaks too far away to contribute
    #[inline]
    fn peaks_near(&self, x: f64) -> impl Iterator<Item = (f64, f64)> + '_ {
        let spacing = self.spacing();
        let cutoff = PEAK_CUTOFF_SIGMAS * self.isotope_stdev;
        let monoisotopic = self.monoisotopic;
        self.distribution
            .iter()
            .enumerate()
            .map(move |(k, p)| (x - monoisotopic - k as f64 * spacing, *p))
            .filter(move |(delta, _)| delta.abs() <= cutoff)
    }
}

impl PeakShapeModel for IsotopeShape {
    fn density(&self, x: f64) -> f64 {
        let two_var = 2.0 * self.isotope_stdev.powi(2);
        self.scale
            * self
                .peaks_near(x)
                .map(|(delta, p)| p * (-delta.powi(2) / two_var).exp())
                .sum::<f64>()
    }

    fn area(&self) -> f64 {
        self.scale * self.isotope_stdev * (2.0 * PI).sqrt() * self.distribution.iter().sum::<f64>()
    }

    fn center(&self) -> f64 {
        self.monoisotopic
    }

    fn spread(&self) -> (f64, f64) {
        (self.isotope_stdev, self.isotope_stdev)
    }

    fn reach(&self) -> (f64, f64) {
        let n = self.distribution.len().saturating_sub(1);
        (0.0, n as f64 * self.spacing())
    }

    fn translate(&mut self, delta: f64) {
        self.monoisotopic += delta;
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.charge < 1 {
            return Err(ModelError::InvalidCharge(self.charge));
        }
        if !(self.isotope_stdev > 0.0 && self.isotope_stdev.is_finite()) {
            return Err(ModelError::NonPositiveVariance(self.isotope_stdev.powi(2)));
        }
        require_finite("monoisotopic", self.monoisotopic)?;
        require_finite("scale", self.scale)?;
        if !(self.isotope_distance > 0.0) {
            return Err(ModelError::InvalidShapeParameter {
                name: "isotope_distance",
                value: self.isotope_distance,
            });
        }
        if self.distribution.is_empty() {
            return Err(ModelError::InvalidShapeParameter {
                name: "distribution",
                value: 0.0,
            });
        }
        Ok(())
    }
}

impl ParametricShape for IsotopeShape {
    fn parameter_count(&self) -> usize {
        3
    }

    /// `[scale, isotope_stdev, monoisotopic]`, the charge and distribution are held fixed
    fn parameters(&self) -> DVector<f64> {
        DVector::from_column_slice(&[self.scale, self.isotope_stdev, self.monoisotopic])
    }

    fn set_parameters(&mut self, params: &DVector<f64>) {
        self.scale = params[0];
        self.isotope_stdev = params[1];
        self.monoisotopic = params[2];
    }

    fn gradient(&self, x: f64, out: &mut [f64]) {
        let sigma = self.isotope_stdev;
        let var = sigma * sigma;
        let mut base = 0.0;
        let mut sigma_term = 0.0;
        let mut position_term = 0.0;
        for (delta, p) in self.peaks_near(x) {
            let e = p * (-0.5 * delta * delta / var).exp();
            base += e;
            sigma_term += e * delta * delta;
            position_term += e * delta;
        }
        out[0] = base;
        out[1] = self.scale * sigma_term / (var * sigma);
        out[2] = self.scale * position_term / var;
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        params[1] = params[1].abs().max(f64::EPSILON.sqrt());
    }
}
