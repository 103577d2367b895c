#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::optimize::LevenbergMarquardt;

use super::FitterError;

/// Settings shared by every [`Fitter1D`](super::Fitter1D).
///
/// A config is immutable once built, so the derived standard deviations can
/// never be out of date with the variances they come from. Use
/// [`FitterConfigBuilder`] or [`FitterConfig::from_params`] to make one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "FitterConfigBuilder", into = "FitterConfigBuilder")
)]
pub struct FitterConfig {
    interpolation_step: f64,
    offset_step: f64,
    tolerance_stdev_bounding_box: f64,
    mean: Option<f64>,
    variance: Option<f64>,
    variance1: Option<f64>,
    variance2: Option<f64>,
    stdev: Option<f64>,
    stdev1: Option<f64>,
    stdev2: Option<f64>,
    charge: Option<i32>,
    max_charge: i32,
    isotope_stdev: Option<f64>,
    isotope_maximum: usize,
    isotope_distance: f64,
    isotope_trim_right_cutoff: f64,
    lognormal_r: f64,
    max_iteration: usize,
    delta_abs_error: f64,
    delta_rel_error: f64,
}

impl Default for FitterConfig {
    fn default() -> Self {
        let builder = FitterConfigBuilder::default();
        builder.finish()
    }
}

impl FitterConfig {
    pub fn builder() -> FitterConfigBuilder {
        FitterConfigBuilder::default()
    }

    /// Build a config from `(key, value)` pairs, ignoring keys that are not
    /// recognized. Counts like `charge` are truncated toward zero.
    ///
    /// Recognized keys are `interpolation_step`, `offset_step`,
    /// `tolerance_stdev_bounding_box`, `statistics:mean`, `statistics:variance`,
    /// `statistics:variance1`, `statistics:variance2`, `charge`, `max_charge`,
    /// `isotope:stdev`, `isotope:maximum`, `isotope:distance`,
    /// `isotope:trim_right_cutoff`, `lognormal:r`, `max_iteration`,
    /// `deltaAbsError` and `deltaRelError`.
    pub fn from_params<'a>(
        params: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, FitterError> {
        let mut builder = FitterConfigBuilder::default();
        for (key, value) in params {
            match key {
                "interpolation_step" => builder.interpolation_step(value),
                "offset_step" => builder.offset_step(value),
                "tolerance_stdev_bounding_box" => builder.tolerance_stdev_bounding_box(value),
                "statistics:mean" => builder.mean(value),
                "statistics:variance" => builder.variance(value),
                "statistics:variance1" => builder.variance1(value),
                "statistics:variance2" => builder.variance2(value),
                "charge" => builder.charge(value as i32),
                "max_charge" => builder.max_charge(value as i32),
                "isotope:stdev" => builder.isotope_stdev(value),
                "isotope:maximum" => builder.isotope_maximum(value.max(0.0) as usize),
                "isotope:distance" => builder.isotope_distance(value),
                "isotope:trim_right_cutoff" => builder.isotope_trim_right_cutoff(value),
                "lognormal:r" => builder.lognormal_r(value),
                "max_iteration" => builder.max_iteration(value.max(0.0) as usize),
                "deltaAbsError" => builder.delta_abs_error(value),
                "deltaRelError" => builder.delta_rel_error(value),
                _ => {
                    log::trace!("Ignoring unknown fitter parameter {key}");
                    &mut builder
                }
            };
        }
        builder.build()
    }

    /// The spacing of the grid a shape is sampled on
    pub fn interpolation_step(&self) -> f64 {
        self.interpolation_step
    }

    /// The spacing of the candidate offsets tried by the offset search
    pub fn offset_step(&self) -> f64 {
        self.offset_step
    }

    /// How many standard deviations the bounding box extends past the data
    pub fn tolerance_stdev_bounding_box(&self) -> f64 {
        self.tolerance_stdev_bounding_box
    }

    /// A fixed location to use instead of one estimated from the data
    pub fn mean(&self) -> Option<f64> {
        self.mean
    }

    pub fn variance(&self) -> Option<f64> {
        self.variance
    }

    pub fn variance1(&self) -> Option<f64> {
        self.variance1
    }

    pub fn variance2(&self) -> Option<f64> {
        self.variance2
    }

    pub fn stdev(&self) -> Option<f64> {
        self.stdev
    }

    pub fn stdev1(&self) -> Option<f64> {
        self.stdev1
    }

    pub fn stdev2(&self) -> Option<f64> {
        self.stdev2
    }

    /// A fixed charge state for the isotope fitters, otherwise every charge up to
    /// [`FitterConfig::max_charge`] is tried
    pub fn charge(&self) -> Option<i32> {
        self.charge
    }

    pub fn max_charge(&self) -> i32 {
        self.max_charge
    }

    /// A fixed isotope peak width, otherwise several are tried
    pub fn isotope_stdev(&self) -> Option<f64> {
        self.isotope_stdev
    }

    pub fn isotope_maximum(&self) -> usize {
        self.isotope_maximum
    }

    pub fn isotope_distance(&self) -> f64 {
        self.isotope_distance
    }

    pub fn isotope_trim_right_cutoff(&self) -> f64 {
        self.isotope_trim_right_cutoff
    }

    pub fn lognormal_r(&self) -> f64 {
        self.lognormal_r
    }

    pub fn max_iteration(&self) -> usize {
        self.max_iteration
    }

    pub fn delta_abs_error(&self) -> f64 {
        self.delta_abs_error
    }

    pub fn delta_rel_error(&self) -> f64 {
        self.delta_rel_error
    }

    /// The optimizer settings for the least squares fitters
    pub fn optimizer(&self) -> LevenbergMarquardt {
        LevenbergMarquardt::default()
            .max_iter(self.max_iteration)
            .delta_abs_error(self.delta_abs_error)
            .delta_rel_error(self.delta_rel_error)
    }

    /// The charge states to try, in ascending order
    pub fn charges(&self) -> Vec<i32> {
        match self.charge {
            Some(z) => vec![z],
            None => (1..=self.max_charge).collect(),
        }
    }

    /// The isotope peak widths to try
    pub fn isotope_stdevs(&self) -> Vec<f64> {
        match self.isotope_stdev {
            Some(s) => vec![s],
            None => DEFAULT_ISOTOPE_STDEVS.to_vec(),
        }
    }
}

/// Isotope peak widths tried when none is configured
pub const DEFAULT_ISOTOPE_STDEVS: [f64; 3] = [0.04, 0.08, 0.12];

/// A builder for [`FitterConfig`], checking every value when built
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct FitterConfigBuilder {
    interpolation_step: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    offset_step: Option<f64>,
    tolerance_stdev_bounding_box: f64,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "statistics:mean", skip_serializing_if = "Option::is_none")
    )]
    mean: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "statistics:variance", skip_serializing_if = "Option::is_none")
    )]
    variance: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "statistics:variance1", skip_serializing_if = "Option::is_none")
    )]
    variance1: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "statistics:variance2", skip_serializing_if = "Option::is_none")
    )]
    variance2: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    charge: Option<i32>,
    max_charge: i32,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "isotope:stdev", skip_serializing_if = "Option::is_none")
    )]
    isotope_stdev: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "isotope:maximum"))]
    isotope_maximum: usize,
    #[cfg_attr(feature = "serde", serde(rename = "isotope:distance"))]
    isotope_distance: f64,
    #[cfg_attr(feature = "serde", serde(rename = "isotope:trim_right_cutoff"))]
    isotope_trim_right_cutoff: f64,
    #[cfg_attr(feature = "serde", serde(rename = "lognormal:r"))]
    lognormal_r: f64,
    max_iteration: usize,
    #[cfg_attr(feature = "serde", serde(rename = "deltaAbsError"))]
    delta_abs_error: f64,
    #[cfg_attr(feature = "serde", serde(rename = "deltaRelError"))]
    delta_rel_error: f64,
}

impl Default for FitterConfigBuilder {
    fn default() -> Self {
        Self {
            interpolation_step: 0.1,
            offset_step: None,
            tolerance_stdev_bounding_box: 3.0,
            mean: None,
            variance: None,
            variance1: None,
            variance2: None,
            charge: None,
            max_charge: 4,
            isotope_stdev: None,
            isotope_maximum: 100,
            isotope_distance: 1.000495,
            isotope_trim_right_cutoff: 0.001,
            lognormal_r: 2.0,
            max_iteration: 500,
            delta_abs_error: 1e-4,
            delta_rel_error: 1e-4,
        }
    }
}

fn invalid(name: &str, value: impl std::fmt::Display, requirement: &str) -> FitterError {
    FitterError::InvalidParameter(format!("{name} = {value} {requirement}"))
}

fn check_positive(name: &str, value: f64) -> Result<(), FitterError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(name, value, "must be positive"))
    }
}

impl FitterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interpolation_step(&mut self, interpolation_step: f64) -> &mut Self {
        self.interpolation_step = interpolation_step;
        self
    }

    pub fn offset_step(&mut self, offset_step: f64) -> &mut Self {
        self.offset_step = Some(offset_step);
        self
    }

    pub fn tolerance_stdev_bounding_box(&mut self, tolerance: f64) -> &mut Self {
        self.tolerance_stdev_bounding_box = tolerance;
        self
    }

    pub fn mean(&mut self, mean: f64) -> &mut Self {
        self.mean = Some(mean);
        self
    }

    pub fn variance(&mut self, variance: f64) -> &mut Self {
        self.variance = Some(variance);
        self
    }

    pub fn variance1(&mut self, variance1: f64) -> &mut Self {
        self.variance1 = Some(variance1);
        self
    }

    pub fn variance2(&mut self, variance2: f64) -> &mut Self {
        self.variance2 = Some(variance2);
        self
    }

    pub fn charge(&mut self, charge: i32) -> &mut Self {
        self.charge = Some(charge);
        self
    }

    pub fn max_charge(&mut self, max_charge: i32) -> &mut Self {
        self.max_charge = max_charge;
        self
    }

    pub fn isotope_stdev(&mut self, isotope_stdev: f64) -> &mut Self {
        self.isotope_stdev = Some(isotope_stdev);
        self
    }

    pub fn isotope_maximum(&mut self, isotope_maximum: usize) -> &mut Self {
        self.isotope_maximum = isotope_maximum;
        self
    }

    pub fn isotope_distance(&mut self, isotope_distance: f64) -> &mut Self {
        self.isotope_distance = isotope_distance;
        self
    }

    pub fn isotope_trim_right_cutoff(&mut self, cutoff: f64) -> &mut Self {
        self.isotope_trim_right_cutoff = cutoff;
        self
    }

    pub fn lognormal_r(&mut self, r: f64) -> &mut Self {
        self.lognormal_r = r;
        self
    }

    pub fn max_iteration(&mut self, max_iteration: usize) -> &mut Self {
        self.max_iteration = max_iteration;
        self
    }

    pub fn delta_abs_error(&mut self, delta_abs_error: f64) -> &mut Self {
        self.delta_abs_error = delta_abs_error;
        self
    }

    pub fn delta_rel_error(&mut self, delta_rel_error: f64) -> &mut Self {
        self.delta_rel_error = delta_rel_error;
        self
    }

    fn validate(&self) -> Result<(), FitterError> {
        check_positive("interpolation_step", self.interpolation_step)?;
        if let Some(step) = self.offset_step {
            check_positive("offset_step", step)?;
        }
        let tolerance = self.tolerance_stdev_bounding_box;
        if !(tolerance >= 0.0 && tolerance.is_finite()) {
            return Err(invalid(
                "tolerance_stdev_bounding_box",
                tolerance,
                "must be non-negative",
            ));
        }
        if let Some(mean) = self.mean {
            if !mean.is_finite() {
                return Err(invalid("statistics:mean", mean, "must be finite"));
            }
        }
        for (name, variance) in [
            ("statistics:variance", self.variance),
            ("statistics:variance1", self.variance1),
            ("statistics:variance2", self.variance2),
        ] {
            if let Some(variance) = variance {
                check_positive(name, variance)?;
            }
        }
        if let Some(charge) = self.charge {
            if charge < 1 {
                return Err(invalid("charge", charge, "must be at least 1"));
            }
        }
        if self.max_charge < 1 {
            return Err(invalid("max_charge", self.max_charge, "must be at least 1"));
        }
        if let Some(stdev) = self.isotope_stdev {
            check_positive("isotope:stdev", stdev)?;
        }
        if self.isotope_maximum < 1 {
            return Err(invalid("isotope:maximum", self.isotope_maximum, "must be at least 1"));
        }
        check_positive("isotope:distance", self.isotope_distance)?;
        let cutoff = self.isotope_trim_right_cutoff;
        if !(0.0..1.0).contains(&cutoff) {
            return Err(invalid("isotope:trim_right_cutoff", cutoff, "must be in [0, 1)"));
        }
        if !(self.lognormal_r > 1.0 && self.lognormal_r.is_finite()) {
            return Err(invalid("lognormal:r", self.lognormal_r, "must be greater than 1"));
        }
        for (name, tolerance) in [
            ("deltaAbsError", self.delta_abs_error),
            ("deltaRelError", self.delta_rel_error),
        ] {
            if !(tolerance >= 0.0 && tolerance.is_finite()) {
                return Err(invalid(name, tolerance, "must be non-negative"));
            }
        }
        Ok(())
    }

    /// Assemble the config without validation
    fn finish(&self) -> FitterConfig {
        FitterConfig {
            interpolation_step: self.interpolation_step,
            offset_step: self.offset_step.unwrap_or(self.interpolation_step),
            tolerance_stdev_bounding_box: self.tolerance_stdev_bounding_box,
            mean: self.mean,
            variance: self.variance,
            variance1: self.variance1,
            variance2: self.variance2,
            stdev: self.variance.map(f64::sqrt),
            stdev1: self.variance1.map(f64::sqrt),
            stdev2: self.variance2.map(f64::sqrt),
            charge: self.charge,
            max_charge: self.max_charge,
            isotope_stdev: self.isotope_stdev,
            isotope_maximum: self.isotope_maximum,
            isotope_distance: self.isotope_distance,
            isotope_trim_right_cutoff: self.isotope_trim_right_cutoff,
            lognormal_r: self.lognormal_r,
            max_iteration: self.max_iteration,
            delta_abs_error: self.delta_abs_error,
            delta_rel_error: self.delta_rel_error,
        }
    }

    pub fn build(&self) -> Result<FitterConfig, FitterError> {
        self.validate()?;
        Ok(self.finish())
    }
}

impl TryFrom<FitterConfigBuilder> for FitterConfig {
    type Error = FitterError;

    fn try_from(value: FitterConfigBuilder) -> Result<Self, Self::Error> {
        value.build()
    }
}

impl From<FitterConfig> for FitterConfigBuilder {
    fn from(value: FitterConfig) -> Self {
        Self {
            interpolation_step: value.interpolation_step,
            offset_step: Some(value.offset_step),
            tolerance_stdev_bounding_box: value.tolerance_stdev_bounding_box,
            mean: value.mean,
            variance: value.variance,
            variance1: value.variance1,
            variance2: value.variance2,
            charge: value.charge,
            max_charge: value.max_charge,
            isotope_stdev: value.isotope_stdev,
            isotope_maximum: value.isotope_maximum,
            isotope_distance: value.isotope_distance,
            isotope_trim_right_cutoff: value.isotope_trim_right_cutoff,
            lognormal_r: value.lognormal_r,
            max_iteration: value.max_iteration,
            delta_abs_error: value.delta_abs_error,
            delta_rel_error: value.delta_rel_error,
        }
    }
}
