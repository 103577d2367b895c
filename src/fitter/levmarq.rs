//! Least squares refinement of a [`ParametricShape`] against a signal.
use nalgebra::{DMatrix, DVector};

use crate::data::RawDataArray;
use crate::model::{InterpolationModel, ParametricShape, PeakShape, PeakShapeModel};
use crate::optimize::{LeastSquaresProblem, LevenbergMarquardtReport};

use super::offset::{correlation_quality, shape_bounding_box};
use super::{
    seed_model, FitFailure, FitResult, FitStatus, FitterConfig, FitterError, FAILED_QUALITY,
    MAX_GRID_POINTS,
};

/// The residuals of a shape's density against the observed intensities, with a
/// Jacobian built from the shape's analytic gradient
pub struct ShapeProblem<'a, S: ParametricShape> {
    template: S,
    positions: &'a [f64],
    intensity: &'a [f64],
}

impl<'a, S: ParametricShape> ShapeProblem<'a, S> {
    pub fn new(template: S, positions: &'a [f64], intensity: &'a [f64]) -> Self {
        Self {
            template,
            positions,
            intensity,
        }
    }

    /// The template shape with `params` applied
    pub fn shape_at(&self, params: &DVector<f64>) -> S {
        let mut shape = self.template.clone();
        shape.set_parameters(params);
        shape
    }
}

impl<S: ParametricShape> LeastSquaresProblem for ShapeProblem<'_, S> {
    fn parameter_count(&self) -> usize {
        self.template.parameter_count()
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let shape = self.shape_at(params);
        DVector::from_iterator(
            self.positions.len(),
            self.positions
                .iter()
                .zip(self.intensity.iter())
                .map(|(x, y)| shape.density(*x) - y),
        )
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let shape = self.shape_at(params);
        let p = self.parameter_count();
        let mut jacobian = DMatrix::zeros(self.positions.len(), p);
        let mut row = vec![0.0; p];
        for (i, x) in self.positions.iter().enumerate() {
            shape.gradient(*x, &mut row);
            for (j, v) in row.iter().enumerate() {
                jacobian[(i, j)] = *v;
            }
        }
        jacobian
    }

    fn constrain(&self, params: &mut DVector<f64>) {
        self.template.constrain(params)
    }
}

/// Refine `shape` to minimize its squared error against `data` with the
/// optimizer settings of `config`
pub fn refine_shape<S: ParametricShape>(
    shape: S,
    data: &RawDataArray,
    config: &FitterConfig,
) -> Result<(S, LevenbergMarquardtReport), FitterError> {
    let initial = shape.parameters();
    let problem = ShapeProblem::new(shape, &data.position, &data.intensity);
    let report = config.optimizer().minimize(&problem, initial)?;
    let fitted = problem.shape_at(&report.params);
    Ok((fitted, report))
}

/// Whether `shape` stayed in a region the signal can describe
fn is_plausible<S: PeakShapeModel>(shape: &S, data: &RawDataArray, step: f64) -> bool {
    let margin = data.duration().max(step);
    let center = shape.center();
    let (left, right) = shape.spread();
    center.is_finite()
        && center >= data.first_position() - margin
        && center <= data.last_position() + margin
        && (left + right) / step <= MAX_GRID_POINTS
}

/// Refine a seed shape by least squares and score the result sampled every `step`.
///
/// The seed's model is returned with [`FAILED_QUALITY`] if the optimizer fails or
/// the refined shape is unusable.
pub(crate) fn fit_parametric<S>(
    seed: S,
    data: &RawDataArray,
    config: &FitterConfig,
    step: f64,
) -> Result<FitResult, FitterError>
where
    S: ParametricShape + Into<PeakShape>,
{
    let k = config.tolerance_stdev_bounding_box();
    let seed_box = shape_bounding_box(&seed, data, k, step);
    let seed_fit = match seed_model(seed.clone().into(), seed_box, step)?.or_diverged() {
        Ok(model) => model,
        Err(failed) => return Ok(failed),
    };

    let (fitted, report) = match refine_shape(seed, data, config) {
        Ok(fit) => fit,
        Err(FitterError::Optimizer(err)) => {
            return Ok(FitResult::failed(seed_fit, FitFailure::Optimizer(err), 0))
        }
        Err(err) => return Err(err),
    };

    if fitted.validate().is_err() || !is_plausible(&fitted, data, step) {
        log::debug!("Discarding fitted parameters {:?}", report.params.as_slice());
        return Ok(FitResult::failed(
            seed_fit,
            FitFailure::Diverged,
            report.iterations,
        ));
    }
    let bounding_box = shape_bounding_box(&fitted, data, k, step);
    let model = match InterpolationModel::new(fitted.into(), bounding_box, step) {
        Ok(model) => model,
        Err(err) => {
            log::debug!("Fitted shape could not be sampled: {err}");
            return Ok(FitResult::failed(
                seed_fit,
                FitFailure::Diverged,
                report.iterations,
            ));
        }
    };

    let quality = correlation_quality(&model, data);
    let status = if quality <= FAILED_QUALITY {
        FitStatus::Failed(FitFailure::UndefinedCorrelation)
    } else if report.converged {
        FitStatus::Converged
    } else {
        FitStatus::MaxIterations
    };
    Ok(FitResult::new(model, quality, status, report.iterations))
}
