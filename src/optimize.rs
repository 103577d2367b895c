//! A Levenberg-Marquardt solver for small dense non-linear least squares problems.
//!
//! Each iteration solves the damped normal equations
//!
//! ```math
//! (J^TJ + \lambda D)\Delta = -J^Tr
//! ```
//!
//! where `r` are the residuals (model minus observed), `J` is their Jacobian
//! and `D` is either the identity or the diagonal of `J^TJ`. A step that
//! lowers the sum of squared residuals is accepted and `λ` shrinks, otherwise
//! it is rejected and `λ` grows.
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A least squares objective with an analytic Jacobian
pub trait LeastSquaresProblem {
    /// The number of free parameters
    fn parameter_count(&self) -> usize;

    /// The per-sample residuals at `params`
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// The partial derivatives of [`LeastSquaresProblem::residuals`], one row
    /// per sample and one column per parameter
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;

    /// Project `params` back into the valid domain after a step
    fn constrain(&self, _params: &mut DVector<f64>) {}
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("Cannot fit {parameters} parameters to {samples} samples")]
    InsufficientData { samples: usize, parameters: usize },
    #[error("The normal equations stayed singular after {retries} retries")]
    NumericSingularity { retries: usize },
    #[error("The residuals are not finite")]
    NonFiniteResidual,
}

/// How the damping term is scaled
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DampingScale {
    /// Damp every parameter equally
    Identity,
    /// Damp each parameter by the curvature along it, making the step
    /// invariant to parameter scale
    #[default]
    Diagonal,
}

/// The outcome of a [`LevenbergMarquardt::minimize`] run
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtReport {
    /// The best parameters found
    pub params: DVector<f64>,
    /// Half the sum of squared residuals at `params`
    pub cost: f64,
    /// The number of iterations run
    pub iterations: usize,
    /// Whether a convergence criterion was met before the iteration limit
    pub converged: bool,
}

/// Solver settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LevenbergMarquardt {
    /// The maximum number of accepted steps
    pub max_iter: usize,
    /// Absolute tolerance on every parameter step
    pub delta_abs_error: f64,
    /// Relative tolerance on every parameter step and on the cost improvement
    pub delta_rel_error: f64,
    pub initial_damping: f64,
    /// The damping above which no further progress is attempted
    pub max_damping: f64,
    /// The number of consecutive failed factorizations tolerated
    pub max_singular_retries: usize,
    pub damping_scale: DampingScale,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iter: 500,
            delta_abs_error: 1e-4,
            delta_rel_error: 1e-4,
            initial_damping: 1e-3,
            max_damping: 1e10,
            max_singular_retries: 10,
            damping_scale: DampingScale::Diagonal,
        }
    }
}

#[inline]
fn half_squared_norm(residuals: &DVector<f64>) -> f64 {
    0.5 * residuals.norm_squared()
}

impl LevenbergMarquardt {
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn delta_abs_error(mut self, delta_abs_error: f64) -> Self {
        self.delta_abs_error = delta_abs_error;
        self
    }

    pub fn delta_rel_error(mut self, delta_rel_error: f64) -> Self {
        self.delta_rel_error = delta_rel_error;
        self
    }

    pub fn initial_damping(mut self, initial_damping: f64) -> Self {
        self.initial_damping = initial_damping;
        self
    }

    pub fn damping_scale(mut self, damping_scale: DampingScale) -> Self {
        self.damping_scale = damping_scale;
        self
    }

    pub fn max_singular_retries(mut self, max_singular_retries: usize) -> Self {
        self.max_singular_retries = max_singular_retries;
        self
    }

    /// Whether every component of `step` is within tolerance of `params`
    fn step_is_small(&self, step: &DVector<f64>, params: &DVector<f64>) -> bool {
        step.iter()
            .zip(params.iter())
            .all(|(d, x)| d.abs() <= self.delta_abs_error + self.delta_rel_error * x.abs())
    }

    fn damped(&self, normal: &DMatrix<f64>, damping: f64) -> DMatrix<f64> {
        let mut damped = normal.clone();
        for i in 0..damped.nrows() {
            let scale = match self.damping_scale {
                DampingScale::Identity => 1.0,
                DampingScale::Diagonal => normal[(i, i)],
            };
            damped[(i, i)] += damping * scale;
        }
        damped
    }

    /// Solve the damped normal equations, `None` when they are singular
    fn solve_step(
        &self,
        normal: &DMatrix<f64>,
        gradient: &DVector<f64>,
        damping: f64,
    ) -> Option<DVector<f64>> {
        let damped = self.damped(normal, damping);
        if damped.diagonal().iter().any(|v| !(*v > 0.0)) {
            return None;
        }
        let step = damped.cholesky()?.solve(&(-gradient));
        if step.iter().all(|v| v.is_finite()) {
            Some(step)
        } else {
            None
        }
    }

    /// Refine `initial` to minimize the squared residuals of `problem`.
    ///
    /// Running out of iterations is not an error, the best parameters seen are
    /// reported with `converged = false`.
    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        initial: DVector<f64>,
    ) -> Result<LevenbergMarquardtReport, OptimizerError> {
        let parameters = problem.parameter_count();
        let mut params = initial;
        problem.constrain(&mut params);

        let mut residuals = problem.residuals(&params);
        let samples = residuals.len();
        if samples < parameters {
            return Err(OptimizerError::InsufficientData {
                samples,
                parameters,
            });
        }
        let mut cost = half_squared_norm(&residuals);
        if !cost.is_finite() {
            return Err(OptimizerError::NonFiniteResidual);
        }

        let mut damping = self.initial_damping;
        let mut singular_retries = 0;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iter && !converged {
            if cost == 0.0 {
                converged = true;
                break;
            }
            let jacobian = problem.jacobian(&params);
            if jacobian.iter().any(|v| !v.is_finite()) {
                return Err(OptimizerError::NonFiniteResidual);
            }
            let gradient = jacobian.tr_mul(&residuals);
            let normal = jacobian.tr_mul(&jacobian);

            // Search for an acceptable step at the current point
            loop {
                let Some(step) = self.solve_step(&normal, &gradient, damping) else {
                    singular_retries += 1;
                    log::trace!("{iterations}: Singular normal equations at damping {damping:0.3e}");
                    if singular_retries > self.max_singular_retries {
                        return Err(OptimizerError::NumericSingularity {
                            retries: singular_retries - 1,
                        });
                    }
                    damping *= 10.0;
                    continue;
                };
                singular_retries = 0;

                let mut candidate = &params + &step;
                problem.constrain(&mut candidate);
                let candidate_residuals = problem.residuals(&candidate);
                let candidate_cost = half_squared_norm(&candidate_residuals);

                if candidate_cost.is_finite() && candidate_cost < cost {
                    let improvement = (cost - candidate_cost) / cost;
                    let taken = &candidate - &params;
                    log::trace!(
                        "{iterations}: Cost = {candidate_cost:0.5e}: Damping = {damping:0.3e}: Params = {:?}",
                        candidate.as_slice()
                    );
                    converged = self.step_is_small(&taken, &candidate)
                        || improvement < self.delta_rel_error;
                    params = candidate;
                    residuals = candidate_residuals;
                    cost = candidate_cost;
                    damping = (damping * 0.1).max(f64::EPSILON);
                    break;
                }

                damping *= 10.0;
                if damping > self.max_damping {
                    // No downhill step exists, this is a local minimum
                    log::trace!("{iterations}: Damping exhausted at cost {cost:0.5e}");
                    converged = true;
                    break;
                }
            }
            iterations += 1;
        }

        Ok(LevenbergMarquardtReport {
            params,
            cost,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// `y = a * exp(-b * x)`
    struct ExponentialDecay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExponentialDecay {
        fn parameter_count(&self) -> usize {
            2
        }

        fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x
                    .iter()
                    .zip(self.y.iter())
                    .map(|(x, y)| params[0] * (-params[1] * x).exp() - y),
            )
        }

        fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_fn(self.x.len(), 2, |i, j| {
                let e = (-params[1] * self.x[i]).exp();
                if j == 0 {
                    e
                } else {
                    -params[0] * self.x[i] * e
                }
            })
        }
    }

    /// `y = a * x`, with a second parameter that has no effect
    struct Redundant {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for Redundant {
        fn parameter_count(&self) -> usize {
            2
        }

        fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x.iter().zip(self.y.iter()).map(|(x, y)| params[0] * x - y),
            )
        }

        fn jacobian(&self, _params: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_fn(self.x.len(), 2, |i, j| if j == 0 { self.x[i] } else { 0.0 })
        }
    }

    fn decay() -> ExponentialDecay {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y = x.iter().map(|x| 5.0 * (-0.3 * x).exp()).collect();
        ExponentialDecay { x, y }
    }

    #[test_log::test]
    fn test_recovers_exponential() {
        let problem = decay();
        let solver = LevenbergMarquardt::default().delta_abs_error(1e-10).delta_rel_error(1e-10);
        let report = solver
            .minimize(&problem, DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap();
        assert!(report.converged);
        assert!((report.params[0] - 5.0).abs() < 1e-4, "{:?}", report);
        assert!((report.params[1] - 0.3).abs() < 1e-5, "{:?}", report);
        assert!(report.cost < 1e-8);
    }

    #[test]
    fn test_iteration_limit_is_not_an_error() {
        let problem = decay();
        let solver = LevenbergMarquardt::default().max_iter(1).delta_rel_error(0.0).delta_abs_error(0.0);
        let report = solver
            .minimize(&problem, DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap();
        assert_eq!(report.iterations, 1);
        assert!(!report.converged);
    }

    #[test]
    fn test_insufficient_data() {
        let problem = ExponentialDecay {
            x: vec![1.0],
            y: vec![2.0],
        };
        let err = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            OptimizerError::InsufficientData {
                samples: 1,
                parameters: 2
            }
        );
    }

    #[test]
    fn test_singular_normal_equations() {
        let problem = Redundant {
            x: vec![1.0, 2.0, 3.0],
            y: vec![2.0, 4.0, 6.0],
        };
        let err = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::NumericSingularity { .. }));

        // Identity damping regularizes the dead parameter
        let report = LevenbergMarquardt::default()
            .damping_scale(DampingScale::Identity)
            .minimize(&problem, DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap();
        assert!((report.params[0] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_non_finite_start() {
        let problem = ExponentialDecay {
            x: vec![1.0, 2.0, 3.0],
            y: vec![1.0, f64::NAN, 1.0],
        };
        let err = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_column_slice(&[1.0, 1.0]))
            .unwrap_err();
        assert_eq!(err, OptimizerError::NonFiniteResidual);
    }
}
