//! Least-squares solvers.
//!
//! - [`levenberg_marquardt`]: box-bounded nonlinear least squares with
//!   Marquardt diagonal scaling; each trial step is projected onto the bounds.
//! - [`linear_least_squares`]: SVD-based minimum-norm solve of `A x ≈ b`.
//! - [`golden_section_minimize`]: scalar bracketed minimization.
//!
//! # References
//! - Moré (1978), "The Levenberg-Marquardt algorithm: implementation and theory"
//! - Kiefer (1953), "Sequential minimax search for a maximum"

use nalgebra::{DMatrix, DVector};
use oscmap_core::{CoreResult, FitError};
use tracing::{debug, trace};

/// A nonlinear least-squares problem with an analytic Jacobian.
pub trait LeastSquaresProblem {
    /// Number of free parameters.
    fn num_params(&self) -> usize;

    /// Residual vector `model(params) - observed`.
    fn residuals(&self, params: &[f64]) -> DVector<f64>;

    /// Jacobian of the residuals, one row per residual.
    fn jacobian(&self, params: &[f64]) -> DMatrix<f64>;
}

/// Per-parameter box constraints. Infinite values disable a side.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// Lower limits
    pub lower: Vec<f64>,
    /// Upper limits
    pub upper: Vec<f64>,
}

impl Bounds {
    /// No constraints on `n` parameters.
    #[must_use]
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    /// Clamps `x` in place.
    pub fn project(&self, x: &mut DVector<f64>) {
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = xi.clamp(self.lower[i], self.upper[i]);
        }
    }

    fn len(&self) -> usize {
        self.lower.len()
    }
}

/// Termination settings for [`levenberg_marquardt`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquaresOptions {
    /// Relative cost reduction tolerance
    pub ftol: f64,
    /// Relative step size tolerance
    pub xtol: f64,
    /// Gradient infinity-norm tolerance
    pub gtol: f64,
    /// Maximum number of residual evaluations
    pub max_evaluations: usize,
    /// Initial damping factor
    pub initial_damping: f64,
}

impl LeastSquaresOptions {
    /// Tolerances of `1e-8` and a budget of `100 * num_params` evaluations.
    #[must_use]
    pub fn for_params(num_params: usize) -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            max_evaluations: 100 * num_params.max(1),
            initial_damping: 1e-3,
        }
    }
}

/// Outcome of a converged fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquaresResult {
    /// Optimal parameters
    pub params: Vec<f64>,
    /// Final sum of squared residuals
    pub cost: f64,
    /// Residual evaluations used
    pub evaluations: usize,
}

fn sum_sq(r: &DVector<f64>) -> f64 {
    r.norm_squared()
}

fn solve_damped(a: &DMatrix<f64>, g: &DVector<f64>) -> Option<DVector<f64>> {
    let rhs = -g;
    if let Some(chol) = a.clone().cholesky() {
        return Some(chol.solve(&rhs));
    }
    a.clone().svd(true, true).solve(&rhs, 1e-14).ok()
}

/// Indices not held at a bound by the gradient. A parameter at its lower
/// bound with positive gradient (or at its upper bound with negative
/// gradient) would be pushed outside the box by any descent step.
fn free_indices(x: &DVector<f64>, grad: &DVector<f64>, bounds: &Bounds) -> Vec<usize> {
    (0..x.len())
        .filter(|&i| {
            let at_lower = x[i] <= bounds.lower[i] && grad[i] > 0.0;
            let at_upper = x[i] >= bounds.upper[i] && grad[i] < 0.0;
            !(at_lower || at_upper)
        })
        .collect()
}

/// Minimizes `||problem.residuals(x)||²` subject to `bounds`, starting at `x0`.
///
/// # Errors
///
/// Returns [`FitError::DidNotConverge`] when the evaluation budget is
/// exhausted, [`FitError::NonFinite`] if the starting residual is not finite
/// and [`FitError::SingularSystem`] if a damped step cannot be solved.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    x0: &[f64],
    bounds: &Bounds,
    options: &LeastSquaresOptions,
) -> CoreResult<LeastSquaresResult> {
    let n = problem.num_params();
    debug_assert_eq!(x0.len(), n);
    debug_assert_eq!(bounds.len(), n);

    let mut x = DVector::from_column_slice(x0);
    bounds.project(&mut x);

    let mut r = problem.residuals(x.as_slice());
    let mut evaluations = 1;
    let mut cost = sum_sq(&r);
    if !cost.is_finite() {
        return Err(FitError::NonFinite {
            stage: "initial residual",
        }
        .into());
    }

    let mut lambda = options.initial_damping;
    let mut scale = DVector::<f64>::zeros(n);

    let converged = |x: &DVector<f64>, cost: f64, evaluations: usize| LeastSquaresResult {
        params: x.as_slice().to_vec(),
        cost,
        evaluations,
    };

    loop {
        if cost == 0.0 {
            return Ok(converged(&x, cost, evaluations));
        }

        let jac = problem.jacobian(x.as_slice());
        let grad = jac.tr_mul(&r);

        // Parameters on a bound with descent pointing outward stay pinned for
        // this iteration; the step is solved over the remaining ones.
        let free = free_indices(&x, &grad, bounds);
        let projected_grad = free.iter().fold(0.0_f64, |m, &i| m.max(grad[i].abs()));
        if free.is_empty() || projected_grad <= options.gtol {
            debug!(evaluations, cost, "gradient tolerance reached");
            return Ok(converged(&x, cost, evaluations));
        }

        let jtj = jac.tr_mul(&jac);
        for i in 0..n {
            scale[i] = scale[i].max(jtj[(i, i)]).max(1e-12);
        }

        loop {
            if evaluations >= options.max_evaluations {
                return Err(FitError::DidNotConverge { evaluations, cost }.into());
            }

            let m = free.len();
            let damped = DMatrix::from_fn(m, m, |a, b| {
                let v = jtj[(free[a], free[b])];
                if a == b {
                    v + lambda * scale[free[a]]
                } else {
                    v
                }
            });
            let reduced_grad = DVector::from_fn(m, |a, _| grad[free[a]]);
            let reduced = solve_damped(&damped, &reduced_grad).ok_or_else(|| {
                FitError::SingularSystem {
                    message: "damped normal equations".into(),
                }
            })?;
            let mut delta = DVector::<f64>::zeros(n);
            for (a, &i) in free.iter().enumerate() {
                delta[i] = reduced[a];
            }

            let mut x_new = &x + &delta;
            bounds.project(&mut x_new);
            let step = &x_new - &x;
            let step_small = step.norm() <= options.xtol * (options.xtol + x.norm());

            let r_new = problem.residuals(x_new.as_slice());
            evaluations += 1;
            let cost_new = sum_sq(&r_new);
            trace!(evaluations, cost_new, lambda, "trial step");

            if cost_new.is_finite() && cost_new < cost {
                let reduction = cost - cost_new;
                x = x_new;
                r = r_new;
                let previous = cost;
                cost = cost_new;
                lambda = (lambda / 3.0).max(1e-15);

                if reduction <= options.ftol * previous || step_small {
                    debug!(evaluations, cost, "step or cost tolerance reached");
                    return Ok(converged(&x, cost, evaluations));
                }
                break;
            }

            if step_small {
                debug!(evaluations, cost, "no further decrease within step tolerance");
                return Ok(converged(&x, cost, evaluations));
            }
            lambda *= 4.0;
        }
    }
}

/// Minimum-norm least-squares solution of `a * x ≈ b`.
///
/// # Errors
///
/// Returns [`FitError::SingularSystem`] if the SVD cannot be computed.
pub fn linear_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> CoreResult<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    #[allow(clippy::cast_precision_loss)]
    let eps = f64::EPSILON * (a.nrows().max(a.ncols()) as f64) * max_sv;
    svd.solve(b, eps).map_err(|e| {
        FitError::SingularSystem {
            message: e.to_string(),
        }
        .into()
    })
}

/// Minimizes a unimodal scalar function on `[lo, hi]` by golden-section search.
#[must_use]
pub fn golden_section_minimize<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, tol: f64) -> f64 {
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lo, hi);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    while (b - a).abs() > tol {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    0.5 * (a + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// y = a * exp(-b * x)
    struct ExpDecay {
        x: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpDecay {
        fn num_params(&self) -> usize {
            2
        }

        fn residuals(&self, p: &[f64]) -> DVector<f64> {
            DVector::from_iterator(
                self.x.len(),
                self.x
                    .iter()
                    .zip(&self.y)
                    .map(|(&x, &y)| p[0] * (-p[1] * x).exp() - y),
            )
        }

        fn jacobian(&self, p: &[f64]) -> DMatrix<f64> {
            DMatrix::from_fn(self.x.len(), 2, |i, j| {
                let e = (-p[1] * self.x[i]).exp();
                if j == 0 {
                    e
                } else {
                    -p[0] * self.x[i] * e
                }
            })
        }
    }

    fn decay_problem() -> ExpDecay {
        let x: Vec<f64> = (0..50).map(|i| f64::from(i) * 0.1).collect();
        let y = x.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        ExpDecay { x, y }
    }

    #[test]
    fn test_lm_recovers_exponential() {
        let problem = decay_problem();
        let result = levenberg_marquardt(
            &problem,
            &[1.0, 0.1],
            &Bounds::unbounded(2),
            &LeastSquaresOptions::for_params(2),
        )
        .unwrap();
        assert_abs_diff_eq!(result.params[0], 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(result.params[1], 0.7, epsilon = 1e-5);
        assert!(result.cost < 1e-10);
    }

    #[test]
    fn test_lm_respects_bounds() {
        let problem = decay_problem();
        let bounds = Bounds {
            lower: vec![0.0, 0.0],
            upper: vec![2.0, f64::INFINITY],
        };
        let result = levenberg_marquardt(
            &problem,
            &[1.0, 0.1],
            &bounds,
            &LeastSquaresOptions::for_params(2),
        )
        .unwrap();
        assert_abs_diff_eq!(result.params[0], 2.0, epsilon = 1e-12);
        // With `a` pinned at its limit, `b` is stationary.
        let grad = problem
            .jacobian(&result.params)
            .tr_mul(&problem.residuals(&result.params));
        assert!(grad[0] < 0.0, "a should want to grow past its bound");
        assert!(grad[1].abs() < 1e-2, "gradient along b: {}", grad[1]);
        assert_abs_diff_eq!(result.params[1], 0.469_192, epsilon = 1e-4);
        assert!(result.evaluations < 50);
    }

    #[test]
    fn test_lm_converges_on_upper_rate_bound() {
        let problem = decay_problem();
        let bounds = Bounds {
            lower: vec![0.0, 0.0],
            upper: vec![f64::INFINITY, 0.5],
        };
        let result = levenberg_marquardt(
            &problem,
            &[1.0, 0.1],
            &bounds,
            &LeastSquaresOptions::for_params(2),
        )
        .unwrap();
        assert_abs_diff_eq!(result.params[1], 0.5, epsilon = 1e-12);

        // For fixed b the best amplitude is linear: Σ y·e^(-bx) / Σ e^(-2bx).
        let (num, den) = problem.x.iter().zip(&problem.y).fold((0.0, 0.0), |(n, d), (&x, &y)| {
            let e = (-0.5 * x).exp();
            (n + y * e, d + e * e)
        });
        assert_abs_diff_eq!(result.params[0], num / den, epsilon = 1e-6);
    }

    #[test]
    fn test_lm_budget_exhausted() {
        let problem = decay_problem();
        let options = LeastSquaresOptions {
            max_evaluations: 2,
            ..LeastSquaresOptions::for_params(2)
        };
        let err = levenberg_marquardt(&problem, &[1.0, 0.1], &Bounds::unbounded(2), &options)
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_linear_least_squares() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
        let x = linear_least_squares(&a, &b).unwrap();
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_golden_section() {
        let x = golden_section_minimize(|v| (v - 1.25).powi(2), -5.0, 5.0, 1e-9);
        assert_abs_diff_eq!(x, 1.25, epsilon = 1e-6);
    }
}
