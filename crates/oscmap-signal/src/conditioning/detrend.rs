//! Bi-exponential detrending.
//!
//! Fits `a·exp(-b·x) + c·exp(-d·x)` over the sample index and subtracts the
//! fitted curve, removing the hyperpolarization decay from a k0 trace while
//! keeping the cardiogenic oscillation on top of it.

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use oscmap_core::utils::index_axis;
use oscmap_core::{CoreResult, InputError};
use tracing::debug;

use crate::optimize::{levenberg_marquardt, Bounds, LeastSquaresOptions, LeastSquaresProblem};

/// Starting point `[a, b, c, d]`.
pub const DETREND_SEED: [f64; 4] = [1.0, 0.1, 1.0, 0.1];

/// Termination settings for the decay fit.
pub const DETREND_OPTIONS: LeastSquaresOptions = LeastSquaresOptions {
    ftol: 1e-6,
    xtol: 1e-6,
    gtol: 1e-8,
    max_evaluations: 600,
    initial_damping: 1e-3,
};

struct BiExponential<'a> {
    x: &'a [f64],
    y: &'a [f64],
}

impl BiExponential<'_> {
    fn eval(p: &[f64], x: f64) -> f64 {
        p[0] * (-p[1] * x).exp() + p[2] * (-p[3] * x).exp()
    }
}

impl LeastSquaresProblem for BiExponential<'_> {
    fn num_params(&self) -> usize {
        4
    }

    fn residuals(&self, p: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.x.len(),
            self.x
                .iter()
                .zip(self.y)
                .map(|(&x, &y)| Self::eval(p, x) - y),
        )
    }

    fn jacobian(&self, p: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(self.x.len(), 4, |i, j| {
            let x = self.x[i];
            match j {
                0 => (-p[1] * x).exp(),
                1 => -p[0] * x * (-p[1] * x).exp(),
                2 => (-p[3] * x).exp(),
                _ => -p[2] * x * (-p[3] * x).exp(),
            }
        })
    }
}

/// Fits the bi-exponential decay and returns `[a, b, c, d]`.
///
/// # Errors
///
/// - [`InputError::InsufficientSamples`] for fewer than 4 samples
/// - [`oscmap_core::FitError::DidNotConverge`] if the fit does not converge
///   within 600 evaluations
pub fn fit_biexponential(signal: &Array1<f64>) -> CoreResult<[f64; 4]> {
    if signal.len() < 4 {
        return Err(InputError::InsufficientSamples {
            required: 4,
            available: signal.len(),
        }
        .into());
    }
    let x = index_axis(signal.len()).to_vec();
    let y = signal.to_vec();
    let problem = BiExponential { x: &x, y: &y };
    let result = levenberg_marquardt(
        &problem,
        &DETREND_SEED,
        &Bounds::unbounded(4),
        &DETREND_OPTIONS,
    )?;
    debug!(
        params = ?result.params,
        cost = result.cost,
        evaluations = result.evaluations,
        "bi-exponential trend fitted"
    );
    Ok([
        result.params[0],
        result.params[1],
        result.params[2],
        result.params[3],
    ])
}

/// Removes the fitted bi-exponential trend from `signal`.
///
/// # Errors
///
/// See [`fit_biexponential`].
pub fn detrend(signal: &Array1<f64>) -> CoreResult<Array1<f64>> {
    let p = fit_biexponential(signal)?;
    let x = index_axis(signal.len());
    Ok(signal - &x.mapv(|xi| BiExponential::eval(&p, xi)))
}
