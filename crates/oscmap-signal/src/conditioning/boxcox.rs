//! Box–Cox power transform and its inverse.
//!
//! `y = (x^λ - 1) / λ` for `λ ≠ 0` and `y = ln x` for `λ = 0`. When no `λ` is
//! given it is chosen by maximizing the profile log-likelihood
//! `(λ - 1)·Σ ln x - n/2 · ln(var(y))`.
//!
//! # References
//! - Box & Cox (1964), "An analysis of transformations", JRSS B 26(2)

use ndarray::Array1;
use oscmap_core::{CoreResult, InputError};
use tracing::debug;

use crate::optimize::golden_section_minimize;

/// Search interval for the maximum-likelihood `λ`.
const LAMBDA_RANGE: (f64, f64) = (-5.0, 5.0);

/// Transformed data and the `λ` used.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxCoxResult {
    /// Transformed values
    pub transformed: Array1<f64>,
    /// Power parameter
    pub lambda: f64,
}

fn is_log(lambda: f64) -> bool {
    lambda.abs() < 1e-12
}

fn check_positive(data: &Array1<f64>) -> CoreResult<()> {
    if data.is_empty() {
        return Err(InputError::Empty {
            what: "Box-Cox input",
        }
        .into());
    }
    if let Some((index, &value)) = data
        .iter()
        .enumerate()
        .find(|(_, v)| !(v.is_finite() && **v > 0.0))
    {
        return Err(InputError::NonPositive { index, value }.into());
    }
    Ok(())
}

fn transform(data: &Array1<f64>, lambda: f64) -> Array1<f64> {
    if is_log(lambda) {
        data.mapv(f64::ln)
    } else {
        data.mapv(|x| (x.powf(lambda) - 1.0) / lambda)
    }
}

/// Profile log-likelihood of `λ`.
#[allow(clippy::cast_precision_loss)]
fn log_likelihood(data: &Array1<f64>, log_sum: f64, lambda: f64) -> f64 {
    let y = transform(data, lambda);
    let var = y.var(0.0);
    (lambda - 1.0) * log_sum - 0.5 * data.len() as f64 * var.ln()
}

/// Box–Cox transform with a fixed `λ`.
///
/// # Errors
///
/// Returns [`InputError::NonPositive`] if any value is not strictly positive.
pub fn boxcox_with_lambda(data: &Array1<f64>, lambda: f64) -> CoreResult<Array1<f64>> {
    check_positive(data)?;
    Ok(transform(data, lambda))
}

/// Box–Cox transform with the maximum-likelihood `λ`.
///
/// # Errors
///
/// - [`InputError::NonPositive`] if any value is not strictly positive
/// - [`InputError::InsufficientSamples`] for fewer than two samples
/// - [`InputError::Degenerate`] if all values are equal
pub fn boxcox(data: &Array1<f64>) -> CoreResult<BoxCoxResult> {
    check_positive(data)?;
    if data.len() < 2 {
        return Err(InputError::InsufficientSamples {
            required: 2,
            available: data.len(),
        }
        .into());
    }
    let log_sum: f64 = data.iter().map(|x| x.ln()).sum();
    if data.iter().all(|&x| x == data[0]) {
        return Err(InputError::Degenerate {
            message: "constant data has no Box-Cox likelihood maximum".into(),
        }
        .into());
    }

    let lambda = golden_section_minimize(
        |l| -log_likelihood(data, log_sum, l),
        LAMBDA_RANGE.0,
        LAMBDA_RANGE.1,
        1e-10,
    );
    debug!(lambda, "box-cox lambda");
    Ok(BoxCoxResult {
        transformed: transform(data, lambda),
        lambda,
    })
}

/// Inverts a Box–Cox transform and subtracts `scale_offset`.
#[must_use]
pub fn inverse_boxcox(lambda: f64, data: &Array1<f64>, scale_offset: f64) -> Array1<f64> {
    if is_log(lambda) {
        data.mapv(|y| y.exp() - scale_offset)
    } else {
        data.mapv(|y| (lambda * y + 1.0).powf(1.0 / lambda) - scale_offset)
    }
}
