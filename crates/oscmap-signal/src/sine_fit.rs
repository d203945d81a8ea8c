//! Sum-of-sines fitting.
//!
//! Fits `y = Σ aₖ·sin(ωₖ·x + φₖ)` by bounded nonlinear least squares. The
//! starting point comes from a greedy spectral search: each new term takes the
//! strongest FFT bin of the current residual that no earlier term has
//! claimed, then all amplitudes and phases found so far are re-estimated
//! together with a linear sine/cosine regression.
//!
//! # References
//! - MATLAB Curve Fitting Toolbox, `sin` library model start points

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use num_complex::Complex64;
use oscmap_core::utils::index_axis;
use oscmap_core::{CoreError, CoreResult, InputError, SineModel};
use rand::Rng;
use rustfft::FftPlanner;
use tracing::{debug, warn};

use crate::optimize::{
    levenberg_marquardt, linear_least_squares, Bounds, LeastSquaresOptions, LeastSquaresProblem,
};

/// Number of components used by [`fit_sine`].
pub const DEFAULT_SINE_COMPONENTS: usize = 8;

/// Sum-of-sines residual over fixed sample points.
struct SineProblem<'a> {
    x: &'a [f64],
    y: &'a [f64],
    n_components: usize,
}

impl LeastSquaresProblem for SineProblem<'_> {
    fn num_params(&self) -> usize {
        3 * self.n_components
    }

    fn residuals(&self, p: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y).map(|(&x, &y)| {
                let model: f64 = p
                    .chunks_exact(3)
                    .map(|c| c[0] * (c[1] * x + c[2]).sin())
                    .sum();
                model - y
            }),
        )
    }

    fn jacobian(&self, p: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.x.len(), p.len());
        for (i, &x) in self.x.iter().enumerate() {
            for (k, c) in p.chunks_exact(3).enumerate() {
                let arg = c[1] * x + c[2];
                let (s, co) = arg.sin_cos();
                jac[(i, 3 * k)] = s;
                jac[(i, 3 * k + 1)] = c[0] * x * co;
                jac[(i, 3 * k + 2)] = c[0] * co;
            }
        }
        jac
    }
}

/// Box constraints for `n` components: amplitude and frequency non-negative,
/// phase free.
#[must_use]
pub fn sine_bounds(n_components: usize) -> Bounds {
    let lower = [0.0, 0.0, f64::NEG_INFINITY]
        .iter()
        .copied()
        .cycle()
        .take(3 * n_components)
        .collect();
    Bounds {
        lower,
        upper: vec![f64::INFINITY; 3 * n_components],
    }
}

/// Sorts samples by `x` and drops repeated abscissae, keeping the first.
fn sorted_unique(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(f64, f64)> = x
        .iter()
        .copied()
        .zip(y.iter().copied())
        .filter(|(xi, yi)| xi.is_finite() && yi.is_finite())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.dedup_by(|cur, prev| cur.0 == prev.0);
    pairs.into_iter().unzip()
}

/// Index of the strongest unclaimed bin in `1..len/2`, or `None` when that
/// range is empty.
fn dominant_bin(residual: &[f64], claimed: &[usize]) -> Option<usize> {
    let n = residual.len();
    let mut buffer: Vec<Complex64> = residual.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buffer);
    for &k in claimed {
        buffer[k] = Complex64::new(0.0, 0.0);
    }
    (1..n / 2).fold(None, |best: Option<usize>, k| match best {
        Some(b) if buffer[b].norm() >= buffer[k].norm() => Some(b),
        _ => Some(k),
    })
}

/// Starting parameters `[a0, w0, p0, ...]` for an `n_components` fit.
///
/// With fewer than two distinct abscissae no spectrum can be estimated and
/// uniform random values in `[0, 1)` are returned instead.
///
/// # Errors
///
/// Returns an error if the linear sub-problem cannot be solved.
pub fn sine_seed<R: Rng + ?Sized>(
    x: &[f64],
    y: &[f64],
    n_components: usize,
    rng: &mut R,
) -> CoreResult<Vec<f64>> {
    let (x, y) = sorted_unique(x, y);
    if x.len() < 2 {
        warn!(
            samples = x.len(),
            "too few distinct samples for a spectral seed, using random start"
        );
        return Ok((0..3 * n_components).map(|_| rng.gen::<f64>()).collect());
    }

    let n = x.len();
    let span = x[n - 1] - x[0];
    let y_vec = DVector::from_column_slice(&y);

    let mut claimed = Vec::with_capacity(n_components);
    let mut freqs = Vec::with_capacity(n_components);
    let mut residual = y.clone();
    let mut coeffs = DVector::zeros(0);

    for i in 0..n_components {
        let bin = dominant_bin(&residual, &claimed);
        if let Some(k) = bin {
            claimed.push(k);
        }
        #[allow(clippy::cast_precision_loss)]
        let bin_f = bin.map_or(0.5, |k| k as f64).max(0.5);
        let w = 2.0 * std::f64::consts::PI * bin_f / span;
        freqs.push(w);

        let design = DMatrix::from_fn(n, 2 * (i + 1), |r, c| {
            let arg = freqs[c / 2] * x[r];
            if c % 2 == 0 {
                arg.sin()
            } else {
                arg.cos()
            }
        });
        coeffs = linear_least_squares(&design, &y_vec)?;
        let fitted = &design * &coeffs;
        residual = y.iter().zip(fitted.iter()).map(|(a, b)| a - b).collect();
    }

    let seed = freqs
        .iter()
        .enumerate()
        .flat_map(|(i, &w)| {
            let (s, c) = (coeffs[2 * i], coeffs[2 * i + 1]);
            [s.hypot(c), w, c.atan2(s)]
        })
        .collect();
    Ok(seed)
}

/// Fits `n_components` sinusoids to samples `(x, y)`.
///
/// # Errors
///
/// - [`InputError::ShapeMismatch`] if `x` and `y` differ in length
/// - [`InputError::Empty`] if there are no samples
/// - [`CoreError::Configuration`] if `n_components` is zero
/// - [`oscmap_core::FitError`] if the optimizer does not converge
pub fn fit_sum_of_sines_at<R: Rng + ?Sized>(
    x: &Array1<f64>,
    y: &Array1<f64>,
    n_components: usize,
    rng: &mut R,
) -> CoreResult<SineModel> {
    if x.len() != y.len() {
        return Err(InputError::ShapeMismatch {
            expected: vec![x.len()],
            actual: vec![y.len()],
        }
        .into());
    }
    if y.is_empty() {
        return Err(InputError::Empty { what: "sine fit signal" }.into());
    }
    if n_components == 0 {
        return Err(CoreError::configuration("n_components", "must be > 0"));
    }

    let (xs, ys) = sorted_unique(&x.to_vec(), &y.to_vec());
    let seed = sine_seed(&xs, &ys, n_components, rng)?;
    if xs.len() < 2 {
        return SineModel::from_params(&seed);
    }

    let problem = SineProblem {
        x: &xs,
        y: &ys,
        n_components,
    };
    let options = LeastSquaresOptions::for_params(problem.num_params());
    let result = levenberg_marquardt(&problem, &seed, &sine_bounds(n_components), &options)?;
    debug!(
        n_components,
        cost = result.cost,
        evaluations = result.evaluations,
        "sum-of-sines fit converged"
    );
    SineModel::from_params(&result.params)
}

/// Fits `n_components` sinusoids to a uniformly sampled signal, using the
/// sample index as the independent variable.
///
/// # Errors
///
/// See [`fit_sum_of_sines_at`].
pub fn fit_sum_of_sines(signal: &Array1<f64>, n_components: usize) -> CoreResult<SineModel> {
    let x = index_axis(signal.len());
    fit_sum_of_sines_at(&x, signal, n_components, &mut rand::thread_rng())
}

/// Fits an `n_components` sine sum and returns the fitted curve.
///
/// # Errors
///
/// See [`fit_sum_of_sines_at`].
pub fn fit_sine_with(signal: &Array1<f64>, n_components: usize) -> CoreResult<Array1<f64>> {
    let model = fit_sum_of_sines(signal, n_components)?;
    Ok(model.evaluate(&index_axis(signal.len())))
}

/// Fits an eight-term sine sum and returns the fitted curve.
///
/// # Errors
///
/// See [`fit_sum_of_sines_at`].
pub fn fit_sine(signal: &Array1<f64>) -> CoreResult<Array1<f64>> {
    fit_sine_with(signal, DEFAULT_SINE_COMPONENTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn two_tone(n: usize) -> Array1<f64> {
        index_axis(n).mapv(|t| {
            2.0 * (2.0 * PI * 10.0 * t / 256.0 + 0.3).sin()
                + 0.8 * (2.0 * PI * 23.0 * t / 256.0 - 1.1).sin()
        })
    }

    #[test]
    fn test_bounds_layout() {
        let b = sine_bounds(2);
        assert_eq!(b.lower.len(), 6);
        assert_eq!(b.lower[0], 0.0);
        assert_eq!(b.lower[1], 0.0);
        assert!(b.lower[2].is_infinite());
        assert!(b.upper.iter().all(|u| u.is_infinite()));
    }

    #[test]
    fn test_seed_finds_dominant_tones() {
        let y = two_tone(256);
        let x = index_axis(256);
        let mut rng = StdRng::seed_from_u64(1);
        let seed = sine_seed(x.as_slice().unwrap(), y.as_slice().unwrap(), 2, &mut rng).unwrap();
        // Bin spacing uses the sample span (255), not the record length.
        assert_abs_diff_eq!(seed[1], 2.0 * PI * 10.0 / 255.0, epsilon = 1e-12);
        assert_abs_diff_eq!(seed[4], 2.0 * PI * 23.0 / 255.0, epsilon = 1e-12);
        assert!(seed[0] > seed[3]);
    }

    #[test]
    fn test_seed_degenerate_is_random() {
        let mut rng = StdRng::seed_from_u64(7);
        let seed = sine_seed(&[1.0, 1.0, 1.0], &[0.5, 0.2, 0.1], 3, &mut rng).unwrap();
        assert_eq!(seed.len(), 9);
        assert!(seed.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_fit_recovers_two_tones() {
        let y = two_tone(256);
        let model = fit_sum_of_sines(&y, 2).unwrap();
        let fitted = model.evaluate(&index_axis(256));
        let rms = ((&fitted - &y).mapv(|v| v * v).sum() / 256.0).sqrt();
        assert!(rms < 1e-3, "rms residual {rms}");

        let mut amps: Vec<f64> = model.components().iter().map(|c| c.amplitude).collect();
        amps.sort_by(f64::total_cmp);
        assert_abs_diff_eq!(amps[0], 0.8, epsilon = 1e-3);
        assert_abs_diff_eq!(amps[1], 2.0, epsilon = 1e-3);
        assert!(model.components().iter().all(|c| c.angular_frequency >= 0.0));
    }

    #[test]
    fn test_fit_length_mismatch() {
        let x = index_axis(5);
        let y = Array1::zeros(4);
        let err = fit_sum_of_sines_at(&x, &y, 1, &mut rand::thread_rng()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_fit_zero_components() {
        assert!(fit_sum_of_sines(&two_tone(32), 0).is_err());
    }

    #[test]
    fn test_fit_sine_with_component_count() {
        let y = two_tone(256);
        let fitted = fit_sine_with(&y, 2).unwrap();
        let rms = ((&fitted - &y).mapv(|v| v * v).sum() / 256.0).sqrt();
        assert!(rms < 1e-3, "rms residual {rms}");
        assert!(fit_sine_with(&y, 0).is_err());
    }

    #[test]
    fn test_fit_sine_preserves_length() {
        let y = two_tone(128);
        let fitted = fit_sine(&y).unwrap();
        assert_eq!(fitted.len(), 128);
    }
}
