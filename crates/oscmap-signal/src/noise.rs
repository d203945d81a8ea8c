//! Additive white Gaussian noise for synthetic test data.

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use oscmap_core::{CoreError, CoreResult, InputError};
use rand::Rng;
use rand_distr::StandardNormal;

#[allow(clippy::cast_precision_loss)]
fn noise_power(signal_power: f64, len: usize, snr_db: f64) -> CoreResult<f64> {
    if len == 0 {
        return Err(InputError::Empty {
            what: "noise target signal",
        }
        .into());
    }
    if !snr_db.is_finite() {
        return Err(CoreError::precondition(format!(
            "SNR must be finite, got {snr_db}"
        )));
    }
    Ok(signal_power / len as f64 / 10f64.powf(snr_db / 10.0))
}

/// Adds real Gaussian noise so that mean signal power over noise power is
/// `snr_db` decibels.
///
/// # Errors
///
/// - [`InputError::Empty`] for an empty signal
/// - [`CoreError::Precondition`] if `snr_db` is not finite
pub fn awgn<R: Rng + ?Sized>(
    signal: &Array1<f64>,
    snr_db: f64,
    rng: &mut R,
) -> CoreResult<Array1<f64>> {
    let power = noise_power(signal.iter().map(|v| v * v).sum(), signal.len(), snr_db)?;
    let sigma = power.sqrt();
    Ok(signal.mapv(|v| v + sigma * rng.sample::<f64, _>(StandardNormal)))
}

/// Complex counterpart of [`awgn`]; noise power is split evenly between the
/// real and imaginary parts.
///
/// # Errors
///
/// See [`awgn`].
pub fn awgn_complex<R: Rng + ?Sized>(
    signal: &Array2<Complex64>,
    snr_db: f64,
    rng: &mut R,
) -> CoreResult<Array2<Complex64>> {
    let power = noise_power(signal.iter().map(Complex64::norm_sqr).sum(), signal.len(), snr_db)?;
    let sigma = (power / 2.0).sqrt();
    Ok(signal.mapv(|v| {
        let re: f64 = rng.sample(StandardNormal);
        let im: f64 = rng.sample(StandardNormal);
        v + Complex64::new(sigma * re, sigma * im)
    }))
}
