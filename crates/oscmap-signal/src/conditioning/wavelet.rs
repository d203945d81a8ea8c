//! Daubechies-4 wavelet soft-threshold denoising.
//!
//! Multi-level discrete wavelet transform with half-sample symmetric edge
//! extension. The noise level is estimated from the finest detail band with
//! the median absolute deviation, then every band (approximation included)
//! is soft-thresholded at that level before reconstruction.
//!
//! Each analysis level produces `floor((n + 7) / 2)` coefficients per band,
//! and each synthesis level produces `2 * len - 6` samples, so the output
//! may be one sample longer than the input.
//!
//! # References
//! - Donoho & Johnstone (1994), "Ideal spatial adaptation by wavelet shrinkage"
//! - Daubechies (1992), "Ten Lectures on Wavelets", Table 6.1

use ndarray::Array1;
use oscmap_core::utils::median;
use oscmap_core::{CoreError, CoreResult, InputError};
use tracing::debug;

/// Daubechies-4 decomposition lowpass filter.
pub const DB4_DEC_LO: [f64; 8] = [
    -0.010_597_401_784_997_278,
    0.032_883_011_666_982_945,
    0.030_841_381_835_986_965,
    -0.187_034_811_718_881_06,
    -0.027_983_769_416_983_85,
    0.630_880_767_929_590_4,
    0.714_846_570_552_541_6,
    0.230_377_813_308_855_14,
];

/// MAD to standard deviation for Gaussian noise.
const MAD_NORMALIZER: f64 = 0.6745;

const FILTER_LEN: usize = DB4_DEC_LO.len();

fn dec_hi() -> [f64; FILTER_LEN] {
    let mut hi = [0.0; FILTER_LEN];
    for (n, h) in hi.iter_mut().enumerate() {
        let sign = if n % 2 == 0 { -1.0 } else { 1.0 };
        *h = sign * DB4_DEC_LO[FILTER_LEN - 1 - n];
    }
    hi
}

/// Half-sample symmetric extension: `... x1 x0 | x0 x1 ... xn-1 | xn-1 xn-2 ...`.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn symmetric(x: &[f64], m: isize) -> f64 {
    let n = x.len() as isize;
    let r = m.rem_euclid(2 * n);
    if r < n {
        x[r as usize]
    } else {
        x[(2 * n - 1 - r) as usize]
    }
}

/// One analysis level. Returns `(approximation, detail)`.
#[allow(clippy::cast_possible_wrap)]
pub fn dwt(x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let hi = dec_hi();
    let out_len = (x.len() + FILTER_LEN - 1) / 2;
    let mut approx = Vec::with_capacity(out_len);
    let mut detail = Vec::with_capacity(out_len);
    for o in 0..out_len {
        let (mut a, mut d) = (0.0, 0.0);
        for j in 0..FILTER_LEN {
            let v = symmetric(x, (2 * o + 1) as isize - j as isize);
            a += DB4_DEC_LO[j] * v;
            d += hi[j] * v;
        }
        approx.push(a);
        detail.push(d);
    }
    (approx, detail)
}

/// One synthesis level; `approx` and `detail` must have equal length.
pub fn idwt(approx: &[f64], detail: &[f64]) -> Vec<f64> {
    let hi = dec_hi();
    let m = approx.len().min(detail.len());
    let out_len = (2 * m).saturating_sub(FILTER_LEN - 2);
    (0..out_len)
        .map(|n| {
            // Coefficient o reaches sample n through filter tap 2o + 1 - n.
            let first = n / 2;
            let last = ((n + FILTER_LEN - 2) / 2).min(m - 1);
            (first..=last)
                .map(|o| {
                    let tap = 2 * o + 1 - n;
                    approx[o] * DB4_DEC_LO[tap] + detail[o] * hi[tap]
                })
                .sum()
        })
        .collect()
}

/// Multi-level decomposition `[cA_level, cD_level, ..., cD_1]`.
///
/// # Errors
///
/// - [`CoreError::Precondition`] if `level` is zero
/// - [`InputError::Empty`] if the signal is empty
pub fn wavedec(signal: &[f64], level: usize) -> CoreResult<Vec<Vec<f64>>> {
    if level == 0 {
        return Err(CoreError::precondition("wavelet level must be >= 1"));
    }
    if signal.is_empty() {
        return Err(InputError::Empty {
            what: "wavelet input",
        }
        .into());
    }
    let mut details = Vec::with_capacity(level);
    let mut approx = signal.to_vec();
    for _ in 0..level {
        let (a, d) = dwt(&approx);
        details.push(d);
        approx = a;
    }
    let mut coeffs = Vec::with_capacity(level + 1);
    coeffs.push(approx);
    coeffs.extend(details.into_iter().rev());
    Ok(coeffs)
}

/// Inverse of [`wavedec`].
///
/// # Errors
///
/// Returns [`InputError::ShapeMismatch`] if adjacent bands differ in length
/// by more than the single trailing sample synthesis can produce.
pub fn waverec(coeffs: &[Vec<f64>]) -> CoreResult<Vec<f64>> {
    let Some((first, details)) = coeffs.split_first() else {
        return Err(InputError::Empty {
            what: "wavelet coefficients",
        }
        .into());
    };
    let mut approx = first.clone();
    for detail in details {
        if approx.len() == detail.len() + 1 {
            approx.pop();
        }
        if approx.len() != detail.len() {
            return Err(InputError::ShapeMismatch {
                expected: vec![detail.len()],
                actual: vec![approx.len()],
            }
            .into());
        }
        approx = idwt(&approx, detail);
    }
    Ok(approx)
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    v.signum() * (v.abs() - t).max(0.0)
}

/// Denoises `signal` with a `level`-deep db4 decomposition.
///
/// The output length may differ from the input by one sample.
///
/// # Errors
///
/// See [`wavedec`].
pub fn wavelet_denoise(signal: &Array1<f64>, level: usize) -> CoreResult<Array1<f64>> {
    let mut coeffs = wavedec(&signal.to_vec(), level)?;
    let finest: Vec<f64> = coeffs
        .last()
        .map(|d| d.iter().map(|v| v.abs()).collect())
        .unwrap_or_default();
    let sigma = median(&finest) / MAD_NORMALIZER;
    debug!(level, sigma, "wavelet noise estimate");

    for band in &mut coeffs {
        for v in band.iter_mut() {
            *v = soft_threshold(*v, sigma);
        }
    }
    Ok(Array1::from(waverec(&coeffs)?))
}
