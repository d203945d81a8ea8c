//! Peak detection and heart-rate estimation.
//!
//! [`find_peaks`] reports strict local maxima (a flat top counts once, at its
//! middle sample; the first and last samples never count), then enforces a
//! minimum separation by keeping the tallest peaks first, and finally drops
//! peaks whose value is not positive.

use ndarray::Array1;
use num_complex::Complex64;
use oscmap_core::{CoreError, CoreResult, InputError};
use rustfft::FftPlanner;
use tracing::debug;

/// Indices of local maxima, plateau midpoints included.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let mut i = 1;
    while i < n - 1 {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Removes peaks closer than `distance` to a taller one.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Positive local maxima at least `distance` samples apart, ascending.
///
/// # Errors
///
/// Returns [`CoreError::Configuration`] if `distance` is zero.
pub fn find_peaks(data: &Array1<f64>, distance: usize) -> CoreResult<Vec<usize>> {
    if distance == 0 {
        return Err(CoreError::configuration(
            "peak_distance",
            "minimum peak separation must be >= 1 sample",
        ));
    }
    let x = data.to_vec();
    let maxima = local_maxima(&x);
    let selected = if distance > 1 {
        select_by_distance(&x, &maxima, distance)
    } else {
        maxima
    };
    Ok(selected.into_iter().filter(|&p| x[p] > 0.0).collect())
}

/// Dominant non-DC frequency of `signal` in beats per minute.
///
/// # Errors
///
/// - [`InputError::InsufficientSamples`] for fewer than two samples
/// - [`CoreError::Precondition`] if `sample_period_s` is not positive
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn heart_rate_bpm(signal: &Array1<f64>, sample_period_s: f64) -> CoreResult<f64> {
    let n = signal.len();
    if n < 2 {
        return Err(InputError::InsufficientSamples {
            required: 2,
            available: n,
        }
        .into());
    }
    if !(sample_period_s.is_finite() && sample_period_s > 0.0) {
        return Err(CoreError::precondition(format!(
            "sample period must be positive, got {sample_period_s}"
        )));
    }

    let mut buffer: Vec<Complex64> = signal.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buffer);

    let mut best = (0.0_f64, 0_usize);
    for (k, value) in buffer.iter().enumerate().skip(1) {
        let magnitude = value.norm();
        if magnitude > best.0 {
            best = (magnitude, k);
        }
    }
    let bin = best.1 as isize;
    let signed = if 2 * best.1 < n { bin } else { bin - n as isize };
    let hz = signed.unsigned_abs() as f64 / (n as f64 * sample_period_s);
    let bpm = hz * 60.0;
    debug!(bin = best.1, bpm, "heart rate estimated");
    Ok(bpm)
}
