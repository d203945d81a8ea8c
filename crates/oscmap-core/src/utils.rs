//! Common numeric helpers shared by the processing stages.

use ndarray::Array1;

/// Converts degrees to radians.
#[must_use]
pub fn deg_to_rad(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Converts radians to degrees.
#[must_use]
pub fn rad_to_deg(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Median of a slice. Returns `NaN` for an empty slice.
#[must_use]
pub fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in percent. Returns `NaN` for an empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Normalizes values using z-score normalization.
///
/// A constant input maps to all zeros.
#[must_use]
pub fn normalize_zscore(data: &Array1<f64>) -> Array1<f64> {
    let mean = data.mean().unwrap_or(0.0);
    let std = data.std(0.0);

    if std.abs() < f64::EPSILON {
        return Array1::zeros(data.len());
    }

    data.mapv(|x| (x - mean) / std)
}

/// Mean of the last `window` values, or of all values when fewer exist.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trailing_mean(data: &[f64], window: usize) -> f64 {
    if data.is_empty() || window == 0 {
        return f64::NAN;
    }
    let start = data.len().saturating_sub(window);
    let tail = &data[start..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Evenly spaced values `0, 1, ..., n-1` as floats.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn index_axis(n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| i as f64)
}
