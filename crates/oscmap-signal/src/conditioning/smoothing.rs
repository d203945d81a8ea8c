//! Window-based smoothing filters.
//!
//! All three filters take an odd, positive window. An even or zero window is
//! rejected with [`CoreError::Precondition`] rather than silently adjusted.
//!
//! - [`moving_average_filter`]: mean over fully overlapped windows only, so
//!   the output is `window - 1` samples shorter than the input
//! - [`median_filter`]: centered running median; the `window / 2` samples at
//!   each edge keep their input values
//! - [`smooth`]: length-preserving moving average whose window shrinks
//!   symmetrically near the edges

use ndarray::Array1;
use oscmap_core::utils::median;
use oscmap_core::{CoreError, CoreResult, InputError};

fn check_window(window: usize) -> CoreResult<()> {
    if window == 0 || window % 2 == 0 {
        return Err(CoreError::precondition(format!(
            "window size must be a positive odd integer, got {window}"
        )));
    }
    Ok(())
}

/// Moving average over every complete window.
///
/// # Errors
///
/// - [`CoreError::Precondition`] if `window` is even or zero
/// - [`InputError::InsufficientSamples`] if the signal is shorter than `window`
#[allow(clippy::cast_precision_loss)]
pub fn moving_average_filter(data: &Array1<f64>, window: usize) -> CoreResult<Array1<f64>> {
    check_window(window)?;
    let n = data.len();
    if n < window {
        return Err(InputError::InsufficientSamples {
            required: window,
            available: n,
        }
        .into());
    }

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in data {
        acc += v;
        prefix.push(acc);
    }
    let w = window as f64;
    Ok(Array1::from_shape_fn(n - window + 1, |i| {
        (prefix[i + window] - prefix[i]) / w
    }))
}

/// Centered running median with untouched edges.
///
/// # Errors
///
/// Returns [`CoreError::Precondition`] if `window` is even or zero.
pub fn median_filter(data: &Array1<f64>, window: usize) -> CoreResult<Array1<f64>> {
    check_window(window)?;
    let half = window / 2;
    let n = data.len();
    let mut out = data.clone();
    if n < window {
        return Ok(out);
    }
    let values = data.to_vec();
    for i in half..n - half {
        out[i] = median(&values[i - half..=i + half]);
    }
    Ok(out)
}

/// Length-preserving moving average.
///
/// Interior samples average `window` neighbours; near either edge the window
/// shrinks to the largest odd span that fits (1, 3, 5, ...). A window longer
/// than the signal is reduced to the longest odd span available.
///
/// # Errors
///
/// - [`CoreError::Precondition`] if `window` is even or zero
/// - [`InputError::Empty`] if the signal is empty
#[allow(clippy::cast_precision_loss)]
pub fn smooth(data: &Array1<f64>, window: usize) -> CoreResult<Array1<f64>> {
    check_window(window)?;
    let n = data.len();
    if n == 0 {
        return Err(InputError::Empty {
            what: "smoothing input",
        }
        .into());
    }
    let max_span = if n % 2 == 0 { n - 1 } else { n };
    let half = window.min(max_span) / 2;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in data {
        acc += v;
        prefix.push(acc);
    }
    Ok(Array1::from_shape_fn(n, |i| {
        let h = half.min(i).min(n - 1 - i);
        let (lo, hi) = (i - h, i + h + 1);
        (prefix[hi] - prefix[lo]) / (hi - lo) as f64
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_even_or_zero_window_rejected() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        for w in [0, 2, 4] {
            assert!(matches!(
                moving_average_filter(&x, w),
                Err(CoreError::Precondition { .. })
            ));
            assert!(matches!(
                median_filter(&x, w),
                Err(CoreError::Precondition { .. })
            ));
            assert!(matches!(smooth(&x, w), Err(CoreError::Precondition { .. })));
        }
    }

    #[test]
    fn test_moving_average_valid_region() {
        let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = moving_average_filter(&x, 3).unwrap();
        assert_eq!(y.len(), 3);
        assert_abs_diff_eq!(y[0], 2.0);
        assert_abs_diff_eq!(y[2], 4.0);
    }

    #[test]
    fn test_moving_average_window_one_is_identity() {
        let x = array![3.0, -1.0, 2.0];
        assert_eq!(moving_average_filter(&x, 1).unwrap(), x);
    }

    #[test]
    fn test_moving_average_too_short() {
        let x = array![1.0, 2.0];
        assert!(matches!(
            moving_average_filter(&x, 3),
            Err(CoreError::InvalidInput(InputError::InsufficientSamples { .. }))
        ));
    }

    #[test]
    fn test_median_keeps_edges() {
        let x = array![9.0, 1.0, 8.0, 2.0, 7.0, 3.0, 6.0];
        let y = median_filter(&x, 5).unwrap();
        assert_eq!(y.len(), x.len());
        assert_abs_diff_eq!(y[0], 9.0);
        assert_abs_diff_eq!(y[1], 1.0);
        assert_abs_diff_eq!(y[2], 7.0);
        assert_abs_diff_eq!(y[3], 3.0);
        assert_abs_diff_eq!(y[4], 6.0);
        assert_abs_diff_eq!(y[5], 3.0);
        assert_abs_diff_eq!(y[6], 6.0);
    }

    #[test]
    fn test_median_removes_spike() {
        let x = array![1.0, 1.0, 1.0, 50.0, 1.0, 1.0, 1.0];
        let y = median_filter(&x, 3).unwrap();
        assert_abs_diff_eq!(y[3], 1.0);
    }

    #[test]
    fn test_smooth_matches_shrinking_windows() {
        let x = array![1.0, 2.0, 3.0, 4.0, 10.0];
        let y = smooth(&x, 5).unwrap();
        assert_eq!(y.len(), 5);
        assert_abs_diff_eq!(y[0], 1.0);
        assert_abs_diff_eq!(y[1], 2.0);
        assert_abs_diff_eq!(y[2], 4.0);
        assert_abs_diff_eq!(y[3], 17.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[4], 10.0);
    }

    #[test]
    fn test_smooth_window_longer_than_signal() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = smooth(&x, 9).unwrap();
        assert_abs_diff_eq!(y[1], 2.0);
        assert_abs_diff_eq!(y[2], 3.0);
    }
}
