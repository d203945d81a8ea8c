//! High/low cycle segmentation of a 1-D trace.
//!
//! Two strategies select the samples that sit near the top and bottom of each
//! cardiogenic cycle:
//!
//! - [`SegmentationMethod::Peaks`]: peaks of the signal and of its negation,
//!   at least `0.6 * peak_distance` apart, each widened into a window of
//!   `ceil(peak_distance * distance_threshold / 2)` samples on either side
//! - [`SegmentationMethod::Threshold`]: z-score above `0.7` (high) or below
//!   `-0.7` (low)
//!
//! Both results are clipped to the signal, deduplicated and sorted. With
//! `same_length` the longer set keeps only its first `min(|high|, |low|)`
//! entries.

use std::collections::BTreeSet;

use ndarray::Array1;
use oscmap_core::utils::normalize_zscore;
use oscmap_core::{CoreError, CoreResult, CycleIndexSet, InputError, SegmentationMethod};
use tracing::debug;

use crate::peaks::find_peaks;

/// Z-score cut-off for the threshold strategy.
pub const ZSCORE_CUTOFF: f64 = 0.7;

/// Fraction of the cycle length used as the minimum peak separation.
const PEAK_SEPARATION_FRACTION: f64 = 0.6;

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn peak_windows(
    signal: &Array1<f64>,
    peak_distance: usize,
    distance_threshold: f64,
) -> CoreResult<(BTreeSet<usize>, BTreeSet<usize>)> {
    let separation = (PEAK_SEPARATION_FRACTION * peak_distance as f64) as usize;
    if separation == 0 {
        return Err(CoreError::configuration(
            "segmentation.peak_distance",
            format!("must be >= 2, got {peak_distance}"),
        ));
    }
    let high_peaks = find_peaks(signal, separation)?;
    let low_peaks = find_peaks(&signal.mapv(|v| -v), separation)?;

    let half = (peak_distance as f64 * distance_threshold / 2.0).ceil() as usize;
    let len = signal.len();
    let widen = |peaks: &[usize]| -> BTreeSet<usize> {
        peaks
            .iter()
            .flat_map(|&p| p.saturating_sub(half)..=(p + half))
            .filter(|&i| i < len)
            .collect()
    };
    debug!(
        high_peaks = high_peaks.len(),
        low_peaks = low_peaks.len(),
        half_width = half,
        "peaks located"
    );
    Ok((widen(&high_peaks), widen(&low_peaks)))
}

fn threshold_sets(signal: &Array1<f64>) -> (BTreeSet<usize>, BTreeSet<usize>) {
    let z = normalize_zscore(signal);
    let pick = |pred: &dyn Fn(f64) -> bool| -> BTreeSet<usize> {
        z.iter()
            .enumerate()
            .filter_map(|(i, &v)| pred(v).then_some(i))
            .collect()
    };
    (
        pick(&|v| v > ZSCORE_CUTOFF),
        pick(&|v| v < -ZSCORE_CUTOFF),
    )
}

/// Finds the high and low sample indices of `signal`.
///
/// `peak_distance` is the expected number of samples per cycle and is only
/// used by the peak strategy.
///
/// # Errors
///
/// - [`InputError::Empty`] if `signal` is empty
/// - [`CoreError::Configuration`] if `peak_distance < 2` with the peak
///   strategy, or `distance_threshold` is negative or non-finite
pub fn find_high_low_indices(
    signal: &Array1<f64>,
    peak_distance: usize,
    distance_threshold: f64,
    same_length: bool,
    method: SegmentationMethod,
) -> CoreResult<CycleIndexSet> {
    if signal.is_empty() {
        return Err(InputError::Empty {
            what: "segmentation signal",
        }
        .into());
    }
    if !(distance_threshold.is_finite() && distance_threshold >= 0.0) {
        return Err(CoreError::configuration(
            "segmentation.distance_threshold",
            format!("must be finite and >= 0, got {distance_threshold}"),
        ));
    }

    let (high, low) = match method {
        SegmentationMethod::Peaks => peak_windows(signal, peak_distance, distance_threshold)?,
        SegmentationMethod::Threshold => threshold_sets(signal),
    };
    let mut high: Vec<usize> = high.into_iter().collect();
    let mut low: Vec<usize> = low.into_iter().collect();
    if same_length {
        let n = high.len().min(low.len());
        high.truncate(n);
        low.truncate(n);
    }

    debug!(
        ?method,
        high = high.len(),
        low = low.len(),
        "high/low indices selected"
    );
    Ok(CycleIndexSet { high, low })
}
