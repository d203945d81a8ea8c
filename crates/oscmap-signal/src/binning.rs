//! Oscillation-amplitude binning.
//!
//! The image is divided by a high percentile of its in-mask values so that
//! subjects and scanners share one scale, then each foreground pixel is
//! placed in the class of [`BinThresholds::classify`]. Pixels outside the mask
//! or with non-finite values are background (class 0).

use ndarray::{Array, Dimension, Zip};
use oscmap_core::utils::percentile;
use oscmap_core::{BinThresholds, BinnedImage, CoreError, CoreResult, InputError};
use tracing::info;

/// Rescales `image` and assigns every foreground pixel a class.
///
/// # Errors
///
/// - [`InputError::ShapeMismatch`] if `mask` and `image` differ in shape
/// - [`CoreError::Configuration`] if `rescale_percentile` is outside `(0, 100]`
/// - [`InputError::Empty`] if no masked pixel is finite
/// - [`InputError::Degenerate`] if the rescaling percentile is not positive
pub fn assign_bins<D: Dimension>(
    image: &Array<f64, D>,
    mask: &Array<bool, D>,
    thresholds: &BinThresholds,
    rescale_percentile: f64,
) -> CoreResult<BinnedImage<D>> {
    if image.shape() != mask.shape() {
        return Err(InputError::ShapeMismatch {
            expected: image.shape().to_vec(),
            actual: mask.shape().to_vec(),
        }
        .into());
    }
    if !(rescale_percentile.is_finite() && rescale_percentile > 0.0 && rescale_percentile <= 100.0)
    {
        return Err(CoreError::configuration(
            "binning.rescale_percentile",
            format!("must be in (0, 100], got {rescale_percentile}"),
        ));
    }

    let foreground = Zip::from(image)
        .and(mask)
        .map_collect(|&v, &m| m && v.is_finite());
    let values: Vec<f64> = image
        .iter()
        .zip(foreground.iter())
        .filter_map(|(&v, &fg)| fg.then_some(v))
        .collect();
    if values.is_empty() {
        return Err(InputError::Empty {
            what: "masked image pixels",
        }
        .into());
    }
    let scale = percentile(&values, rescale_percentile);
    if !(scale.is_finite() && scale > 0.0) {
        return Err(InputError::Degenerate {
            message: format!(
                "{rescale_percentile}th percentile of masked pixels is {scale}, cannot rescale"
            ),
        }
        .into());
    }

    let rescaled = image.mapv(|v| v / scale);
    let bins = Zip::from(&rescaled)
        .and(&foreground)
        .map_collect(|&v, &fg| if fg { thresholds.classify(v) } else { 0 });

    let binned = BinnedImage {
        rescaled,
        bins,
        foreground,
        thresholds: thresholds.clone(),
    };
    info!(
        pixels = values.len(),
        scale,
        fractions = ?binned.class_fractions(),
        "oscillation image binned"
    );
    Ok(binned)
}
