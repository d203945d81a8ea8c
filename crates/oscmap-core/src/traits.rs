//! Core trait definitions.
//!
//! - [`Conditioner`]: a composable 1-D transform applied to a time series
//!   before segmentation

use ndarray::Array1;

use crate::error::CoreResult;

/// Sampling information passed to every [`Conditioner`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditioningContext {
    /// Samples per second of the series being conditioned
    pub sample_rate_hz: f64,
}

impl ConditioningContext {
    /// Context for a series sampled every `period_s` seconds.
    #[must_use]
    pub fn from_period(period_s: f64) -> Self {
        Self {
            sample_rate_hz: 1.0 / period_s,
        }
    }

    /// Nyquist frequency in Hz.
    #[must_use]
    pub fn nyquist_hz(&self) -> f64 {
        0.5 * self.sample_rate_hz
    }
}

/// A 1-D signal transform.
///
/// Implementations are stateless; the output length may differ from the
/// input length (valid-region filters, wavelet edge effects), so callers must
/// not assume shape preservation.
///
/// # Example
///
/// ```ignore
/// use oscmap_core::{Conditioner, ConditioningContext};
///
/// fn run(steps: &[Box<dyn Conditioner>], x: ndarray::Array1<f64>) -> oscmap_core::CoreResult<ndarray::Array1<f64>> {
///     let ctx = ConditioningContext::from_period(0.015);
///     steps.iter().try_fold(x, |acc, s| s.apply(&acc, &ctx))
/// }
/// ```
pub trait Conditioner: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Transforms `signal`.
    ///
    /// # Errors
    ///
    /// Returns an error if a precondition on the input or parameters is
    /// violated, or if an internal fit fails.
    fn apply(&self, signal: &Array1<f64>, ctx: &ConditioningContext) -> CoreResult<Array1<f64>>;
}
