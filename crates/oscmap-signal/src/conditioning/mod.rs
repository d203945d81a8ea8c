//! Composable 1-D signal conditioning.
//!
//! Each transform is available both as a free function in its submodule and
//! as a [`Conditioner`] implementation, so a configured chain of
//! [`ConditioningStep`]s can be built once with [`build_conditioner`] and
//! applied with [`condition`].
//!
//! | Step | Function | Length |
//! |------|----------|--------|
//! | detrend | [`detrend::detrend`] | preserved |
//! | moving average | [`smoothing::moving_average_filter`] | `L - w + 1` |
//! | median | [`smoothing::median_filter`] | preserved |
//! | smooth | [`smoothing::smooth`] | preserved |
//! | bandpass / lowpass | [`butterworth::bandpass`], [`butterworth::lowpass`] | preserved |
//! | wavelet | [`wavelet::wavelet_denoise`] | `L` or `L + 1` |

pub mod boxcox;
pub mod butterworth;
pub mod detrend;
pub mod smoothing;
pub mod wavelet;

use ndarray::Array1;
use oscmap_core::{Conditioner, ConditioningContext, ConditioningStep, CoreResult};
use tracing::debug;

pub use boxcox::{boxcox, boxcox_with_lambda, inverse_boxcox, BoxCoxResult};
pub use butterworth::{bandpass, bandpass_normalized, lowpass, lowpass_normalized, SosFilter};
pub use detrend::{detrend, fit_biexponential};
pub use smoothing::{median_filter, moving_average_filter, smooth};
pub use wavelet::wavelet_denoise;

/// Bi-exponential detrending.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detrend;

impl Conditioner for Detrend {
    fn name(&self) -> &'static str {
        "detrend"
    }

    fn apply(&self, signal: &Array1<f64>, _ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        detrend(signal)
    }
}

/// Valid-region moving average.
#[derive(Debug, Clone, Copy)]
pub struct MovingAverage {
    /// Odd window length
    pub window: usize,
}

impl Conditioner for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn apply(&self, signal: &Array1<f64>, _ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        moving_average_filter(signal, self.window)
    }
}

/// Centered median filter.
#[derive(Debug, Clone, Copy)]
pub struct MedianFilter {
    /// Odd window length
    pub window: usize,
}

impl Conditioner for MedianFilter {
    fn name(&self) -> &'static str {
        "median"
    }

    fn apply(&self, signal: &Array1<f64>, _ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        median_filter(signal, self.window)
    }
}

/// Length-preserving moving average.
#[derive(Debug, Clone, Copy)]
pub struct Smooth {
    /// Odd window length
    pub window: usize,
}

impl Conditioner for Smooth {
    fn name(&self) -> &'static str {
        "smooth"
    }

    fn apply(&self, signal: &Array1<f64>, _ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        smooth(signal, self.window)
    }
}

/// Zero-phase Butterworth bandpass with cutoffs in Hz.
#[derive(Debug, Clone, Copy)]
pub struct Bandpass {
    /// Lower cutoff in Hz
    pub low_hz: f64,
    /// Upper cutoff in Hz
    pub high_hz: f64,
}

impl Conditioner for Bandpass {
    fn name(&self) -> &'static str {
        "bandpass"
    }

    fn apply(&self, signal: &Array1<f64>, ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        bandpass(signal, self.low_hz, self.high_hz, ctx.sample_rate_hz)
    }
}

/// Zero-phase Butterworth lowpass with the cutoff in Hz.
#[derive(Debug, Clone, Copy)]
pub struct Lowpass {
    /// Cutoff in Hz
    pub high_hz: f64,
}

impl Conditioner for Lowpass {
    fn name(&self) -> &'static str {
        "lowpass"
    }

    fn apply(&self, signal: &Array1<f64>, ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        lowpass(signal, self.high_hz, ctx.sample_rate_hz)
    }
}

/// Wavelet soft-threshold denoising.
#[derive(Debug, Clone, Copy)]
pub struct WaveletDenoise {
    /// Decomposition depth
    pub level: usize,
}

impl Conditioner for WaveletDenoise {
    fn name(&self) -> &'static str {
        "wavelet_denoise"
    }

    fn apply(&self, signal: &Array1<f64>, _ctx: &ConditioningContext) -> CoreResult<Array1<f64>> {
        wavelet_denoise(signal, self.level)
    }
}

/// Builds the transform for one configured step.
#[must_use]
pub fn build_conditioner(step: &ConditioningStep) -> Box<dyn Conditioner> {
    match *step {
        ConditioningStep::Detrend => Box::new(Detrend),
        ConditioningStep::MovingAverage { window } => Box::new(MovingAverage { window }),
        ConditioningStep::Median { window } => Box::new(MedianFilter { window }),
        ConditioningStep::Smooth { window } => Box::new(Smooth { window }),
        ConditioningStep::Bandpass { low_hz, high_hz } => Box::new(Bandpass { low_hz, high_hz }),
        ConditioningStep::Lowpass { high_hz } => Box::new(Lowpass { high_hz }),
        ConditioningStep::WaveletDenoise { level } => Box::new(WaveletDenoise { level }),
    }
}

/// Applies `steps` in order.
///
/// # Errors
///
/// Returns the first error raised by any step.
pub fn condition(
    signal: &Array1<f64>,
    steps: &[ConditioningStep],
    ctx: &ConditioningContext,
) -> CoreResult<Array1<f64>> {
    let mut current = signal.clone();
    for step in steps {
        let conditioner = build_conditioner(step);
        let input_len = current.len();
        current = conditioner.apply(&current, ctx)?;
        debug!(
            step = conditioner.name(),
            input_len,
            output_len = current.len(),
            "conditioning step applied"
        );
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscmap_core::CoreError;
    use std::f64::consts::PI;

    #[test]
    fn test_build_matches_step_names() {
        let steps = [
            ConditioningStep::Detrend,
            ConditioningStep::MovingAverage { window: 3 },
            ConditioningStep::Median { window: 3 },
            ConditioningStep::Smooth { window: 3 },
            ConditioningStep::Bandpass {
                low_hz: 0.5,
                high_hz: 2.0,
            },
            ConditioningStep::Lowpass { high_hz: 2.0 },
            ConditioningStep::WaveletDenoise { level: 1 },
        ];
        for step in &steps {
            assert_eq!(build_conditioner(step).name(), step.name());
        }
    }

    #[test]
    fn test_chain_tracks_length_changes() {
        let signal = Array1::from_shape_fn(200, |i| (2.0 * PI * i as f64 / 25.0).sin());
        let ctx = ConditioningContext::from_period(0.015);
        let steps = [
            ConditioningStep::Median { window: 5 },
            ConditioningStep::MovingAverage { window: 5 },
        ];
        let out = condition(&signal, &steps, &ctx).unwrap();
        assert_eq!(out.len(), 196);
    }

    #[test]
    fn test_lowpass_uses_sample_rate() {
        // 1 Hz tone plus 20 Hz ripple sampled at 100 Hz.
        let signal = Array1::from_shape_fn(500, |i| {
            let t = i as f64 / 100.0;
            (2.0 * PI * t).sin() + 0.5 * (2.0 * PI * 20.0 * t).sin()
        });
        let ctx = ConditioningContext::from_period(0.01);
        let out = condition(&signal, &[ConditioningStep::Lowpass { high_hz: 5.0 }], &ctx).unwrap();
        let mid = 250;
        let expected = (2.0 * PI * mid as f64 / 100.0).sin();
        assert!((out[mid] - expected).abs() < 0.05);
    }

    #[test]
    fn test_error_stops_chain() {
        let signal = Array1::from_elem(10, 1.0);
        let ctx = ConditioningContext::from_period(1.0);
        let steps = [
            ConditioningStep::Smooth { window: 3 },
            ConditioningStep::Median { window: 2 },
        ];
        assert!(matches!(
            condition(&signal, &steps, &ctx),
            Err(CoreError::Precondition { .. })
        ));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let signal = Array1::from(vec![1.0, 2.0, 3.0]);
        let ctx = ConditioningContext::from_period(1.0);
        assert_eq!(condition(&signal, &[], &ctx).unwrap(), signal);
    }
}
