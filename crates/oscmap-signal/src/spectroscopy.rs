//! RBC:M ratio calibration from static dissolved-phase spectroscopy.
//!
//! The projection-averaged FID is fitted with a small sum of sinusoids. Each
//! fitted frequency is compared against the offsets expected for the RBC and
//! membrane resonances given the excitation frequency. Components within half
//! the RBC-membrane separation of an expected offset are attributed to that
//! resonance; a decaying line is often fitted by several nearby terms, so the
//! resonance amplitude is the single-sinusoid projection of their sum. The
//! ratio of the two resonance amplitudes is the calibration ratio.
//!
//! A manual ratio in the configuration bypasses the fit entirely.

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use oscmap_core::utils::index_axis;
use oscmap_core::{
    CoreError, CoreResult, FidSeries, FitError, InputError, PipelineConfig, RbcMRatio,
    SineComponent, SineModel, MEMBRANE_SHIFT_PPM, RBC_SHIFT_PPM,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::optimize::linear_least_squares;
use crate::sine_fit::fit_sum_of_sines_at;

/// Smallest model order tried when a fit has to be retried.
const MIN_COMPONENTS: usize = 2;

/// Where a calibration ratio came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioSource {
    /// Taken from the configuration
    Manual,
    /// Fitted from a spectroscopy record
    Spectroscopy,
}

/// A fitted resonance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resonance {
    /// Strongest component attributed to the resonance, frequency in radians
    /// per sample
    pub component: SineComponent,
    /// Frequency of `component` in Hz
    pub frequency_hz: f64,
    /// Expected absolute offset in Hz
    pub expected_hz: f64,
    /// Projected amplitude of all attributed components
    pub amplitude: f64,
    /// Number of attributed components
    pub members: usize,
}

/// Detailed result of a spectroscopic fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectroscopyFit {
    /// RBC resonance
    pub rbc: Resonance,
    /// Membrane resonance
    pub membrane: Resonance,
    /// Every fitted component
    pub components: Vec<SineComponent>,
    /// `rbc.amplitude / membrane.amplitude`
    pub ratio: RbcMRatio,
}

/// Calibration outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Ratio for the Dixon decomposition
    pub ratio: RbcMRatio,
    /// How it was obtained
    pub source: RatioSource,
    /// Fit details when `source` is [`RatioSource::Spectroscopy`]
    pub fit: Option<SpectroscopyFit>,
}

/// Expected absolute frequency offset in Hz of a resonance at `shift_ppm`
/// when exciting at `excitation_ppm` on a scanner at `center_mhz`.
#[must_use]
pub fn expected_offset_hz(shift_ppm: f64, excitation_ppm: f64, center_mhz: f64) -> f64 {
    ((shift_ppm - excitation_ppm) * center_mhz).abs()
}

fn degenerate(message: impl Into<String>) -> CoreError {
    FitError::DegenerateModel {
        message: message.into(),
    }
    .into()
}

/// Fits `n_components` sines, dropping one component at a time while the
/// failure is recoverable.
fn fit_with_retry(
    x: &Array1<f64>,
    signal: &Array1<f64>,
    n_components: usize,
) -> CoreResult<SineModel> {
    let mut rng = rand::thread_rng();
    let mut order = n_components;
    loop {
        match fit_sum_of_sines_at(x, signal, order, &mut rng) {
            Err(err) if err.is_recoverable() && order > MIN_COMPONENTS => {
                warn!(
                    order,
                    error = %err,
                    "spectroscopy fit failed, retrying with fewer components"
                );
                order -= 1;
            }
            other => return other,
        }
    }
}

/// Collapses the components attributed to one resonance into a single
/// amplitude: their summed waveform is projected onto a sinusoid at the
/// strongest member's frequency.
fn resonance(
    x: &Array1<f64>,
    members: &[SineComponent],
    hz_per_rad: f64,
    expected_hz: f64,
) -> CoreResult<Resonance> {
    let dominant = members
        .iter()
        .copied()
        .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
        .ok_or_else(|| {
            degenerate(format!("no fitted component within range of {expected_hz:.1} Hz"))
        })?;

    let waveform = SineModel::new(members.to_vec()).evaluate(x);
    let w = dominant.angular_frequency;
    let design = DMatrix::from_fn(x.len(), 2, |r, c| {
        let arg = w * x[r];
        if c == 0 {
            arg.sin()
        } else {
            arg.cos()
        }
    });
    let target = DVector::from_iterator(x.len(), waveform.iter().copied());
    let coeffs = linear_least_squares(&design, &target)?;

    Ok(Resonance {
        component: dominant,
        frequency_hz: w * hz_per_rad,
        expected_hz,
        amplitude: coeffs[0].hypot(coeffs[1]),
        members: members.len(),
    })
}

/// Fits the RBC:M ratio from a spectroscopy record.
///
/// If the fit fails recoverably it is retried with one component fewer, down
/// to two.
///
/// # Errors
///
/// - [`oscmap_core::CoreError::Configuration`] if `n_components < 2`
/// - [`FitError::DegenerateModel`] if the expected offsets coincide, if no
///   fitted component lies within half their separation of one of them, or
///   if the resonance amplitudes do not give a positive finite ratio
/// - any error from the underlying sine fit
#[instrument(skip(record), fields(projections = record.num_projections(), samples = record.num_samples()))]
pub fn fit_rbc_m_ratio(record: &FidSeries, n_components: usize) -> CoreResult<SpectroscopyFit> {
    if n_components < MIN_COMPONENTS {
        return Err(CoreError::configuration("spectroscopy_components", "must be >= 2"));
    }
    if record.num_samples() < 4 {
        return Err(InputError::InsufficientSamples {
            required: 4,
            available: record.num_samples(),
        }
        .into());
    }

    let meta = record.metadata();
    let rbc_expected =
        expected_offset_hz(RBC_SHIFT_PPM, meta.excitation_ppm, meta.center_frequency_mhz);
    let mem_expected =
        expected_offset_hz(MEMBRANE_SHIFT_PPM, meta.excitation_ppm, meta.center_frequency_mhz);
    let tolerance = 0.5 * (rbc_expected - mem_expected).abs();
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(degenerate(format!(
            "RBC and membrane offsets coincide at {rbc_expected:.1} Hz"
        )));
    }

    let signal: Array1<f64> = record.mean_projection().mapv(|c| c.re);
    let x = index_axis(signal.len());
    let model = fit_with_retry(&x, &signal, n_components)?;

    let hz_per_rad = 1.0 / (2.0 * std::f64::consts::PI * meta.dwell_time_s);
    let mut rbc_members = Vec::new();
    let mut mem_members = Vec::new();
    for c in model.components() {
        let hz = c.angular_frequency * hz_per_rad;
        let (d_rbc, d_mem) = ((hz - rbc_expected).abs(), (hz - mem_expected).abs());
        if d_rbc <= tolerance && d_rbc <= d_mem {
            rbc_members.push(*c);
        } else if d_mem <= tolerance {
            mem_members.push(*c);
        }
    }

    let rbc = resonance(&x, &rbc_members, hz_per_rad, rbc_expected)?;
    let membrane = resonance(&x, &mem_members, hz_per_rad, mem_expected)?;
    let raw = rbc.amplitude / membrane.amplitude;
    let ratio = RbcMRatio::new(raw).map_err(|_| {
        degenerate(format!(
            "amplitude ratio {raw} from rbc {} / membrane {}",
            rbc.amplitude, membrane.amplitude
        ))
    })?;

    info!(
        rbc_hz = rbc.frequency_hz,
        membrane_hz = membrane.frequency_hz,
        components = model.components().len(),
        ratio = ratio.value(),
        "fitted RBC:M ratio from spectroscopy"
    );

    Ok(SpectroscopyFit {
        rbc,
        membrane,
        components: model.components().to_vec(),
        ratio,
    })
}

/// Resolves the RBC:M ratio for a subject.
///
/// A manual override in `config` is returned directly and `record` is never
/// inspected.
///
/// # Errors
///
/// - [`oscmap_core::CoreError::Configuration`] if the override is not positive
/// - [`InputError::Empty`] if no override is set and `record` is `None`
/// - any error from [`fit_rbc_m_ratio`]
pub fn calibrate_rbc_m_ratio(
    config: &PipelineConfig,
    record: Option<&FidSeries>,
) -> CoreResult<Calibration> {
    if let Some(ratio) = config.manual_ratio()? {
        info!(ratio = ratio.value(), "using manual RBC:M ratio");
        return Ok(Calibration {
            ratio,
            source: RatioSource::Manual,
            fit: None,
        });
    }
    let record = record.ok_or(InputError::Empty {
        what: "spectroscopy record",
    })?;
    let fit = fit_rbc_m_ratio(record, config.spectroscopy_components)?;
    Ok(Calibration {
        ratio: fit.ratio,
        source: RatioSource::Spectroscopy,
        fit: Some(fit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use num_complex::Complex64;
    use oscmap_core::AcquisitionMetadata;
    use std::f64::consts::PI;

    fn metadata(excitation_ppm: f64) -> AcquisitionMetadata {
        AcquisitionMetadata {
            dwell_time_s: 1e-4,
            repetition_time_s: 0.015,
            center_frequency_mhz: 40.0,
            excitation_ppm,
        }
    }

    /// RBC 18 ppm above excitation (720 Hz), membrane 3 ppm below (-120 Hz),
    /// plus an optional unrelated line at 2 kHz, all decaying with `t2_s`.
    fn fid(rbc: f64, residual: f64, t2_s: f64) -> FidSeries {
        let meta = metadata(200.0);
        let data = Array2::from_shape_fn((4, 1000), |(_, j)| {
            let t = j as f64 * meta.dwell_time_s;
            let lines = Complex64::from_polar(rbc, 2.0 * PI * 720.0 * t)
                + Complex64::from_polar(1.0, -2.0 * PI * 120.0 * t)
                + Complex64::from_polar(residual, 2.0 * PI * 2000.0 * t + 0.4);
            lines * (-t / t2_s).exp()
        });
        FidSeries::new(data, meta).unwrap()
    }

    fn record() -> FidSeries {
        fid(0.5, 0.3, f64::INFINITY)
    }

    #[test]
    fn test_expected_offsets() {
        assert_abs_diff_eq!(expected_offset_hz(218.0, 200.0, 40.0), 720.0, epsilon = 1e-9);
        assert_abs_diff_eq!(expected_offset_hz(197.0, 200.0, 40.0), 120.0, epsilon = 1e-9);
    }

    #[test]
    fn test_manual_override_skips_fit() {
        let config = PipelineConfig {
            rbc_m_ratio: Some(0.5),
            ..PipelineConfig::default()
        };
        let calibration = calibrate_rbc_m_ratio(&config, None).unwrap();
        assert_eq!(calibration.source, RatioSource::Manual);
        assert_abs_diff_eq!(calibration.ratio.value(), 0.5);
        assert!(calibration.fit.is_none());
    }

    #[test]
    fn test_missing_record_without_override() {
        let err = calibrate_rbc_m_ratio(&PipelineConfig::default(), None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_fitted_ratio() {
        let fit = fit_rbc_m_ratio(&record(), 3).unwrap();
        assert_abs_diff_eq!(fit.rbc.frequency_hz, 720.0, epsilon = 0.5);
        assert_abs_diff_eq!(fit.membrane.frequency_hz, 120.0, epsilon = 0.5);
        assert_abs_diff_eq!(fit.ratio.value(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_calibrate_from_record() {
        let calibration =
            calibrate_rbc_m_ratio(&PipelineConfig::default(), Some(&record())).unwrap();
        assert_eq!(calibration.source, RatioSource::Spectroscopy);
        assert_abs_diff_eq!(calibration.ratio.value(), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_fitted_ratio_on_decaying_fid() {
        for t2 in [0.2, 0.1, 0.05] {
            let fit = fit_rbc_m_ratio(&fid(0.5, 0.3, t2), 3).unwrap();
            println!(
                "T2* {t2}: ratio {:.5} from {} + {} components",
                fit.ratio.value(),
                fit.rbc.members,
                fit.membrane.members
            );
            assert_abs_diff_eq!(fit.ratio.value(), 0.5, epsilon = 5e-3);
            assert_abs_diff_eq!(fit.rbc.frequency_hz, 720.0, epsilon = 5.0);
            assert_abs_diff_eq!(fit.membrane.frequency_hz, 120.0, epsilon = 5.0);
        }
    }

    #[test]
    fn test_two_line_decaying_fid() {
        // A spare third component has no line to settle on; the calibration
        // still lands on the two real resonances.
        let fit = fit_rbc_m_ratio(&fid(0.5, 0.0, 0.2), 3).unwrap();
        assert_abs_diff_eq!(fit.ratio.value(), 0.5, epsilon = 5e-3);
    }

    #[test]
    fn test_missing_rbc_line_is_degenerate() {
        let err = fit_rbc_m_ratio(&fid(0.0, 0.3, f64::INFINITY), 3).unwrap_err();
        assert!(
            matches!(err, CoreError::NumericalFit(FitError::DegenerateModel { .. })),
            "{err:?}"
        );
    }

    #[test]
    fn test_fast_decay_is_not_silently_miscalibrated() {
        // At T2* = 20 ms every term collapses onto the membrane line.
        let err = fit_rbc_m_ratio(&fid(0.5, 0.3, 0.02), 3).unwrap_err();
        assert!(matches!(err, CoreError::NumericalFit(_)), "{err:?}");
    }

    #[test]
    fn test_coinciding_offsets_are_degenerate() {
        // Exciting halfway between the resonances puts both at 420 Hz.
        let data = Array2::from_elem((2, 64), Complex64::new(1.0, 0.0));
        let record = FidSeries::new(data, metadata(207.5)).unwrap();
        let err = fit_rbc_m_ratio(&record, 3).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(err, CoreError::NumericalFit(_)));
    }

    #[test]
    fn test_too_few_components() {
        assert!(fit_rbc_m_ratio(&record(), 1).is_err());
    }
}
