//! Zero-phase Butterworth filtering in second-order sections.
//!
//! Filters are designed digitally: analog prototype poles are pre-warped,
//! frequency-transformed, and mapped through the bilinear transform, then
//! grouped into biquads. Filtering runs forward and backward over an
//! odd-extended copy of the signal, each pass starting from the steady-state
//! section states, so the result has zero phase and no start-up transient.
//!
//! Cutoffs are normalized to the Nyquist frequency (`0 < w < 1`).
//!
//! # References
//! - Oppenheim & Schafer, "Discrete-Time Signal Processing", 3rd ed., §7.1
//! - Gustafsson (1996), "Determining the initial states in forward-backward
//!   filtering", IEEE Trans. Signal Processing 44(4)

use std::f64::consts::PI;

use ndarray::Array1;
use num_complex::Complex64;
use oscmap_core::{CoreError, CoreResult, InputError};

/// Prototype order used by [`bandpass`] and [`lowpass`].
pub const BUTTERWORTH_ORDER: usize = 6;

/// Bilinear transform constant `2·fs` with `fs = 2` (Nyquist-normalized).
const BILINEAR_K: f64 = 4.0;

/// One biquad `b0 + b1 z⁻¹ + b2 z⁻²` over `1 + a1 z⁻¹ + a2 z⁻²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    /// Numerator coefficients
    pub b: [f64; 3],
    /// Denominator coefficients `a1, a2` (`a0 = 1`)
    pub a: [f64; 2],
}

impl Biquad {
    fn from_poles(b: [f64; 3], z1: Complex64, z2: Complex64) -> Self {
        Self {
            b,
            a: [-(z1 + z2).re, (z1 * z2).re],
        }
    }

    fn response(&self, w: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b[0] + z1 * self.b[1] + z2 * self.b[2];
        let den = 1.0 + z1 * self.a[0] + z2 * self.a[1];
        num / den
    }

    fn scale(&mut self, g: f64) {
        for b in &mut self.b {
            *b *= g;
        }
    }

    /// Direct-form II transposed steady-state state for a unit step input.
    fn step_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        let z1 = self.b[2] - self.a[1] * gain;
        let z0 = self.b[1] - self.a[0] * gain + z1;
        [z0, z1]
    }

    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }
}

/// A cascade of [`Biquad`] sections.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

/// Analog Butterworth prototype poles with non-negative imaginary part.
fn prototype_poles(order: usize) -> Vec<Complex64> {
    #[allow(clippy::cast_precision_loss)]
    let n = order as f64;
    (0..(order + 1) / 2)
        .map(|k| {
            #[allow(clippy::cast_precision_loss)]
            let theta = PI * (2.0 * k as f64 + n + 1.0) / (2.0 * n);
            let p = Complex64::from_polar(1.0, theta);
            if (theta - PI).abs() < 1e-12 {
                Complex64::new(-1.0, 0.0)
            } else {
                p
            }
        })
        .collect()
}

fn bilinear(s: Complex64) -> Complex64 {
    (BILINEAR_K + s) / (BILINEAR_K - s)
}

fn prewarp(w: f64) -> f64 {
    BILINEAR_K * (PI * w / 2.0).tan()
}

fn check_cutoff(name: &'static str, w: f64) -> CoreResult<()> {
    if !(w.is_finite() && w > 0.0 && w < 1.0) {
        return Err(CoreError::configuration(
            name,
            format!("normalized cutoff must be in (0, 1), got {w}"),
        ));
    }
    Ok(())
}

impl SosFilter {
    /// Butterworth lowpass of the given order with cutoff `wn`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if `order` is zero or `wn` is not
    /// in `(0, 1)`.
    pub fn butter_lowpass(order: usize, wn: f64) -> CoreResult<Self> {
        if order == 0 {
            return Err(CoreError::configuration("order", "must be > 0"));
        }
        check_cutoff("lowpass cutoff", wn)?;
        let warped = prewarp(wn);

        let sections = prototype_poles(order)
            .into_iter()
            .map(|p| {
                let zp = bilinear(p * warped);
                let mut sec = if p.im.abs() < 1e-12 {
                    Biquad {
                        b: [1.0, 1.0, 0.0],
                        a: [-zp.re, 0.0],
                    }
                } else {
                    Biquad::from_poles([1.0, 2.0, 1.0], zp, zp.conj())
                };
                sec.scale(1.0 / sec.dc_gain());
                sec
            })
            .collect();
        Ok(Self { sections })
    }

    /// Butterworth bandpass from a prototype of the given order, giving a
    /// filter of order `2 * order`, with passband `low..high`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if `order` is zero or the band is
    /// not `0 < low < high < 1`.
    pub fn butter_bandpass(order: usize, low: f64, high: f64) -> CoreResult<Self> {
        if order == 0 {
            return Err(CoreError::configuration("order", "must be > 0"));
        }
        check_cutoff("bandpass low cutoff", low)?;
        check_cutoff("bandpass high cutoff", high)?;
        if low >= high {
            return Err(CoreError::configuration(
                "bandpass cutoffs",
                format!("low {low} must be below high {high}"),
            ));
        }
        let (w1, w2) = (prewarp(low), prewarp(high));
        let bw = w2 - w1;
        let w0 = (w1 * w2).sqrt();
        let center = 2.0 * (w0 / BILINEAR_K).atan();

        let mut sections = Vec::with_capacity(order);
        for p in prototype_poles(order) {
            let half = p * (bw / 2.0);
            let root = (half * half - w0 * w0).sqrt();
            let (s1, s2) = (half + root, half - root);
            if p.im.abs() < 1e-12 {
                sections.push(Biquad::from_poles(
                    [1.0, 0.0, -1.0],
                    bilinear(s1),
                    bilinear(s2),
                ));
            } else {
                for s in [s1, s2] {
                    let z = bilinear(s);
                    sections.push(Biquad::from_poles([1.0, 0.0, -1.0], z, z.conj()));
                }
            }
        }
        for sec in &mut sections {
            let g = sec.response(center).norm();
            sec.scale(1.0 / g);
        }
        let mut filter = Self { sections };
        if filter.response(center).re < 0.0 {
            filter.sections[0].scale(-1.0);
        }
        Ok(filter)
    }

    /// Returns the sections.
    #[must_use]
    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Complex frequency response at normalized angular frequency `w`
    /// (radians per sample).
    #[must_use]
    pub fn response(&self, w: f64) -> Complex64 {
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(w))
    }

    /// Steady-state section states for a unit step input.
    #[must_use]
    pub fn initial_states(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let st = s.step_state();
                let out = [st[0] * scale, st[1] * scale];
                scale *= s.dc_gain();
                out
            })
            .collect()
    }

    /// Runs the cascade over `x` starting from `states`.
    #[must_use]
    pub fn filter_with_states(&self, x: &[f64], mut states: Vec<[f64; 2]>) -> Vec<f64> {
        let mut y = x.to_vec();
        for (sec, z) in self.sections.iter().zip(states.iter_mut()) {
            for v in &mut y {
                let input = *v;
                let out = sec.b[0] * input + z[0];
                z[0] = sec.b[1] * input - sec.a[0] * out + z[1];
                z[1] = sec.b[2] * input - sec.a[1] * out;
                *v = out;
            }
        }
        y
    }

    /// Edge padding used by [`Self::filtfilt`].
    #[must_use]
    pub fn pad_len(&self) -> usize {
        let trivial_b = self.sections.iter().filter(|s| s.b[2] == 0.0).count();
        let trivial_a = self.sections.iter().filter(|s| s.a[1] == 0.0).count();
        3 * (2 * self.sections.len() + 1 - trivial_b.min(trivial_a))
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InsufficientSamples`] if the signal is not longer
    /// than [`Self::pad_len`].
    pub fn filtfilt(&self, x: &Array1<f64>) -> CoreResult<Array1<f64>> {
        let pad = self.pad_len();
        let n = x.len();
        if n <= pad {
            return Err(InputError::InsufficientSamples {
                required: pad + 1,
                available: n,
            }
            .into());
        }

        let (first, last) = (x[0], x[n - 1]);
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
        ext.extend(x.iter().copied());
        ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));

        let zi = self.initial_states();
        let scaled = |v: f64| zi.iter().map(|z| [z[0] * v, z[1] * v]).collect::<Vec<_>>();

        let forward = self.filter_with_states(&ext, scaled(ext[0]));
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let y0 = reversed[0];
        reversed = self.filter_with_states(&reversed, scaled(y0));
        reversed.reverse();

        Ok(Array1::from(reversed[pad..pad + n].to_vec()))
    }
}

/// Sixth-order zero-phase Butterworth bandpass with Nyquist-normalized
/// cutoffs.
///
/// # Errors
///
/// See [`SosFilter::butter_bandpass`] and [`SosFilter::filtfilt`].
pub fn bandpass_normalized(data: &Array1<f64>, low: f64, high: f64) -> CoreResult<Array1<f64>> {
    SosFilter::butter_bandpass(BUTTERWORTH_ORDER, low, high)?.filtfilt(data)
}

/// Sixth-order zero-phase Butterworth lowpass with a Nyquist-normalized
/// cutoff.
///
/// # Errors
///
/// See [`SosFilter::butter_lowpass`] and [`SosFilter::filtfilt`].
pub fn lowpass_normalized(data: &Array1<f64>, high: f64) -> CoreResult<Array1<f64>> {
    SosFilter::butter_lowpass(BUTTERWORTH_ORDER, high)?.filtfilt(data)
}

/// Bandpass with cutoffs in Hz for a signal sampled at `fs` Hz.
///
/// # Errors
///
/// See [`bandpass_normalized`].
pub fn bandpass(
    data: &Array1<f64>,
    lowcut_hz: f64,
    highcut_hz: f64,
    fs: f64,
) -> CoreResult<Array1<f64>> {
    let nyq = 0.5 * fs;
    bandpass_normalized(data, lowcut_hz / nyq, highcut_hz / nyq)
}

/// Lowpass with cutoff in Hz for a signal sampled at `fs` Hz.
///
/// # Errors
///
/// See [`lowpass_normalized`].
pub fn lowpass(data: &Array1<f64>, highcut_hz: f64, fs: f64) -> CoreResult<Array1<f64>> {
    lowpass_normalized(data, highcut_hz / (0.5 * fs))
}
