//! Core data types for dissolved-phase signal processing.
//!
//! # Type Categories
//!
//! - **Acquisition Types**: [`FidSeries`], [`AcquisitionMetadata`], [`DissolvedAcquisition`]
//! - **Model Types**: [`SineModel`], [`SineComponent`], [`ContaminationParameters`], [`RbcMRatio`]
//! - **Result Types**: [`DixonChannels`], [`CycleIndexSet`], [`BinThresholds`], [`BinnedImage`]

use ndarray::{Array, Array1, Array2, Dimension, Zip};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, InputError};

// =============================================================================
// Acquisition Types
// =============================================================================

/// Scalar acquisition parameters attached to every FID record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    /// Dwell time between sample points in seconds
    pub dwell_time_s: f64,
    /// Repetition time between projections in seconds
    pub repetition_time_s: f64,
    /// Scanner center frequency in MHz
    pub center_frequency_mhz: f64,
    /// Excitation frequency offset from the gas resonance in ppm
    pub excitation_ppm: f64,
}

impl AcquisitionMetadata {
    /// Checks that all timing and frequency values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if any time is non-positive or any
    /// value is non-finite.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.dwell_time_s.is_finite() && self.dwell_time_s > 0.0) {
            return Err(CoreError::configuration("dwell_time_s", "must be finite and > 0"));
        }
        if !(self.repetition_time_s.is_finite() && self.repetition_time_s > 0.0) {
            return Err(CoreError::configuration(
                "repetition_time_s",
                "must be finite and > 0",
            ));
        }
        if !self.center_frequency_mhz.is_finite() || !self.excitation_ppm.is_finite() {
            return Err(CoreError::configuration(
                "center_frequency_mhz",
                "frequencies must be finite",
            ));
        }
        Ok(())
    }
}

/// Complex free-induction-decay data with axes (projection, sample point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidSeries {
    data: Array2<Complex64>,
    metadata: AcquisitionMetadata,
}

impl FidSeries {
    /// Wraps raw FID samples.
    ///
    /// # Errors
    ///
    /// Returns an error if the array is empty or the metadata is invalid.
    pub fn new(data: Array2<Complex64>, metadata: AcquisitionMetadata) -> CoreResult<Self> {
        if data.is_empty() {
            return Err(InputError::Empty { what: "FID series" }.into());
        }
        metadata.validate()?;
        Ok(Self { data, metadata })
    }

    /// Returns the complex samples.
    #[must_use]
    pub fn data(&self) -> &Array2<Complex64> {
        &self.data
    }

    /// Returns the acquisition metadata.
    #[must_use]
    pub fn metadata(&self) -> &AcquisitionMetadata {
        &self.metadata
    }

    /// Number of projections (rows).
    #[must_use]
    pub fn num_projections(&self) -> usize {
        self.data.nrows()
    }

    /// Number of sample points per projection (columns).
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Sample-point time axis in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_axis(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.num_samples(), |i| i as f64 * self.metadata.dwell_time_s)
    }

    /// First sample of every projection.
    #[must_use]
    pub fn k0(&self) -> Array1<Complex64> {
        self.data.column(0).to_owned()
    }

    /// FID averaged over all projections.
    #[must_use]
    pub fn mean_projection(&self) -> Array1<Complex64> {
        self.data
            .mean_axis(ndarray::Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.num_samples()))
    }

    /// Consumes the series, returning the raw samples.
    #[must_use]
    pub fn into_data(self) -> Array2<Complex64> {
        self.data
    }
}

/// One-point Dixon dissolved-phase record.
///
/// Only the FID samples, gas samples and timing fields are consumed by the
/// processing engine. The remaining fields are carried for downstream
/// reconstruction and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DissolvedAcquisition {
    /// Dissolved-phase FID samples
    pub dissolved: FidSeries,
    /// Gas-phase FID samples, same shape as `dissolved`
    pub gas: Array2<Complex64>,
    /// Gas excitation flip angle in degrees
    pub flip_angle_gas_deg: f64,
    /// Dissolved excitation flip angle in degrees
    pub flip_angle_dissolved_deg: f64,
    /// Field of view in centimetres
    pub fov_cm: f64,
    /// Slice orientation label
    pub orientation: String,
    /// Protocol name
    pub protocol: String,
    /// Scanner software version
    pub software_version: String,
}

// =============================================================================
// Model Types
// =============================================================================

/// One term `amplitude * sin(angular_frequency * x + phase)` of a [`SineModel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SineComponent {
    /// Amplitude
    pub amplitude: f64,
    /// Angular frequency in radians per unit of the independent variable
    pub angular_frequency: f64,
    /// Phase in radians
    pub phase: f64,
}

impl SineComponent {
    /// Evaluates the term at `x`.
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        self.amplitude * (self.angular_frequency * x + self.phase).sin()
    }
}

/// Ordered sum of sinusoids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SineModel {
    components: Vec<SineComponent>,
}

impl SineModel {
    /// Builds a model from its components.
    #[must_use]
    pub fn new(components: Vec<SineComponent>) -> Self {
        Self { components }
    }

    /// Builds a model from a flat `[a0, w0, p0, a1, w1, p1, ...]` vector.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::ShapeMismatch`] if the length is not a multiple of 3.
    pub fn from_params(params: &[f64]) -> CoreResult<Self> {
        if params.len() % 3 != 0 {
            return Err(InputError::ShapeMismatch {
                expected: vec![3 * (params.len() / 3 + 1)],
                actual: vec![params.len()],
            }
            .into());
        }
        let components = params
            .chunks_exact(3)
            .map(|c| SineComponent {
                amplitude: c[0],
                angular_frequency: c[1],
                phase: c[2],
            })
            .collect();
        Ok(Self { components })
    }

    /// Flattens the model back into `[a, w, p, ...]` order.
    #[must_use]
    pub fn to_params(&self) -> Vec<f64> {
        self.components
            .iter()
            .flat_map(|c| [c.amplitude, c.angular_frequency, c.phase])
            .collect()
    }

    /// Returns the components.
    #[must_use]
    pub fn components(&self) -> &[SineComponent] {
        &self.components
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if the model has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Evaluates the model at a single point.
    #[must_use]
    pub fn value_at(&self, x: f64) -> f64 {
        self.components.iter().map(|c| c.evaluate(x)).sum()
    }

    /// Evaluates the model over a sample domain.
    #[must_use]
    pub fn evaluate(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|xi| self.value_at(xi))
    }
}

/// Gas-phase leakage parameters derived once per acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContaminationParameters {
    /// Gas-phase frequency offset in Hz
    pub freq_offset_hz: f64,
    /// Gas-phase zero-order phase offset in degrees
    pub phase_offset_deg: f64,
    /// Contamination k0 area
    pub area: f64,
    /// Gas flip angle in degrees
    pub gas_flip_angle_deg: f64,
}

/// Red-blood-cell to membrane amplitude ratio. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RbcMRatio(f64);

impl RbcMRatio {
    /// Creates a ratio.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the value is not finite and positive.
    pub fn new(value: f64) -> CoreResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(CoreError::configuration(
                "rbc_m_ratio",
                format!("must be finite and > 0, got {value}"),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }

    /// Dixon phase angle `atan2(ratio, 1)` in radians.
    #[must_use]
    pub fn phase_angle(&self) -> f64 {
        self.0.atan2(1.0)
    }
}

impl TryFrom<f64> for RbcMRatio {
    type Error = CoreError;

    fn try_from(value: f64) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl From<RbcMRatio> for f64 {
    fn from(ratio: RbcMRatio) -> Self {
        ratio.0
    }
}

impl std::fmt::Display for RbcMRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

// =============================================================================
// Result Types
// =============================================================================

/// Species channels produced by a Dixon decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct DixonChannels {
    /// Red-blood-cell channel (imaginary part after rotation)
    pub rbc: Array2<f64>,
    /// Membrane channel (real part after rotation)
    pub membrane: Array2<f64>,
    /// Rotation applied to the input in radians
    pub rotation_rad: f64,
}

/// High and low sample indices of a 1-D signal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleIndexSet {
    /// Indices near signal maxima, strictly ascending
    pub high: Vec<usize>,
    /// Indices near signal minima, strictly ascending
    pub low: Vec<usize>,
}

impl CycleIndexSet {
    /// Returns `true` when both sequences are strictly ascending and inside `[0, len)`.
    #[must_use]
    pub fn is_valid_for(&self, len: usize) -> bool {
        let ok = |v: &[usize]| v.windows(2).all(|w| w[0] < w[1]) && v.iter().all(|&i| i < len);
        ok(&self.high) && ok(&self.low)
    }
}

/// Ascending breakpoints dividing values into `len() + 1` ordered classes.
///
/// Classes are reported as `u8` with `0` reserved for background, so at most
/// [`BinThresholds::MAX_LEN`] breakpoints are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinThresholds(Vec<f64>);

impl BinThresholds {
    /// Largest accepted number of breakpoints; the top class is then 255.
    pub const MAX_LEN: usize = u8::MAX as usize - 1;

    /// Creates a threshold sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the sequence is empty, longer
    /// than [`Self::MAX_LEN`], contains non-finite values, or is not strictly
    /// ascending.
    pub fn new(values: Vec<f64>) -> CoreResult<Self> {
        if values.is_empty() {
            return Err(CoreError::configuration("thresholds", "must not be empty"));
        }
        if values.len() > Self::MAX_LEN {
            return Err(CoreError::configuration(
                "thresholds",
                format!("at most {} breakpoints, got {}", Self::MAX_LEN, values.len()),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::configuration("thresholds", "must be finite"));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CoreError::configuration(
                "thresholds",
                "must be strictly ascending",
            ));
        }
        Ok(Self(values))
    }

    /// `[mean - 2 std, mean - std, mean, mean + std, mean + 2 std]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if `std` is not positive.
    pub fn from_statistics(mean: f64, std: f64) -> CoreResult<Self> {
        if !(std.is_finite() && std > 0.0) {
            return Err(CoreError::configuration("std", "must be finite and > 0"));
        }
        Self::new((-2..=2).map(|k| mean + f64::from(k) * std).collect())
    }

    /// Returns the breakpoints.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Number of foreground classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.0.len() + 1
    }

    /// Class of a finite value, in `1..=num_classes()`.
    ///
    /// Lower bounds are inclusive: a value equal to a breakpoint falls into
    /// the class above it.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn classify(&self, value: f64) -> u8 {
        (self.0.partition_point(|&t| t <= value) + 1) as u8
    }
}

impl TryFrom<Vec<f64>> for BinThresholds {
    type Error = CoreError;

    fn try_from(values: Vec<f64>) -> CoreResult<Self> {
        Self::new(values)
    }
}

impl From<BinThresholds> for Vec<f64> {
    fn from(t: BinThresholds) -> Self {
        t.0
    }
}

/// Output of oscillation binning over an image of any dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedImage<D: Dimension> {
    /// Input image divided by its in-mask percentile
    pub rescaled: Array<f64, D>,
    /// Class per pixel, 0 for background
    pub bins: Array<u8, D>,
    /// Pixels that were classified
    pub foreground: Array<bool, D>,
    /// Breakpoints used
    pub thresholds: BinThresholds,
}

impl<D: Dimension> BinnedImage<D> {
    /// Foreground pixels above the lowest class.
    #[must_use]
    pub fn ventilated_mask(&self) -> Array<bool, D> {
        Zip::from(&self.bins)
            .and(&self.foreground)
            .map_collect(|&b, &fg| fg && b > 1)
    }

    /// Percentage of foreground pixels in each class, index 0 is class 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn class_fractions(&self) -> Vec<f64> {
        let k = self.thresholds.num_classes();
        let mut counts = vec![0usize; k];
        for (&b, &fg) in self.bins.iter().zip(self.foreground.iter()) {
            if fg && b >= 1 {
                counts[usize::from(b) - 1] += 1;
            }
        }
        let total: usize = counts.iter().sum();
        if total == 0 {
            return vec![0.0; k];
        }
        counts
            .into_iter()
            .map(|c| 100.0 * c as f64 / total as f64)
            .collect()
    }
}
