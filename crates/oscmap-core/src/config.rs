//! Per-subject pipeline configuration.
//!
//! [`PipelineConfig`] is an immutable, fully specified record: every field has
//! a documented default, and a configuration is checked once with
//! [`PipelineConfig::validate`] before any processing starts. Method choices
//! that used to be free-form strings are closed enums whose unknown tags are
//! rejected at parse time.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CoreError, CoreResult};
use crate::types::{BinThresholds, RbcMRatio};
use crate::{REFERENCE_VENTILATION_MEAN, REFERENCE_VENTILATION_STD};

// ---------------------------------------------------------------------------
// Method enums
// ---------------------------------------------------------------------------

/// Strategy used to locate high and low signal samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    /// Local maxima/minima expanded into windows
    #[default]
    Peaks,
    /// Z-score above/below a fixed cut-off
    Threshold,
}

impl FromStr for SegmentationMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "peaks" => Ok(Self::Peaks),
            "threshold" => Ok(Self::Threshold),
            other => Err(ConfigError::unknown_variant("segmentation method", other).into()),
        }
    }
}

/// Source of the oscillation-binning breakpoints.
///
/// Reference populations differ between protocols, so the choice is always
/// explicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceBins {
    /// Healthy-cohort gradient-echo ventilation statistics
    VentilationGre,
    /// Breakpoints at `mean + k * std` for `k` in `-2..=2`
    Statistics {
        /// Reference mean
        mean: f64,
        /// Reference standard deviation
        std: f64,
    },
    /// Caller-supplied ascending breakpoints
    Explicit {
        /// Breakpoints
        thresholds: Vec<f64>,
    },
}

impl Default for ReferenceBins {
    fn default() -> Self {
        Self::VentilationGre
    }
}

impl ReferenceBins {
    /// Resolves the breakpoints.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the breakpoints are invalid.
    pub fn thresholds(&self) -> CoreResult<BinThresholds> {
        match self {
            Self::VentilationGre => BinThresholds::from_statistics(
                REFERENCE_VENTILATION_MEAN,
                REFERENCE_VENTILATION_STD,
            ),
            Self::Statistics { mean, std } => BinThresholds::from_statistics(*mean, *std),
            Self::Explicit { thresholds } => BinThresholds::new(thresholds.clone()),
        }
    }
}

impl FromStr for ReferenceBins {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "ventilation_gre" => Ok(Self::VentilationGre),
            other => Err(ConfigError::unknown_variant("binning reference", other).into()),
        }
    }
}

/// One conditioning transform applied to the segmentation trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ConditioningStep {
    /// Subtract a fitted bi-exponential decay
    Detrend,
    /// Valid-region moving average
    MovingAverage {
        /// Odd window length
        window: usize,
    },
    /// Centered median filter
    Median {
        /// Odd window length
        window: usize,
    },
    /// Length-preserving moving average with shrinking edge windows
    Smooth {
        /// Odd window length
        window: usize,
    },
    /// Zero-phase Butterworth bandpass
    Bandpass {
        /// Lower cutoff in Hz
        low_hz: f64,
        /// Upper cutoff in Hz
        high_hz: f64,
    },
    /// Zero-phase Butterworth lowpass
    Lowpass {
        /// Cutoff in Hz
        high_hz: f64,
    },
    /// Wavelet soft-threshold denoising
    WaveletDenoise {
        /// Decomposition depth
        level: usize,
    },
}

impl ConditioningStep {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Detrend => "detrend",
            Self::MovingAverage { .. } => "moving_average",
            Self::Median { .. } => "median",
            Self::Smooth { .. } => "smooth",
            Self::Bandpass { .. } => "bandpass",
            Self::Lowpass { .. } => "lowpass",
            Self::WaveletDenoise { .. } => "wavelet_denoise",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let cutoff_ok = |hz: f64| hz.is_finite() && hz > 0.0;
        match *self {
            Self::MovingAverage { window } | Self::Median { window } | Self::Smooth { window } => {
                if window == 0 || window % 2 == 0 {
                    return Err(ConfigError::invalid_value(
                        "conditioning.window",
                        format!("must be odd and > 0, got {window}"),
                    ));
                }
            }
            Self::Bandpass { low_hz, high_hz } => {
                if !cutoff_ok(low_hz) || !cutoff_ok(high_hz) || low_hz >= high_hz {
                    return Err(ConfigError::invalid_value(
                        "conditioning.bandpass",
                        format!("need 0 < low_hz < high_hz, got {low_hz}..{high_hz}"),
                    ));
                }
            }
            Self::Lowpass { high_hz } => {
                if !cutoff_ok(high_hz) {
                    return Err(ConfigError::invalid_value(
                        "conditioning.lowpass",
                        "high_hz must be > 0",
                    ));
                }
            }
            Self::WaveletDenoise { level } => {
                if level == 0 {
                    return Err(ConfigError::invalid_value(
                        "conditioning.wavelet_level",
                        "must be > 0",
                    ));
                }
            }
            Self::Detrend => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Strategy
    pub method: SegmentationMethod,
    /// Expected samples per cycle; derived from the heart rate when `None`
    pub peak_distance: Option<usize>,
    /// Window width around each peak as a fraction of `peak_distance`
    pub distance_threshold: f64,
    /// Truncate both index sets to the same length
    pub same_length: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            method: SegmentationMethod::Peaks,
            peak_distance: None,
            distance_threshold: 0.2,
            same_length: true,
        }
    }
}

/// Oscillation-binning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    /// Breakpoint source
    pub reference: ReferenceBins,
    /// Percentile of in-mask pixels used to rescale the image
    pub rescale_percentile: f64,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            reference: ReferenceBins::VentilationGre,
            rescale_percentile: 99.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Complete configuration for one subject's processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Subject identifier used in logs and batch reports
    pub subject_id: String,
    /// Manual RBC:M ratio; skips spectroscopic calibration when set
    pub rbc_m_ratio: Option<f64>,
    /// Sine components fitted to the calibration spectrum
    pub spectroscopy_components: usize,
    /// Sine components for general oscillation fits
    pub sine_components: usize,
    /// Segmentation settings
    pub segmentation: SegmentationConfig,
    /// Conditioning applied to the RBC k0 trace, in order
    pub conditioning: Vec<ConditioningStep>,
    /// Binning settings
    pub binning: BinningConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subject_id: String::from("subject"),
            rbc_m_ratio: None,
            spectroscopy_components: 3,
            sine_components: 8,
            segmentation: SegmentationConfig::default(),
            conditioning: vec![ConditioningStep::Detrend],
            binning: BinningConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileAccess`] if the file cannot be read,
    /// [`ConfigError::Parse`] if the JSON is malformed, and any validation
    /// error otherwise.
    pub fn from_json(path: &Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: PipelineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        tracing::debug!(path = %path.display(), subject = %cfg.subject_id, "configuration loaded");
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON at `path`,
    /// creating parent directories if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileAccess`] if the directory or file cannot be
    /// written.
    pub fn to_json(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileAccess {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Manual ratio override, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] if the override is not positive.
    pub fn manual_ratio(&self) -> CoreResult<Option<RbcMRatio>> {
        self.rbc_m_ratio.map(RbcMRatio::new).transpose()
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field as a [`CoreError::Configuration`].
    pub fn validate(&self) -> CoreResult<()> {
        self.manual_ratio()?;

        if self.spectroscopy_components < 2 {
            return Err(CoreError::configuration(
                "spectroscopy_components",
                "must be >= 2 to separate RBC and membrane",
            ));
        }
        if self.sine_components == 0 {
            return Err(CoreError::configuration("sine_components", "must be > 0"));
        }

        let seg = &self.segmentation;
        if let Some(d) = seg.peak_distance {
            if d < 2 {
                return Err(CoreError::configuration(
                    "segmentation.peak_distance",
                    format!("must be >= 2, got {d}"),
                ));
            }
        }
        if !(seg.distance_threshold.is_finite() && seg.distance_threshold >= 0.0) {
            return Err(CoreError::configuration(
                "segmentation.distance_threshold",
                "must be finite and >= 0",
            ));
        }

        for step in &self.conditioning {
            step.validate()?;
        }

        let p = self.binning.rescale_percentile;
        if !(p.is_finite() && p > 0.0 && p <= 100.0) {
            return Err(CoreError::configuration(
                "binning.rescale_percentile",
                format!("must be in (0, 100], got {p}"),
            ));
        }
        self.binning.reference.thresholds()?;

        Ok(())
    }
}
