//! Per-subject processing chain.
//!
//! ```text
//! calibration ─► contamination removal ─► Dixon ─► conditioning ─► segmentation
//!                                                                  (k-space)
//! oscillation image ─► binning                                     (image)
//! ```
//!
//! Every stage consumes the previous stage's output; the first error ends the
//! run. Reconstruction of the high/low k-space into images happens outside
//! this crate, so the image half is a separate entry point.

use ndarray::{Array, Array1, Array2, Dimension};
use num_complex::Complex64;
use oscmap_core::{
    BinThresholds, BinnedImage, ConditioningContext, ContaminationParameters, CoreError,
    CoreResult, CycleIndexSet, DissolvedAcquisition, DixonChannels, FidSeries, InputError,
    PipelineConfig,
};
use tracing::{debug, info, instrument};

use crate::binning::assign_bins;
use crate::conditioning::condition;
use crate::contamination::remove_gas_contamination;
use crate::dixon::decompose;
use crate::peaks::heart_rate_bpm;
use crate::segmentation::find_high_low_indices;
use crate::sine_fit::fit_sine_with;
use crate::spectroscopy::{calibrate_rbc_m_ratio, Calibration};

/// Acquisition data for one k-space run.
#[derive(Debug, Clone)]
pub struct KspaceInputs {
    /// Dissolved and gas FID data with acquisition metadata
    pub dissolved: DissolvedAcquisition,
    /// Gas leakage parameters; removal is skipped when `None`
    pub contamination: Option<ContaminationParameters>,
    /// Calibration spectroscopy, required unless the ratio is set manually
    pub spectroscopy: Option<FidSeries>,
}

/// Everything the k-space half of the pipeline produces.
#[derive(Debug, Clone)]
pub struct KspaceOutputs {
    /// Calibration ratio and its provenance
    pub calibration: Calibration,
    /// Dissolved data after gas contamination removal
    pub cleaned: Array2<Complex64>,
    /// RBC and membrane channels
    pub channels: DixonChannels,
    /// RBC k0 per projection before conditioning
    pub rbc_trace: Array1<f64>,
    /// RBC k0 trace after the configured conditioning steps
    pub conditioned: Array1<f64>,
    /// Heart rate estimate, present when the peak distance was derived
    pub heart_rate_bpm: Option<f64>,
    /// Samples per cardiac cycle used for segmentation
    pub peak_distance: usize,
    /// High and low projection indices
    pub indices: CycleIndexSet,
}

/// Runs every stage for one subject under a validated configuration.
#[derive(Debug, Clone)]
pub struct SubjectPipeline {
    config: PipelineConfig,
    thresholds: BinThresholds,
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn derive_peak_distance(bpm: f64, repetition_time_s: f64) -> CoreResult<usize> {
    let samples = (60.0 / (bpm * repetition_time_s)).round();
    if !(samples.is_finite() && samples >= 2.0) {
        return Err(InputError::Degenerate {
            message: format!(
                "heart rate {bpm:.2} bpm at TR {repetition_time_s} s gives no usable cycle length"
            ),
        }
        .into());
    }
    Ok(samples as usize)
}

impl SubjectPipeline {
    /// Validates `config` and resolves the binning thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] for any invalid field.
    pub fn new(config: PipelineConfig) -> CoreResult<Self> {
        config.validate()?;
        let thresholds = config.binning.reference.thresholds()?;
        Ok(Self { config, thresholds })
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Binning breakpoints resolved from the configuration.
    #[must_use]
    pub fn thresholds(&self) -> &BinThresholds {
        &self.thresholds
    }

    /// Calibrates, cleans, decomposes, conditions and segments one
    /// acquisition.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any stage.
    #[instrument(skip(self, inputs), fields(subject = %self.config.subject_id))]
    pub fn run_kspace(&self, inputs: &KspaceInputs) -> CoreResult<KspaceOutputs> {
        let acquisition = &inputs.dissolved;
        let meta = acquisition.dissolved.metadata();

        let calibration = calibrate_rbc_m_ratio(&self.config, inputs.spectroscopy.as_ref())?;
        info!(
            ratio = calibration.ratio.value(),
            source = ?calibration.source,
            "RBC:M ratio calibrated"
        );

        let cleaned = match &inputs.contamination {
            Some(params) => remove_gas_contamination(
                acquisition.dissolved.data(),
                &acquisition.gas,
                meta.dwell_time_s,
                params,
            )?,
            None => {
                debug!("no contamination parameters, skipping gas removal");
                acquisition.dissolved.data().clone()
            }
        };

        let channels = decompose(&cleaned, calibration.ratio)?;
        let rbc_trace = channels.rbc.column(0).to_owned();

        let ctx = ConditioningContext::from_period(meta.repetition_time_s);
        let conditioned = condition(&rbc_trace, &self.config.conditioning, &ctx)?;

        let seg = &self.config.segmentation;
        let (peak_distance, heart_rate) = match seg.peak_distance {
            Some(d) => (d, None),
            None => {
                let bpm = heart_rate_bpm(&conditioned, meta.repetition_time_s)?;
                (derive_peak_distance(bpm, meta.repetition_time_s)?, Some(bpm))
            }
        };

        let indices = find_high_low_indices(
            &conditioned,
            peak_distance,
            seg.distance_threshold,
            seg.same_length,
            seg.method,
        )?;
        info!(
            projections = rbc_trace.len(),
            peak_distance,
            high = indices.high.len(),
            low = indices.low.len(),
            "k-space segmented"
        );

        Ok(KspaceOutputs {
            calibration,
            cleaned,
            channels,
            rbc_trace,
            conditioned,
            heart_rate_bpm: heart_rate,
            peak_distance,
            indices,
        })
    }

    /// Fits the configured number of sines to an oscillation trace and
    /// returns the fitted curve.
    ///
    /// # Errors
    ///
    /// See [`fit_sine_with`].
    #[instrument(skip(self, trace), fields(subject = %self.config.subject_id, len = trace.len()))]
    pub fn fit_oscillation(&self, trace: &Array1<f64>) -> CoreResult<Array1<f64>> {
        fit_sine_with(trace, self.config.sine_components)
    }

    /// Bins a reconstructed oscillation-amplitude image.
    ///
    /// # Errors
    ///
    /// See [`assign_bins`].
    #[instrument(skip(self, image, mask), fields(subject = %self.config.subject_id))]
    pub fn bin_oscillation<D: Dimension>(
        &self,
        image: &Array<f64, D>,
        mask: &Array<bool, D>,
    ) -> CoreResult<BinnedImage<D>> {
        assign_bins(
            image,
            mask,
            &self.thresholds,
            self.config.binning.rescale_percentile,
        )
    }
}

impl TryFrom<PipelineConfig> for SubjectPipeline {
    type Error = CoreError;

    fn try_from(config: PipelineConfig) -> CoreResult<Self> {
        Self::new(config)
    }
}
