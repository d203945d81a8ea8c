//! oscmap signal processing library
//!
//! Turns dissolved-phase FID data from hyperpolarized-gas MRI into an RBC:M
//! calibration ratio, Dixon species channels, conditioned cardiogenic traces,
//! high/low projection sets and binned oscillation maps.
//!
//! # Features
//!
//! - **Spectral fitting**: FFT-seeded sum-of-sines least squares
//! - **Calibration**: RBC:M ratio from static spectroscopy, or a manual override
//! - **Contamination removal**: gas-phase leakage subtraction in k-space
//! - **Dixon decomposition**: single global phase rotation into RBC and membrane
//! - **Conditioning**: detrending, smoothing, Butterworth filtering, wavelet
//!   denoising and Box–Cox transforms
//! - **Segmentation**: peak- or threshold-based high/low index selection
//! - **Binning**: percentile-rescaled oscillation maps against reference bins
//!
//! # Example
//!
//! ```rust,no_run
//! use oscmap_core::PipelineConfig;
//! use oscmap_signal::{KspaceInputs, SubjectPipeline};
//!
//! # fn run(inputs: KspaceInputs) -> oscmap_core::CoreResult<()> {
//! let config = PipelineConfig {
//!     rbc_m_ratio: Some(0.45),
//!     ..PipelineConfig::default()
//! };
//! let pipeline = SubjectPipeline::new(config)?;
//! let out = pipeline.run_kspace(&inputs)?;
//! println!("{} high projections", out.indices.high.len());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![cfg_attr(test, deny(unsafe_code))]

pub mod batch;
pub mod binning;
pub mod conditioning;
pub mod contamination;
pub mod dixon;
pub mod noise;
pub mod optimize;
pub mod peaks;
pub mod pipeline;
pub mod segmentation;
pub mod sine_fit;
pub mod spectroscopy;

// Re-export main types for convenience
pub use batch::{BatchReport, BatchRunner, FailureDetail, SubjectOutcome, SubjectSummary};
pub use binning::assign_bins;
pub use conditioning::{
    bandpass, boxcox, build_conditioner, condition, detrend, inverse_boxcox, lowpass,
    median_filter, moving_average_filter, smooth, wavelet_denoise, BoxCoxResult,
};
pub use contamination::remove_gas_contamination;
pub use dixon::{decompose, decompose_with_ratio};
pub use noise::{awgn, awgn_complex};
pub use peaks::{find_peaks, heart_rate_bpm};
pub use pipeline::{KspaceInputs, KspaceOutputs, SubjectPipeline};
pub use segmentation::find_high_low_indices;
pub use sine_fit::{fit_sine, fit_sine_with, fit_sum_of_sines, DEFAULT_SINE_COMPONENTS};
pub use spectroscopy::{calibrate_rbc_m_ratio, fit_rbc_m_ratio, Calibration, RatioSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{BatchReport, BatchRunner};
    pub use crate::pipeline::{KspaceInputs, KspaceOutputs, SubjectPipeline};
    pub use oscmap_core::prelude::*;
}
