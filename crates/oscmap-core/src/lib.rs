//! # oscmap core
//!
//! Core types, configuration, errors and numeric utilities for processing
//! dissolved-phase free-induction-decay (FID) data from hyperpolarized-gas MRI.
//!
//! - **Data Types**: [`FidSeries`], [`SineModel`], [`ContaminationParameters`],
//!   [`RbcMRatio`], [`DixonChannels`], [`CycleIndexSet`], [`BinThresholds`] and
//!   [`BinnedImage`].
//!
//! - **Error Types**: the [`error`] module, with one error family per failure
//!   category (configuration, input, numerical fit, precondition).
//!
//! - **Configuration**: [`PipelineConfig`], an immutable per-subject record
//!   loaded from JSON.
//!
//! - **Traits**: [`Conditioner`], the seam for composable 1-D transforms.
//!
//! ## Example
//!
//! ```rust
//! use oscmap_core::{BinThresholds, RbcMRatio};
//!
//! let ratio = RbcMRatio::new(0.5).unwrap();
//! assert!(ratio.phase_angle() > 0.0);
//!
//! let bins = BinThresholds::from_statistics(0.58, 0.19).unwrap();
//! assert_eq!(bins.classify(0.6), 4);
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;
pub mod utils;

pub use config::{
    BinningConfig, ConditioningStep, PipelineConfig, ReferenceBins, SegmentationConfig,
    SegmentationMethod,
};
pub use error::{ConfigError, CoreError, CoreResult, FitError, InputError};
pub use traits::{Conditioner, ConditioningContext};
pub use types::{
    AcquisitionMetadata, BinThresholds, BinnedImage, ContaminationParameters, CycleIndexSet,
    DissolvedAcquisition, DixonChannels, FidSeries, RbcMRatio, SineComponent, SineModel,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reference mean of rescaled gradient-echo ventilation in healthy subjects
pub const REFERENCE_VENTILATION_MEAN: f64 = 0.58;

/// Reference standard deviation of rescaled gradient-echo ventilation
pub const REFERENCE_VENTILATION_STD: f64 = 0.19;

/// RBC resonance in ppm relative to the gas resonance
pub const RBC_SHIFT_PPM: f64 = 218.0;

/// Membrane (tissue/plasma) resonance in ppm relative to the gas resonance
pub const MEMBRANE_SHIFT_PPM: f64 = 197.0;

/// Number of trailing projections averaged when estimating gas k0 magnitude
pub const CONTAMINATION_AVERAGE_WINDOW: usize = 100;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConditioningStep, PipelineConfig, SegmentationMethod};
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::traits::{Conditioner, ConditioningContext};
    pub use crate::types::{
        BinThresholds, BinnedImage, ContaminationParameters, CycleIndexSet, DixonChannels,
        FidSeries, RbcMRatio, SineModel,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_valid() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reference_constants() {
        assert!(REFERENCE_VENTILATION_STD > 0.0);
        assert!(RBC_SHIFT_PPM > MEMBRANE_SHIFT_PPM);
        assert_eq!(CONTAMINATION_AVERAGE_WINDOW, 100);
    }
}
