//! Error types for the oscillation-mapping engine.
//!
//! This module provides the error taxonomy used by every processing stage,
//! built on [`thiserror`] for `Display` and `Error` implementations.
//!
//! # Error Hierarchy
//!
//! - [`CoreError`]: Top-level error type returned by every fallible operation
//! - [`ConfigError`]: Invalid or unknown configuration values
//! - [`InputError`]: Malformed or insufficient input arrays
//! - [`FitError`]: Nonlinear or linear least-squares failures
//!
//! # Example
//!
//! ```rust
//! use oscmap_core::error::{CoreError, InputError};
//!
//! fn check(dissolved: &[usize], gas: &[usize]) -> Result<(), CoreError> {
//!     if dissolved != gas {
//!         return Err(InputError::ShapeMismatch {
//!             expected: dissolved.to_vec(),
//!             actual: gas.to_vec(),
//!         }
//!         .into());
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(&[4, 8], &[4, 8]).is_ok());
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the processing engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    /// Numerical fitting failure
    #[error("Numerical fit error: {0}")]
    NumericalFit(#[from] FitError),

    /// A documented precondition on an argument was violated
    #[error("Precondition violated: {message}")]
    Precondition {
        /// Description of the violated precondition
        message: String,
    },
}

impl CoreError {
    /// Creates a new configuration error for `field`.
    #[must_use]
    pub fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::invalid_value(field, reason))
    }

    /// Creates a new precondition error.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates a new degenerate-input error.
    #[must_use]
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::InvalidInput(InputError::Degenerate {
            message: message.into(),
        })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Fit failures can be retried with a different model order or seed;
    /// everything else needs different inputs or configuration.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::NumericalFit(e) => e.is_recoverable(),
            Self::Configuration(_) | Self::InvalidInput(_) | Self::Precondition { .. } => false,
        }
    }

    /// Short machine-readable category name used in batch reports.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidInput(_) => "invalid_input",
            Self::NumericalFit(_) => "numerical_fit",
            Self::Precondition { .. } => "precondition",
        }
    }
}

/// Errors produced while building or loading a configuration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A method or variant tag is not one of the known values.
    #[error("Unknown {kind} `{value}`")]
    UnknownVariant {
        /// What kind of tag was being parsed.
        kind: &'static str,
        /// The offending tag.
        value: String,
    },

    /// A configuration file could not be read or written.
    #[error("Cannot access config file `{path}`: {source}")]
    FileAccess {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Construct a [`ConfigError::UnknownVariant`].
    pub fn unknown_variant<S: Into<String>>(kind: &'static str, value: S) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}

/// Errors describing unusable input data.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InputError {
    /// Paired arrays do not share a shape
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the reference array
        expected: Vec<usize>,
        /// Shape of the offending array
        actual: Vec<usize>,
    },

    /// Not enough samples for the requested operation
    #[error("Insufficient samples: need at least {required}, got {available}")]
    InsufficientSamples {
        /// Minimum required samples
        required: usize,
        /// Available samples
        available: usize,
    },

    /// An input array was empty
    #[error("Empty input: {what}")]
    Empty {
        /// Which input was empty
        what: &'static str,
    },

    /// Data must be strictly positive for this transform
    #[error("Non-positive value {value} at index {index}")]
    NonPositive {
        /// Index of the first offending value
        index: usize,
        /// The offending value
        value: f64,
    },

    /// Input is well-formed but numerically degenerate
    #[error("Degenerate input: {message}")]
    Degenerate {
        /// Description of the degeneracy
        message: String,
    },
}

/// Errors from least-squares fitting.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FitError {
    /// The optimizer exhausted its evaluation budget
    #[error("Fit did not converge after {evaluations} evaluations (cost {cost:.3e})")]
    DidNotConverge {
        /// Number of residual evaluations performed
        evaluations: usize,
        /// Final sum-of-squares cost
        cost: f64,
    },

    /// A linear system could not be solved
    #[error("Singular system: {message}")]
    SingularSystem {
        /// Description of the failure
        message: String,
    },

    /// The residual or a parameter became non-finite
    #[error("Non-finite value encountered during {stage}")]
    NonFinite {
        /// Stage at which the value appeared
        stage: &'static str,
    },

    /// The fitted model cannot be interpreted as requested
    #[error("Degenerate model: {message}")]
    DegenerateModel {
        /// Description of the problem
        message: String,
    },
}

impl FitError {
    /// Returns `true` if this error is recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::DidNotConverge { .. } | Self::NonFinite { .. } => true,
            Self::SingularSystem { .. } | Self::DegenerateModel { .. } => false,
        }
    }
}
