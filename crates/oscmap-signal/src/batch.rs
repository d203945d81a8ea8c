//! Sequential multi-subject runs with an explicit per-subject outcome.
//!
//! A failing subject never aborts the batch and is never dropped silently:
//! its error category, message and recoverability are kept in the
//! [`BatchReport`] and logged at `warn` level.

use oscmap_core::{CoreError, PipelineConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::{KspaceInputs, KspaceOutputs, SubjectPipeline};
use crate::spectroscopy::RatioSource;

/// Headline numbers of a successful subject run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    /// Calibration ratio used for the decomposition
    pub rbc_m_ratio: f64,
    /// Where the ratio came from
    pub ratio_source: RatioSource,
    /// Heart rate when it was estimated from the data
    pub heart_rate_bpm: Option<f64>,
    /// Samples per cycle used for segmentation
    pub peak_distance: usize,
    /// Number of high projections
    pub high_count: usize,
    /// Number of low projections
    pub low_count: usize,
}

impl From<&KspaceOutputs> for SubjectSummary {
    fn from(out: &KspaceOutputs) -> Self {
        Self {
            rbc_m_ratio: out.calibration.ratio.value(),
            ratio_source: out.calibration.source,
            heart_rate_bpm: out.heart_rate_bpm,
            peak_distance: out.peak_distance,
            high_count: out.indices.high.len(),
            low_count: out.indices.low.len(),
        }
    }
}

/// Why a subject failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Error family, e.g. `numerical_fit`
    pub category: String,
    /// Full error message
    pub message: String,
    /// Whether a retry with different settings may succeed
    pub recoverable: bool,
}

impl From<&CoreError> for FailureDetail {
    fn from(err: &CoreError) -> Self {
        Self {
            category: err.category().to_string(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

/// Result of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectOutcome {
    /// Subject identifier from the configuration
    pub subject_id: String,
    /// Summary on success, failure detail otherwise
    pub result: Result<SubjectSummary, FailureDetail>,
}

impl SubjectOutcome {
    /// Returns `true` if the subject completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of a batch in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per subject
    pub outcomes: Vec<SubjectOutcome>,
}

impl BatchReport {
    /// Number of subjects that completed.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of subjects that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failed subjects with their details.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureDetail)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(detail) => Some((o.subject_id.as_str(), detail)),
            Ok(_) => None,
        })
    }
}

/// Runs subjects one after another.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchRunner;

impl BatchRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the k-space pipeline for each `(config, inputs)` pair.
    pub fn run<I>(&self, subjects: I) -> BatchReport
    where
        I: IntoIterator<Item = (PipelineConfig, KspaceInputs)>,
    {
        let mut report = BatchReport::default();
        for (config, inputs) in subjects {
            let subject_id = config.subject_id.clone();
            let result = SubjectPipeline::new(config)
                .and_then(|pipeline| pipeline.run_kspace(&inputs))
                .map(|out| SubjectSummary::from(&out))
                .map_err(|err| {
                    warn!(
                        subject = %subject_id,
                        category = err.category(),
                        recoverable = err.is_recoverable(),
                        error = %err,
                        "subject failed"
                    );
                    FailureDetail::from(&err)
                });
            report.outcomes.push(SubjectOutcome { subject_id, result });
        }
        info!(
            subjects = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }
}
