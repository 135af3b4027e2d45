//! Result types returned by the intake pipeline.

use crate::store::SubmissionId;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// How far a submission got.
///
/// Stages only move forward; [`Stage::Failed`] is reachable from any of them
/// and earlier artifacts stay on disk. See [`crate::Intake::process_tracked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploaded,
    Rendered,
    Extracted,
    Reconciled,
    Stored,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Uploaded => "uploaded",
            Stage::Rendered => "rendered",
            Stage::Extracted => "extracted",
            Stage::Reconciled => "reconciled",
            Stage::Stored => "stored",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one fully processed submission.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutput {
    pub submission_id: SubmissionId,
    /// Name the file was uploaded under.
    pub filename: String,
    /// Raw extraction, as persisted in `extracted_data.json`.
    pub extracted: Value,
    /// Template-shaped result, as persisted in `output.json`.
    pub reconciled: Value,
    pub stats: IntakeStats,
}

/// Counters and timings for one submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntakeStats {
    /// Page images sent to the extraction call (0 for text evidence).
    pub pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub reconciliation_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Template fields missing from the model's reconciled reply.
    pub missing_fields: Vec<String>,
}
