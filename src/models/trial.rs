//! Per-trial results from repeated extraction runs.

use serde::{Deserialize, Serialize};

use super::FieldMapping;

/// Category of a failed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidImage,
    ApiError,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidImage => "invalid_image",
            FailureKind::ApiError => "api_error",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// What a single trial produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Succeeded { fields: FieldMapping },
    Failed { kind: FailureKind, message: String },
}

/// One trial of a repeated extraction run. Read-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Zero-based position in the run.
    pub index: usize,
    pub outcome: TrialOutcome,
    /// Wall time of the submission in milliseconds.
    pub elapsed_ms: u64,
}

impl TrialResult {
    pub fn succeeded(index: usize, fields: FieldMapping, elapsed_ms: u64) -> Self {
        Self {
            index,
            outcome: TrialOutcome::Succeeded { fields },
            elapsed_ms,
        }
    }

    pub fn failed(index: usize, kind: FailureKind, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            index,
            outcome: TrialOutcome::Failed {
                kind,
                message: message.into(),
            },
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TrialOutcome::Succeeded { .. })
    }

    /// Extracted fields, if the trial succeeded.
    pub fn fields(&self) -> Option<&FieldMapping> {
        match &self.outcome {
            TrialOutcome::Succeeded { fields } => Some(fields),
            TrialOutcome::Failed { .. } => None,
        }
    }

    /// Failure kind and message, if the trial failed.
    pub fn failure(&self) -> Option<(FailureKind, &str)> {
        match &self.outcome {
            TrialOutcome::Succeeded { .. } => None,
            TrialOutcome::Failed { kind, message } => Some((*kind, message.as_str())),
        }
    }
}
