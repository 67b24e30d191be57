//! Askama template structs for the web interface.
//!
//! Each struct corresponds to an HTML template in the templates/ directory.
//! Display strings are prepared here so templates stay free of logic.

use askama::Template;

use crate::evaluation::{format_rate, single_line, AggregateReport};
use crate::extract::SchemaCatalog;
use crate::models::{FieldMapping, Rotation};
use crate::utils::{format_elapsed, format_size};

/// Helper struct for the schema dropdown.
pub struct SchemaOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Helper struct for the rotation choices.
pub struct RotationOption {
    pub degrees: u32,
    pub selected: bool,
}

/// Helper struct for one extracted field.
pub struct FieldRow {
    pub name: String,
    pub value: String,
    pub found: bool,
}

/// Helper struct for one row of the accuracy table.
pub struct StatsRow {
    pub field: String,
    pub reference: String,
    pub source: String,
    pub matches: String,
    pub accuracy: String,
    pub undefined: bool,
}

/// Helper struct for a failed trial.
pub struct FailureRow {
    pub index: usize,
    pub kind: String,
    pub message: String,
}

/// Values echoed back into the form after a submission.
pub struct FormState {
    pub schemas: Vec<SchemaOption>,
    pub rotations: Vec<RotationOption>,
    pub max_upload: String,
}

impl FormState {
    pub fn new(catalog: &SchemaCatalog, schema: &str, rotation: u32, max_bytes: usize) -> Self {
        let mut schemas = vec![SchemaOption {
            value: "auto".to_string(),
            label: "Detect automatically".to_string(),
            selected: schema.is_empty() || schema.eq_ignore_ascii_case("auto"),
        }];
        schemas.extend(catalog.extraction_schemas().map(|s| SchemaOption {
            value: s.name.clone(),
            label: s.name.clone(),
            selected: s.name.eq_ignore_ascii_case(schema),
        }));

        let rotations = Rotation::ALL
            .iter()
            .map(|r| RotationOption {
                degrees: r.degrees(),
                selected: r.degrees() == rotation,
            })
            .collect();

        Self {
            schemas,
            rotations,
            max_upload: format_size(max_bytes),
        }
    }
}

/// Result of a single extraction.
pub struct ExtractView {
    pub schema: String,
    pub file_name: String,
    pub elapsed: String,
    pub rows: Vec<FieldRow>,
    pub json: String,
}

impl ExtractView {
    pub fn new(schema: &str, file_name: Option<&str>, mapping: &FieldMapping, elapsed_ms: u64) -> Self {
        Self {
            schema: schema.to_string(),
            file_name: file_name.unwrap_or("upload").to_string(),
            elapsed: format_elapsed(elapsed_ms),
            rows: mapping
                .iter()
                .map(|(name, value)| FieldRow {
                    name: name.to_string(),
                    value: value.map(single_line).unwrap_or_else(|| "not found".to_string()),
                    found: value.is_some(),
                })
                .collect(),
            json: serde_json::to_string_pretty(mapping).unwrap_or_default(),
        }
    }
}

/// An aggregate report prepared for display.
pub struct ReportView {
    pub schema: String,
    pub fingerprint: String,
    pub match_policy: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: String,
    pub exact_match_rate: String,
    pub mean_match_rate: String,
    pub std_dev: String,
    pub rows: Vec<StatsRow>,
    pub failures: Vec<FailureRow>,
    pub has_failures: bool,
}

impl From<&AggregateReport> for ReportView {
    fn from(report: &AggregateReport) -> Self {
        let rows = report
            .fields
            .iter()
            .map(|f| StatsRow {
                field: f.field.clone(),
                reference: f
                    .reference
                    .as_deref()
                    .map(single_line)
                    .unwrap_or_else(|| "-".to_string()),
                source: f.reference_source.as_str().to_string(),
                matches: format!("{}/{}", f.matches, f.considered),
                accuracy: format_rate(f.accuracy),
                undefined: f.accuracy.is_none(),
            })
            .collect();

        let failures: Vec<FailureRow> = report
            .failures()
            .map(|(index, kind, message)| FailureRow {
                index,
                kind: kind.to_string(),
                message: single_line(message),
            })
            .collect();

        Self {
            schema: report.schema.clone(),
            fingerprint: report.image_fingerprint.clone().unwrap_or_default(),
            match_policy: report.match_policy.to_string(),
            total: report.total_trials,
            succeeded: report.succeeded,
            failed: report.failed,
            success_rate: format_rate(report.success_rate),
            exact_match_rate: format_rate(report.exact_match_rate),
            mean_match_rate: format_rate(report.mean_match_rate),
            std_dev: format_rate(report.match_rate_std_dev),
            rows,
            has_failures: !failures.is_empty(),
            failures,
        }
    }
}

/// Single extraction page.
#[derive(Template)]
#[template(path = "extract.html")]
pub struct ExtractTemplate<'a> {
    pub title: &'a str,
    pub form: FormState,
    pub error: String,
    pub has_error: bool,
    pub result: Vec<ExtractView>,
}

/// Repeated-trial evaluation page.
#[derive(Template)]
#[template(path = "evaluate.html")]
pub struct EvaluateTemplate<'a> {
    pub title: &'a str,
    pub form: FormState,
    pub trials: usize,
    pub max_trials: usize,
    pub ground_truth: String,
    pub error: String,
    pub has_error: bool,
    pub report: Vec<ReportView>,
}
