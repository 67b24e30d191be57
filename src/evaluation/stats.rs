//! Accuracy statistics over a set of trial results.
//!
//! Each field is compared against a reference value: the user's ground truth
//! when given, otherwise the most frequent non-null value seen across
//! successful trials. Aggregation never fails; rates that cannot be computed
//! are `None`, which is distinct from `Some(0.0)`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{FieldSchema, TrialResult};

/// How two extracted values are compared.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Trim, collapse internal whitespace, ignore case.
    #[default]
    Normalized,
    /// Byte-for-byte equality.
    Exact,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::Normalized => "normalized",
            MatchPolicy::Exact => "exact",
        }
    }

    /// Comparison key for a value under this policy.
    pub fn normalize(&self, value: &str) -> String {
        match self {
            MatchPolicy::Exact => value.to_string(),
            MatchPolicy::Normalized => value
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        }
    }

    pub fn matches(&self, a: &str, b: &str) -> bool {
        match self {
            MatchPolicy::Exact => a == b,
            MatchPolicy::Normalized => self.normalize(a) == self.normalize(b),
        }
    }
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Errors from parsing user-supplied ground truth.
#[derive(Debug, Error)]
pub enum GroundTruthError {
    #[error("Expected FIELD=VALUE, got '{0}'")]
    MissingSeparator(String),

    #[error("Empty field name in '{0}'")]
    EmptyField(String),

    #[error("Failed to read ground truth file {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Ground truth must be a JSON object of field names to values: {0}")]
    Json(String),

    #[error("Ground truth value for '{0}' must be a string, number or boolean")]
    UnsupportedValue(String),
}

/// Known-correct values for some or all fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    entries: Vec<(String, String)>,
}

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field's value, replacing an earlier one for the same field.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    /// Parse a single `FIELD=VALUE` assignment. The value may contain `=`.
    pub fn parse_assignment(input: &str) -> Result<(String, String), GroundTruthError> {
        let (field, value) = input
            .split_once('=')
            .ok_or_else(|| GroundTruthError::MissingSeparator(input.to_string()))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(GroundTruthError::EmptyField(input.to_string()));
        }
        Ok((field.to_string(), value.trim().to_string()))
    }

    /// Build from `FIELD=VALUE` assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, GroundTruthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut truth = Self::new();
        for assignment in assignments {
            let (field, value) = Self::parse_assignment(assignment.as_ref())?;
            truth.insert(field, value);
        }
        Ok(truth)
    }

    /// Build from newline-separated `FIELD=VALUE` lines, skipping blank lines.
    pub fn from_lines(text: &str) -> Result<Self, GroundTruthError> {
        Self::from_assignments(text.lines().filter(|line| !line.trim().is_empty()))
    }

    /// Build from a JSON object. Null values are skipped.
    pub fn from_json(text: &str) -> Result<Self, GroundTruthError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| GroundTruthError::Json(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| GroundTruthError::Json("not an object".to_string()))?;

        let mut truth = Self::new();
        for (field, value) in object {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => truth.insert(field.clone(), s.clone()),
                serde_json::Value::Number(n) => truth.insert(field.clone(), n.to_string()),
                serde_json::Value::Bool(b) => truth.insert(field.clone(), b.to_string()),
                _ => return Err(GroundTruthError::UnsupportedValue(field.clone())),
            }
        }
        Ok(truth)
    }

    /// Read a JSON ground truth file.
    pub fn from_file(path: &Path) -> Result<Self, GroundTruthError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GroundTruthError::Read(path.display().to_string(), e))?;
        Self::from_json(&text)
    }

    /// Merge another set of values over this one.
    pub fn merge(&mut self, other: GroundTruth) {
        for (field, value) in other.entries {
            self.insert(field, value);
        }
    }

    /// Value for a field, matching the name exactly first, then ignoring case.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .or_else(|| self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(field)))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fields that do not name any schema field.
    pub fn unknown_fields<'a>(&'a self, schema: &FieldSchema) -> Vec<&'a str> {
        self.entries
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| schema.canonical_field(k).is_none())
            .collect()
    }
}

/// Where a field's reference value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    GroundTruth,
    Majority,
    /// No ground truth and no non-null value was observed.
    None,
}

impl ReferenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceSource::GroundTruth => "ground truth",
            ReferenceSource::Majority => "majority",
            ReferenceSource::None => "none",
        }
    }
}

/// Accuracy for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub field: String,
    pub reference: Option<String>,
    pub reference_source: ReferenceSource,
    /// Successful trials whose value equals the reference.
    pub matches: usize,
    /// Successful trials (the accuracy denominator).
    pub considered: usize,
    /// Successful trials that returned a non-null value.
    pub observed: usize,
    /// `matches / considered`, or `None` when it cannot be determined.
    pub accuracy: Option<f64>,
}

/// Summary of a repeated extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_fingerprint: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub match_policy: MatchPolicy,
    pub total_trials: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `succeeded / total_trials`; `None` only for an empty run.
    pub success_rate: Option<f64>,
    pub fields: Vec<FieldStats>,
    /// Share of successful trials where every referenced field matched.
    pub exact_match_rate: Option<f64>,
    /// Mean share of referenced fields matched per successful trial.
    pub mean_match_rate: Option<f64>,
    /// Population standard deviation of the per-trial match share.
    pub match_rate_std_dev: Option<f64>,
    #[serde(default)]
    pub trials: Vec<TrialResult>,
}

impl AggregateReport {
    /// Stats for a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldStats> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// Failed trials as (index, kind, message).
    pub fn failures(&self) -> impl Iterator<Item = (usize, crate::models::FailureKind, &str)> {
        self.trials
            .iter()
            .filter_map(|t| t.failure().map(|(kind, message)| (t.index, kind, message)))
    }

    /// Read a report saved with `--output`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Computes an [`AggregateReport`] from trial results.
pub struct StatisticsAggregator<'a> {
    schema: &'a FieldSchema,
    ground_truth: GroundTruth,
    policy: MatchPolicy,
    image_fingerprint: Option<String>,
}

impl<'a> StatisticsAggregator<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        Self {
            schema,
            ground_truth: GroundTruth::new(),
            policy: MatchPolicy::default(),
            image_fingerprint: None,
        }
    }

    /// Use known-correct values for the fields they name.
    pub fn with_ground_truth(mut self, ground_truth: GroundTruth) -> Self {
        for field in ground_truth.unknown_fields(self.schema) {
            warn!(
                "Ground truth field '{}' is not in schema '{}' and will be ignored",
                field, self.schema.name
            );
        }
        self.ground_truth = ground_truth;
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_image_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.image_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn aggregate(&self, results: &[TrialResult]) -> AggregateReport {
        let successes: Vec<_> = results.iter().filter_map(|r| r.fields()).collect();
        let total = results.len();
        let succeeded = successes.len();

        let fields: Vec<FieldStats> = self
            .schema
            .field_names()
            .map(|name| {
                let values: Vec<Option<&str>> = successes.iter().map(|m| m.value(name)).collect();
                self.field_stats(name, &values)
            })
            .collect();

        // Per-trial share of referenced fields that matched.
        let referenced: Vec<&FieldStats> =
            fields.iter().filter(|f| f.reference.is_some()).collect();
        let per_trial: Vec<f64> = if referenced.is_empty() {
            Vec::new()
        } else {
            successes
                .iter()
                .map(|mapping| {
                    let matched = referenced
                        .iter()
                        .filter(|stats| match (mapping.value(&stats.field), &stats.reference) {
                            (Some(value), Some(reference)) => self.policy.matches(value, reference),
                            _ => false,
                        })
                        .count();
                    matched as f64 / referenced.len() as f64
                })
                .collect()
        };

        let (mean_match_rate, match_rate_std_dev) = mean_and_std_dev(&per_trial);
        let exact_match_rate = if per_trial.is_empty() {
            None
        } else {
            let exact = per_trial.iter().filter(|rate| **rate >= 1.0).count();
            Some(exact as f64 / per_trial.len() as f64)
        };

        AggregateReport {
            schema: self.schema.name.clone(),
            image_fingerprint: self.image_fingerprint.clone(),
            generated_at: Utc::now(),
            match_policy: self.policy,
            total_trials: total,
            succeeded,
            failed: total - succeeded,
            success_rate: ratio(succeeded, total),
            fields,
            exact_match_rate,
            mean_match_rate,
            match_rate_std_dev,
            trials: results.to_vec(),
        }
    }

    fn field_stats(&self, name: &str, values: &[Option<&str>]) -> FieldStats {
        let observed = values.iter().filter(|v| v.is_some()).count();

        let (reference, reference_source) = match self.ground_truth.get(name) {
            Some(truth) => (Some(truth.to_string()), ReferenceSource::GroundTruth),
            None => match self.majority(values) {
                Some(value) => (Some(value.to_string()), ReferenceSource::Majority),
                None => (None, ReferenceSource::None),
            },
        };

        let matches = match &reference {
            Some(reference) => values
                .iter()
                .flatten()
                .filter(|value| self.policy.matches(value, reference))
                .count(),
            None => 0,
        };

        let accuracy = if reference.is_none() || observed == 0 {
            None
        } else {
            ratio(matches, values.len())
        };

        FieldStats {
            field: name.to_string(),
            reference,
            reference_source,
            matches,
            considered: values.len(),
            observed,
            accuracy,
        }
    }

    /// Most frequent non-null value; ties go to the value seen first.
    /// Returns the first raw spelling of the winning value.
    fn majority<'v>(&self, values: &[Option<&'v str>]) -> Option<&'v str> {
        let mut tally: Vec<(String, &'v str, usize)> = Vec::new();
        for value in values.iter().flatten() {
            let key = self.policy.normalize(value);
            match tally.iter_mut().find(|(k, _, _)| *k == key) {
                Some(entry) => entry.2 += 1,
                None => tally.push((key, *value, 1)),
            }
        }

        let mut best: Option<(&'v str, usize)> = None;
        for (_, raw, count) in tally {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((raw, count));
            }
        }
        best.map(|(raw, _)| raw)
    }
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64)
    }
}

fn mean_and_std_dev(samples: &[f64]) -> (Option<f64>, Option<f64>) {
    if samples.is_empty() {
        return (None, None);
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (Some(mean), Some(variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, FieldMapping, FieldSpec};

    fn schema(fields: &[&str]) -> FieldSchema {
        FieldSchema {
            name: "test".to_string(),
            system_prompt: String::new(),
            instruction: String::new(),
            fields: fields.iter().map(|f| FieldSpec::new(f, f, "x")).collect(),
        }
    }

    fn ok(index: usize, pairs: &[(&str, Option<&str>)]) -> TrialResult {
        TrialResult::succeeded(index, FieldMapping::from_pairs(pairs.iter().copied()), 1)
    }

    fn failed(index: usize) -> TrialResult {
        TrialResult::failed(index, FailureKind::ApiError, "HTTP 500", 1)
    }

    fn truth(pairs: &[&str]) -> GroundTruth {
        GroundTruth::from_assignments(pairs).unwrap()
    }

    #[test]
    fn test_two_successes_and_a_failure_against_ground_truth() {
        let schema = schema(&["name"]);
        let results = vec![
            ok(0, &[("name", Some("Jane"))]),
            ok(1, &[("name", Some("Jane"))]),
            failed(2),
        ];

        let report = StatisticsAggregator::new(&schema)
            .with_ground_truth(truth(&["name=Jane"]))
            .aggregate(&results);

        let name = report.field("name").unwrap();
        assert_eq!(name.matches, 2);
        assert_eq!(name.considered, 2);
        assert_eq!(name.accuracy, Some(1.0));
        assert_eq!(name.reference_source, ReferenceSource::GroundTruth);
        assert_eq!(report.total_trials, 3);
        assert_eq!(report.failed, 1);
        assert!((report.success_rate.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_majority_tie_goes_to_first_observed() {
        let schema = schema(&["name"]);
        let results = vec![ok(0, &[("name", Some("A"))]), ok(1, &[("name", Some("B"))])];

        let report = StatisticsAggregator::new(&schema).aggregate(&results);
        let name = report.field("name").unwrap();
        assert_eq!(name.reference.as_deref(), Some("A"));
        assert_eq!(name.reference_source, ReferenceSource::Majority);
        assert_eq!(name.accuracy, Some(0.5));
    }

    #[test]
    fn test_majority_prefers_most_frequent() {
        let schema = schema(&["name"]);
        let results = vec![
            ok(0, &[("name", Some("Jon"))]),
            ok(1, &[("name", Some("John"))]),
            ok(2, &[("name", Some("john "))]),
        ];

        let report = StatisticsAggregator::new(&schema).aggregate(&results);
        let name = report.field("name").unwrap();
        assert_eq!(name.reference.as_deref(), Some("John"));
        assert_eq!(name.matches, 2);
        assert!((name.accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_successes_is_undefined_not_zero() {
        let schema = schema(&["name"]);
        let results = vec![failed(0), failed(1)];

        let report = StatisticsAggregator::new(&schema)
            .with_ground_truth(truth(&["name=Jane"]))
            .aggregate(&results);

        let name = report.field("name").unwrap();
        assert_eq!(name.accuracy, None);
        assert_eq!(name.considered, 0);
        assert_eq!(report.success_rate, Some(0.0));
        assert_eq!(report.exact_match_rate, None);
        assert_eq!(report.mean_match_rate, None);
    }

    #[test]
    fn test_all_null_field_is_undefined() {
        let schema = schema(&["name", "dob"]);
        let results = vec![
            ok(0, &[("name", Some("Jane")), ("dob", None)]),
            ok(1, &[("name", Some("Jane")), ("dob", None)]),
        ];

        let report = StatisticsAggregator::new(&schema).aggregate(&results);
        let dob = report.field("dob").unwrap();
        assert_eq!(dob.accuracy, None);
        assert_eq!(dob.reference_source, ReferenceSource::None);
        assert_eq!(report.field("name").unwrap().accuracy, Some(1.0));
    }

    #[test]
    fn test_null_counts_as_mismatch_when_reference_exists() {
        let schema = schema(&["name"]);
        let results = vec![
            ok(0, &[("name", Some("Jane"))]),
            ok(1, &[("name", None)]),
        ];

        let report = StatisticsAggregator::new(&schema).aggregate(&results);
        let name = report.field("name").unwrap();
        assert_eq!(name.observed, 1);
        assert_eq!(name.accuracy, Some(0.5));
    }

    #[test]
    fn test_all_successes_matching_gives_full_accuracy() {
        let schema = schema(&["LN", "FN"]);
        let results: Vec<_> = (0..4)
            .map(|i| ok(i, &[("LN", Some("DOE")), ("FN", Some("Jane Ann"))]))
            .collect();

        let report = StatisticsAggregator::new(&schema)
            .with_ground_truth(truth(&["ln=Doe", "FN=jane  ann"]))
            .aggregate(&results);

        assert!(report.fields.iter().all(|f| f.accuracy == Some(1.0)));
        assert_eq!(report.failed, 0);
        assert_eq!(report.exact_match_rate, Some(1.0));
        assert_eq!(report.mean_match_rate, Some(1.0));
        assert_eq!(report.match_rate_std_dev, Some(0.0));
    }

    #[test]
    fn test_exact_policy_is_case_sensitive() {
        let schema = schema(&["LN"]);
        let results = vec![ok(0, &[("LN", Some("doe"))])];

        let report = StatisticsAggregator::new(&schema)
            .with_ground_truth(truth(&["LN=Doe"]))
            .with_policy(MatchPolicy::Exact)
            .aggregate(&results);
        assert_eq!(report.field("LN").unwrap().accuracy, Some(0.0));
    }

    #[test]
    fn test_summary_statistics() {
        let schema = schema(&["LN", "FN"]);
        let results = vec![
            ok(0, &[("LN", Some("Doe")), ("FN", Some("Jane"))]),
            ok(1, &[("LN", Some("Doe")), ("FN", Some("Janet"))]),
        ];

        let report = StatisticsAggregator::new(&schema)
            .with_ground_truth(truth(&["LN=Doe", "FN=Jane"]))
            .aggregate(&results);

        assert_eq!(report.exact_match_rate, Some(0.5));
        assert_eq!(report.mean_match_rate, Some(0.75));
        assert_eq!(report.match_rate_std_dev, Some(0.25));
    }

    #[test]
    fn test_ground_truth_parsing() {
        let truth = GroundTruth::from_lines("LN=Doe\n\n FN = Jane Ann \nNOTE=a=b\n").unwrap();
        assert_eq!(truth.get("LN"), Some("Doe"));
        assert_eq!(truth.get("fn"), Some("Jane Ann"));
        assert_eq!(truth.get("NOTE"), Some("a=b"));
        assert_eq!(truth.unknown_fields(&schema(&["LN", "FN"])), vec!["NOTE"]);

        assert!(matches!(
            GroundTruth::parse_assignment("LN"),
            Err(GroundTruthError::MissingSeparator(_))
        ));
        assert!(matches!(
            GroundTruth::parse_assignment("=Doe"),
            Err(GroundTruthError::EmptyField(_))
        ));
    }

    #[test]
    fn test_ground_truth_from_json() {
        let truth = GroundTruth::from_json(r#"{"LN": "Doe", "DL": 12345, "POB": null}"#).unwrap();
        assert_eq!(truth.get("LN"), Some("Doe"));
        assert_eq!(truth.get("DL"), Some("12345"));
        assert_eq!(truth.get("POB"), None);

        assert!(GroundTruth::from_json("[1, 2]").is_err());
        assert!(matches!(
            GroundTruth::from_json(r#"{"LN": ["Doe"]}"#),
            Err(GroundTruthError::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_report_json_round_trip() {
        let schema = schema(&["name"]);
        let results = vec![ok(0, &[("name", Some("Jane"))]), failed(1)];
        let report = StatisticsAggregator::new(&schema)
            .with_image_fingerprint("abc123")
            .aggregate(&results);

        let parsed = AggregateReport::from_json(&report.to_json().unwrap()).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.failures().count(), 1);
    }
}
