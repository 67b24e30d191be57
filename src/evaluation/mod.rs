//! Repeated-trial accuracy evaluation.
//!
//! - `runner`: runs the same extraction N times
//! - `stats`: per-field accuracy and summary statistics
//! - `report`: text rendering of results and reports

mod report;
mod runner;
mod stats;

pub use report::{
    format_rate, parse_rendered_accuracies, render_field_mapping, render_report, single_line,
    INSUFFICIENT_DATA,
};
pub use runner::TrialRunner;
pub use stats::{
    AggregateReport, FieldStats, GroundTruth, GroundTruthError, MatchPolicy, ReferenceSource,
    StatisticsAggregator,
};
