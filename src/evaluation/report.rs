//! Plain-text rendering of extraction results and aggregate reports.

use std::fmt::Write;

use super::stats::AggregateReport;
use crate::models::FieldMapping;

/// Shown in place of an accuracy that could not be computed.
pub const INSUFFICIENT_DATA: &str = "insufficient data";

const NOT_FOUND: &str = "(not found)";
const NO_REFERENCE: &str = "-";

/// Format a rate in [0, 1] as a percentage with two decimals.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.2}%", rate * 100.0),
        None => INSUFFICIENT_DATA.to_string(),
    }
}

/// Collapse line breaks, tabs and whitespace runs so a value fits one table cell.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render an extraction result as aligned field/value lines.
pub fn render_field_mapping(mapping: &FieldMapping) -> String {
    let width = mapping.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (field, value) in mapping.iter() {
        let value = value.map(single_line);
        let _ = writeln!(
            out,
            "{:<width$}  {}",
            field,
            value.as_deref().unwrap_or(NOT_FOUND)
        );
    }
    out
}

/// Render a report as a field table followed by summary lines.
pub fn render_report(report: &AggregateReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Schema: {}", report.schema);
    if let Some(ref fingerprint) = report.image_fingerprint {
        let _ = writeln!(out, "Image:  sha256:{}", fingerprint);
    }
    let _ = writeln!(out, "Match:  {}", report.match_policy);
    let _ = writeln!(out);

    let rows: Vec<[String; 4]> = report
        .fields
        .iter()
        .map(|f| {
            [
                f.field.clone(),
                f.reference
                    .as_deref()
                    .map(single_line)
                    .unwrap_or_else(|| NO_REFERENCE.to_string()),
                format!("{}/{}", f.matches, f.considered),
                format_rate(f.accuracy),
            ]
        })
        .collect();

    let headers = ["FIELD", "REFERENCE", "MATCHES", "ACCURACY"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| {
        format!(
            "{:<w0$}  {:<w1$}  {:>w2$}  {}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
        )
    };

    let _ = writeln!(out, "{}", line(headers));
    let _ = writeln!(
        out,
        "{}",
        "-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1))
    );
    for row in &rows {
        let _ = writeln!(
            out,
            "{}",
            line([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()]).trim_end()
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Trials:           {} total, {} succeeded, {} failed",
        report.total_trials, report.succeeded, report.failed
    );
    let _ = writeln!(out, "Success rate:     {}", format_rate(report.success_rate));
    let _ = writeln!(out, "Exact match rate: {}", format_rate(report.exact_match_rate));
    let _ = writeln!(
        out,
        "Mean match rate:  {} (std dev {})",
        format_rate(report.mean_match_rate),
        format_rate(report.match_rate_std_dev)
    );

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures:");
        for (index, kind, message) in failures {
            let _ = writeln!(out, "  #{:<3} {:<13} {}", index, kind, single_line(message));
        }
    }

    out
}

/// Read per-field accuracies back out of [`render_report`] output.
///
/// Accuracies are returned as fractions; `None` for insufficient data.
pub fn parse_rendered_accuracies(rendered: &str) -> Vec<(String, Option<f64>)> {
    let mut lines = rendered.lines().skip_while(|l| !l.starts_with("FIELD"));
    // Header and separator.
    lines.next();
    lines.next();

    lines
        .take_while(|l| !l.trim().is_empty())
        .filter_map(|row| {
            let field = row.split_whitespace().next()?.to_string();
            if row.trim_end().ends_with(INSUFFICIENT_DATA) {
                return Some((field, None));
            }
            let percent = row
                .split_whitespace()
                .last()?
                .strip_suffix('%')?
                .parse::<f64>()
                .ok()?;
            Some((field, Some(percent / 100.0)))
        })
        .collect()
}
