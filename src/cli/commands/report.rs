//! Render a saved evaluation report.

use std::path::Path;

use anyhow::Context;

use kycscan::evaluation::{render_report, AggregateReport};

/// Print a report previously written with `kyc evaluate --output`.
pub async fn cmd_report(path: &Path) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = AggregateReport::from_json(&text)
        .with_context(|| format!("{} is not a saved evaluation report", path.display()))?;

    println!("Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    print!("{}", render_report(&report));
    Ok(())
}
