//! Repeated-trial evaluation command.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::super::helpers::{build_submitter, choose_schema, describe_image, load_image};
use kycscan::config::Settings;
use kycscan::evaluation::{
    format_rate, render_report, GroundTruth, MatchPolicy, StatisticsAggregator, TrialRunner,
};
use kycscan::extract::{DocumentSubmitter, SchemaCatalog, SchemaSelection};
use kycscan::models::Rotation;

/// Options for `kyc evaluate`.
pub struct EvaluateArgs {
    pub image: PathBuf,
    pub trials: Option<NonZeroUsize>,
    pub schema: SchemaSelection,
    pub rotation: Rotation,
    pub truth: Vec<String>,
    pub truth_file: Option<PathBuf>,
    pub policy: Option<MatchPolicy>,
    pub output: Option<PathBuf>,
    pub json: bool,
}

fn ground_truth(args: &EvaluateArgs) -> anyhow::Result<GroundTruth> {
    let mut truth = match args.truth_file {
        Some(ref path) => GroundTruth::from_file(path)?,
        None => GroundTruth::new(),
    };
    // Command-line values win over the file.
    truth.merge(GroundTruth::from_assignments(&args.truth)?);
    Ok(truth)
}

/// Run the same extraction N times and report per-field accuracy.
pub async fn cmd_evaluate(
    settings: &Settings,
    catalog: &SchemaCatalog,
    args: EvaluateArgs,
) -> anyhow::Result<()> {
    let trials = match args.trials {
        Some(n) => n,
        None => NonZeroUsize::new(settings.default_trials)
            .context("default_trials must be at least 1")?,
    };
    let policy = args.policy.unwrap_or(settings.match_policy);
    let truth = ground_truth(&args)?;

    let image = load_image(&args.image, args.rotation, settings)?;
    let submitter = build_submitter(settings)?;

    if !args.json {
        println!(
            "{} Evaluating {} over {} trial(s) with {}",
            style("→").cyan(),
            describe_image(&image),
            trials,
            submitter.describe()
        );
    }

    let schema = choose_schema(&args.schema, &submitter, &image, catalog, args.json).await?;

    let progress = if args.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(trials.get() as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("█▓░"),
    );
    progress.set_message(format!("Extracting {} fields...", schema.name));

    let mut failures = 0usize;
    let results = TrialRunner::new(&submitter)
        .with_delay(Duration::from_millis(settings.trial_delay_ms))
        .run_with(&image, schema, trials, |result| {
            if let Some((kind, _)) = result.failure() {
                failures += 1;
                progress.set_message(format!("{} failed (last: {})", failures, kind));
            }
            progress.inc(1);
        })
        .await;
    progress.finish_and_clear();

    let report = StatisticsAggregator::new(schema)
        .with_ground_truth(truth)
        .with_policy(policy)
        .with_image_fingerprint(image.fingerprint())
        .aggregate(&results);

    if let Some(ref path) = args.output {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        if !args.json {
            println!(
                "{} Saved report to {}",
                style("✓").green(),
                path.display()
            );
        }
    }

    if args.json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!();
    print!("{}", render_report(&report));

    let status = if report.failed == 0 {
        style("✓").green()
    } else {
        style("!").yellow()
    };
    println!();
    println!(
        "{} {} of {} trials succeeded ({})",
        status,
        report.succeeded,
        report.total_trials,
        format_rate(report.success_rate)
    );

    Ok(())
}
