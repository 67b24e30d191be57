//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod evaluate;
mod extract;
mod report;
mod schemas;
mod serve;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kycscan::config::load_settings;
use kycscan::evaluation::MatchPolicy;
use kycscan::extract::SchemaSelection;
use kycscan::models::Rotation;

use evaluate::EvaluateArgs;

#[derive(Parser)]
#[command(name = "kyc")]
#[command(about = "Identity document field extraction and accuracy evaluation")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract fields from a document image with a single request
    Extract {
        /// Path to the document image
        image: PathBuf,
        /// Schema: auto, passport, drivers-licence, or a custom schema name
        #[arg(short, long, default_value = "auto")]
        schema: SchemaSelection,
        /// Rotate the image counter-clockwise (0, 90, 180 or 270 degrees)
        #[arg(short, long, default_value = "0")]
        rotate: Rotation,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the same extraction repeatedly and report per-field accuracy
    Evaluate {
        /// Path to the document image
        image: PathBuf,
        /// Number of trials (defaults to default_trials from config)
        #[arg(short = 'n', long)]
        trials: Option<NonZeroUsize>,
        /// Schema: auto, passport, drivers-licence, or a custom schema name
        #[arg(short, long, default_value = "auto")]
        schema: SchemaSelection,
        /// Rotate the image counter-clockwise (0, 90, 180 or 270 degrees)
        #[arg(short, long, default_value = "0")]
        rotate: Rotation,
        /// Known-correct value for a field (repeatable)
        #[arg(long = "truth", value_name = "FIELD=VALUE")]
        truth: Vec<String>,
        /// JSON file of known-correct field values
        #[arg(long)]
        truth_file: Option<PathBuf>,
        /// How values are compared (overrides config)
        #[arg(long, value_enum)]
        policy: Option<MatchPolicy>,
        /// Save the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a report saved with `evaluate --output`
    Report {
        /// Path to the saved report
        path: PathBuf,
    },

    /// List available extraction schemas
    Schemas,

    /// Start the web form
    Serve {
        /// Bind address: PORT, HOST, or HOST:PORT (defaults to config `bind`)
        bind: Option<String>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, config) = load_settings(cli.config.as_deref()).await?;
    let catalog = config.schema_catalog()?;

    match cli.command {
        Commands::Extract {
            image,
            schema,
            rotate,
            json,
        } => extract::cmd_extract(&settings, &catalog, &image, &schema, rotate, json).await,
        Commands::Evaluate {
            image,
            trials,
            schema,
            rotate,
            truth,
            truth_file,
            policy,
            output,
            json,
        } => {
            evaluate::cmd_evaluate(
                &settings,
                &catalog,
                EvaluateArgs {
                    image,
                    trials,
                    schema,
                    rotation: rotate,
                    truth,
                    truth_file,
                    policy,
                    output,
                    json,
                },
            )
            .await
        }
        Commands::Report { path } => report::cmd_report(&path).await,
        Commands::Schemas => schemas::cmd_schemas(&catalog).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            serve::cmd_serve(settings, catalog, &bind).await
        }
    }
}
