//! Single extraction command.

use std::path::Path;
use std::time::Instant;

use console::style;

use super::super::helpers::{build_submitter, choose_schema, describe_image, load_image};
use kycscan::config::Settings;
use kycscan::evaluation::render_field_mapping;
use kycscan::extract::{DocumentSubmitter, SchemaCatalog, SchemaSelection};
use kycscan::models::Rotation;
use kycscan::utils::format_elapsed;

/// Extract fields from one image with a single request.
pub async fn cmd_extract(
    settings: &Settings,
    catalog: &SchemaCatalog,
    path: &Path,
    selection: &SchemaSelection,
    rotation: Rotation,
    json: bool,
) -> anyhow::Result<()> {
    let image = load_image(path, rotation, settings)?;
    let submitter = build_submitter(settings)?;

    if !json {
        println!(
            "{} Extracting fields from {} with {}",
            style("→").cyan(),
            describe_image(&image),
            submitter.describe()
        );
    }

    let schema = choose_schema(selection, &submitter, &image, catalog, json).await?;

    let started = Instant::now();
    let fields = submitter.submit(&image, schema).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
        return Ok(());
    }

    println!();
    print!("{}", render_field_mapping(&fields));
    println!();
    println!(
        "{} {}/{} fields found using schema '{}' in {}",
        style("✓").green(),
        fields.found_count(),
        fields.len(),
        schema.name,
        format_elapsed(elapsed_ms)
    );

    Ok(())
}
