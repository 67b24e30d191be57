//! Shared helper functions for CLI commands.

use std::path::Path;

use anyhow::Context;
use console::style;

use kycscan::config::Settings;
use kycscan::extract::{
    resolve_schema, ChatCompletionSubmitter, DocumentSubmitter, ExtractError, SchemaCatalog,
    SchemaSelection,
};
use kycscan::models::{DocumentImage, FieldSchema, Rotation};
use kycscan::utils::format_size;

/// Read and validate an image file, applying the requested rotation.
pub fn load_image(path: &Path, rotation: Rotation, settings: &Settings) -> anyhow::Result<DocumentImage> {
    let image = DocumentImage::open(path, settings.max_image_bytes)
        .with_context(|| format!("Failed to load image {}", path.display()))?;
    Ok(image.with_rotation(rotation))
}

/// Build the API submitter, failing early when no API key is configured.
pub fn build_submitter(settings: &Settings) -> anyhow::Result<ChatCompletionSubmitter> {
    let submitter = ChatCompletionSubmitter::from_settings(settings)?;
    if !submitter.has_api_key() {
        return Err(ExtractError::MissingCredential(settings.api_key_env.clone()).into());
    }
    Ok(submitter)
}

/// One-line description of an image for progress output.
pub fn describe_image(image: &DocumentImage) -> String {
    let mut parts = vec![format_size(image.len()), image.kind().to_string()];
    if image.rotation().degrees() != 0 {
        parts.push(format!("rotated {}°", image.rotation().degrees()));
    }
    format!(
        "{} ({})",
        image.file_name().unwrap_or("image"),
        parts.join(", ")
    )
}

/// Resolve the schema, reporting the classifier's choice when it was automatic.
pub async fn choose_schema<'a>(
    selection: &SchemaSelection,
    submitter: &dyn DocumentSubmitter,
    image: &DocumentImage,
    catalog: &'a SchemaCatalog,
    quiet: bool,
) -> anyhow::Result<&'a FieldSchema> {
    let schema = resolve_schema(selection, submitter, image, catalog).await?;
    if !quiet && *selection == SchemaSelection::Auto {
        println!(
            "  {} Detected document type: {}",
            style("✓").green(),
            style(&schema.name).bold()
        );
    }
    Ok(schema)
}
