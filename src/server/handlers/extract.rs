//! Single extraction form handlers.

use std::time::Instant;

use askama::Template;
use axum::{
    extract::{Multipart, State},
    response::Html,
};
use tracing::info;

use super::super::template_structs::{ExtractTemplate, ExtractView, FormState};
use super::super::AppState;
use super::form::{FormError, UploadForm};
use crate::extract::resolve_schema;
use crate::models::FieldMapping;

/// A completed single extraction.
pub struct Extraction {
    pub schema: String,
    pub file_name: Option<String>,
    pub fields: FieldMapping,
    pub elapsed_ms: u64,
}

/// Validate the upload, pick the schema and run one submission.
pub async fn run_extraction(state: &AppState, form: &mut UploadForm) -> Result<Extraction, FormError> {
    let image = form.document(state.settings.max_image_bytes)?;
    let selection = form.selection();

    let started = Instant::now();
    let schema = resolve_schema(&selection, state.submitter.as_ref(), &image, &state.catalog).await?;
    let fields = state.submitter.submit(&image, schema).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        "Extracted {}/{} fields with schema '{}' in {}ms",
        fields.found_count(),
        fields.len(),
        schema.name,
        elapsed_ms
    );

    Ok(Extraction {
        schema: schema.name.clone(),
        file_name: image.file_name().map(str::to_string),
        fields,
        elapsed_ms,
    })
}

fn render(template: ExtractTemplate<'_>) -> Html<String> {
    Html(
        template
            .render()
            .unwrap_or_else(|e| format!("Template error: {}", e)),
    )
}

/// Empty extraction form.
pub async fn extract_form(State(state): State<AppState>) -> Html<String> {
    render(ExtractTemplate {
        title: "Extract fields",
        form: FormState::new(&state.catalog, "auto", 0, state.settings.max_image_bytes),
        error: String::new(),
        has_error: false,
        result: Vec::new(),
    })
}

/// Run one extraction and show the result (or the error) under the form.
pub async fn extract_submit(State(state): State<AppState>, multipart: Multipart) -> Html<String> {
    let max_bytes = state.settings.max_image_bytes;
    let mut form = match UploadForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => {
            return render(ExtractTemplate {
                title: "Extract fields",
                form: FormState::new(&state.catalog, "auto", 0, max_bytes),
                error: e.to_string(),
                has_error: true,
                result: Vec::new(),
            })
        }
    };

    let form_state = FormState::new(
        &state.catalog,
        form.schema.as_deref().unwrap_or_default(),
        form.rotation_degrees(),
        max_bytes,
    );

    match run_extraction(&state, &mut form).await {
        Ok(extraction) => render(ExtractTemplate {
            title: "Extract fields",
            form: form_state,
            error: String::new(),
            has_error: false,
            result: vec![ExtractView::new(
                &extraction.schema,
                extraction.file_name.as_deref(),
                &extraction.fields,
                extraction.elapsed_ms,
            )],
        }),
        Err(e) => render(ExtractTemplate {
            title: "Extract fields",
            form: form_state,
            error: e.to_string(),
            has_error: true,
            result: Vec::new(),
        }),
    }
}
