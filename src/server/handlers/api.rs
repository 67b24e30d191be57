//! JSON API handlers.

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::super::AppState;
use super::extract::run_extraction;
use super::form::{FormError, UploadForm};
use crate::models::{FieldMapping, FieldSchema};

/// Successful `/api/extract` response body.
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub schema: String,
    pub fields: FieldMapping,
    pub elapsed_ms: u64,
}

fn error_response(err: FormError) -> Response {
    let status = err.status();
    tracing::warn!("API request failed with {}: {}", status, err);
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// List every schema the server knows, including the classifier.
pub async fn api_schemas(State(state): State<AppState>) -> Json<Vec<FieldSchema>> {
    Json(state.catalog.iter().cloned().collect())
}

/// Extract fields from an uploaded image and return them as JSON.
pub async fn api_extract(State(state): State<AppState>, multipart: Multipart) -> Response {
    let mut form = match UploadForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => return error_response(e),
    };

    match run_extraction(&state, &mut form).await {
        Ok(extraction) => Json(ExtractResponse {
            schema: extraction.schema,
            fields: extraction.fields,
            elapsed_ms: extraction.elapsed_ms,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}
