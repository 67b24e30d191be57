//! Document type detection and schema resolution.
//!
//! `auto` schema selection costs one extra model call: the document-type
//! schema is submitted first and its answer picks the extraction schema.

use thiserror::Error;
use tracing::info;

use super::backend::{DocumentSubmitter, ExtractError};
use super::schemas::{SchemaCatalog, SchemaSelection, DOCUMENT_TYPE, DRIVERS_LICENCE, PASSPORT};
use crate::models::{DocumentImage, FieldSchema, SchemaError};

/// Identity document categories the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Passport,
    DriversLicence,
}

impl DocumentKind {
    /// Built-in schema used to extract this kind of document.
    pub fn schema_name(&self) -> &'static str {
        match self {
            DocumentKind::Passport => PASSPORT,
            DocumentKind::DriversLicence => DRIVERS_LICENCE,
        }
    }

    /// Interpret a classifier answer such as "passport" or "drivers_licence".
    pub fn from_answer(answer: &str) -> Option<Self> {
        let lowered = answer.to_lowercase();
        if lowered.contains("passport") {
            Some(DocumentKind::Passport)
        } else if lowered.contains("licen") || lowered.contains("driver") {
            Some(DocumentKind::DriversLicence)
        } else {
            None
        }
    }
}

/// Errors from choosing a schema for a document.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Document classification failed: {0}")]
    Extract(#[from] ExtractError),
}

/// Ask the model whether the document is a passport or a driver's licence.
pub async fn classify_document(
    submitter: &dyn DocumentSubmitter,
    image: &DocumentImage,
    catalog: &SchemaCatalog,
) -> Result<DocumentKind, SelectError> {
    let schema = catalog.get(DOCUMENT_TYPE)?;
    let mapping = submitter.submit(image, schema).await?;

    let answer = mapping.value("document_type").unwrap_or_default();
    let kind = DocumentKind::from_answer(answer).ok_or_else(|| {
        ExtractError::ApiError(format!("Unrecognized document type '{}'", answer))
    })?;

    info!(
        "Classified document as {:?}{}",
        kind,
        mapping
            .value("state")
            .map(|s| format!(" (state: {})", s))
            .unwrap_or_default()
    );
    Ok(kind)
}

/// Resolve a selection to a concrete schema, classifying the image for `Auto`.
pub async fn resolve_schema<'a>(
    selection: &SchemaSelection,
    submitter: &dyn DocumentSubmitter,
    image: &DocumentImage,
    catalog: &'a SchemaCatalog,
) -> Result<&'a FieldSchema, SelectError> {
    match selection {
        SchemaSelection::Named(name) => Ok(catalog.get(name)?),
        SchemaSelection::Auto => {
            let kind = classify_document(submitter, image, catalog).await?;
            Ok(catalog.get(kind.schema_name())?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::backend::scripted::ScriptedSubmitter;
    use crate::models::FieldMapping;
    use crate::utils::image::fixtures::png_bytes;

    fn image() -> DocumentImage {
        DocumentImage::from_bytes(png_bytes(2, 2), 1 << 20).unwrap()
    }

    #[test]
    fn test_from_answer() {
        assert_eq!(DocumentKind::from_answer("passport"), Some(DocumentKind::Passport));
        assert_eq!(
            DocumentKind::from_answer("drivers_licence"),
            Some(DocumentKind::DriversLicence)
        );
        assert_eq!(
            DocumentKind::from_answer("Driver's License"),
            Some(DocumentKind::DriversLicence)
        );
        assert_eq!(DocumentKind::from_answer("library card"), None);
    }

    #[tokio::test]
    async fn test_auto_selects_drivers_licence() {
        let submitter = ScriptedSubmitter::new(vec![Ok(FieldMapping::from_pairs([
            ("document_type", Some("drivers_licence")),
            ("state", Some("Texas")),
        ]))]);
        let catalog = SchemaCatalog::builtin();

        let schema = resolve_schema(&SchemaSelection::Auto, &submitter, &image(), &catalog)
            .await
            .unwrap();
        assert_eq!(schema.name, DRIVERS_LICENCE);
        assert_eq!(submitter.calls(), 1);
    }

    #[tokio::test]
    async fn test_named_selection_skips_classification() {
        let submitter = ScriptedSubmitter::new(Vec::new());
        let catalog = SchemaCatalog::builtin();

        let schema = resolve_schema(
            &SchemaSelection::Named("passport".into()),
            &submitter,
            &image(),
            &catalog,
        )
        .await
        .unwrap();
        assert_eq!(schema.name, PASSPORT);
        assert_eq!(submitter.calls(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_answer_is_error() {
        let submitter = ScriptedSubmitter::new(vec![Ok(FieldMapping::from_pairs([
            ("document_type", None::<&str>),
            ("state", None),
        ]))]);
        let err = classify_document(&submitter, &image(), &SchemaCatalog::builtin())
            .await
            .unwrap_err();
        assert!(matches!(err, SelectError::Extract(ExtractError::ApiError(_))));
    }
}
