//! Document submitter abstraction.
//!
//! A submitter sends one document image plus an extraction schema to a model
//! and returns the extracted field mapping. Implementations perform exactly one
//! outbound request per call and never retry.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DocumentImage, FailureKind, FieldMapping, FieldSchema};
use crate::utils::image::ImageError;

/// Errors from a single submission.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API key not set. Export {0} or add it to a .env file")]
    MissingCredential(String),
}

impl ExtractError {
    /// Category recorded on a failed trial.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExtractError::InvalidImage(_) => FailureKind::InvalidImage,
            ExtractError::ApiError(_) | ExtractError::MissingCredential(_) => FailureKind::ApiError,
            ExtractError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Trait for document extraction backends.
#[async_trait]
pub trait DocumentSubmitter: Send + Sync {
    /// Short label for logs, e.g. the model identifier.
    fn describe(&self) -> String;

    /// Extract every schema field from the image.
    ///
    /// The returned mapping has exactly the schema's field names in schema
    /// order; fields the model could not find are `None`.
    async fn submit(
        &self,
        image: &DocumentImage,
        schema: &FieldSchema,
    ) -> Result<FieldMapping, ExtractError>;
}
