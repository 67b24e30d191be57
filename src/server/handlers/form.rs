//! Multipart upload parsing shared by the web form and JSON API.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use thiserror::Error;

use crate::evaluation::{GroundTruth, GroundTruthError};
use crate::extract::{ExtractError, SchemaSelection, SelectError};
use crate::models::{DocumentImage, Rotation, SchemaError};
use crate::utils::image::ImageError;

/// Largest trial count accepted from the web form.
pub const MAX_FORM_TRIALS: usize = 100;

/// Errors from reading or validating a submitted form.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("Could not read upload: {message}")]
    Multipart { status: StatusCode, message: String },

    #[error("No image was uploaded")]
    MissingImage,

    #[error("Invalid image: {0}")]
    Image(#[from] ImageError),

    #[error("Trials must be a whole number between 1 and {max}, got '{0}'", max = MAX_FORM_TRIALS)]
    InvalidTrials(String),

    #[error("Invalid ground truth: {0}")]
    GroundTruth(#[from] GroundTruthError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl From<MultipartError> for FormError {
    fn from(err: MultipartError) -> Self {
        FormError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<SelectError> for FormError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::Schema(e) => FormError::Schema(e),
            SelectError::Extract(e) => FormError::Extract(e),
        }
    }
}

impl FormError {
    /// HTTP status for JSON API responses.
    pub fn status(&self) -> StatusCode {
        match self {
            FormError::Multipart { status, .. } => *status,
            FormError::MissingImage | FormError::InvalidTrials(_) | FormError::GroundTruth(_) => {
                StatusCode::BAD_REQUEST
            }
            FormError::Schema(_) => StatusCode::BAD_REQUEST,
            FormError::Image(ImageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            FormError::Image(ImageError::InvalidRotation(_)) => StatusCode::BAD_REQUEST,
            FormError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FormError::Extract(e) => extract_status(e),
        }
    }
}

/// HTTP status for a failed submission.
pub fn extract_status(err: &ExtractError) -> StatusCode {
    match err {
        ExtractError::InvalidImage(ImageError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        ExtractError::InvalidImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ExtractError::ApiError(_) => StatusCode::BAD_GATEWAY,
        ExtractError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ExtractError::MissingCredential(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Raw fields of an upload form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub rotation: Option<String>,
    pub schema: Option<String>,
    pub trials: Option<String>,
    pub ground_truth: Option<String>,
}

impl UploadForm {
    /// Read every part of a multipart request. Unknown parts are ignored.
    pub async fn read(mut multipart: Multipart) -> Result<Self, FormError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let file_name = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.image = Some(bytes.to_vec());
                        form.file_name = file_name;
                    }
                }
                "rotation" => form.rotation = Some(field.text().await?),
                "schema" => form.schema = Some(field.text().await?),
                "trials" => form.trials = Some(field.text().await?),
                "ground_truth" => form.ground_truth = Some(field.text().await?),
                _ => {
                    tracing::debug!("Ignoring unknown form field '{}'", name);
                }
            }
        }

        Ok(form)
    }

    /// Validate the uploaded image and apply the requested rotation.
    pub fn document(&mut self, max_bytes: usize) -> Result<DocumentImage, FormError> {
        let bytes = self.image.take().ok_or(FormError::MissingImage)?;
        let rotation: Rotation = self.rotation.as_deref().unwrap_or_default().parse()?;

        let image = DocumentImage::from_bytes(bytes, max_bytes)?.with_rotation(rotation);
        Ok(match self.file_name.take() {
            Some(name) if !name.is_empty() => image.with_file_name(name),
            _ => image,
        })
    }

    pub fn selection(&self) -> SchemaSelection {
        self.schema
            .as_deref()
            .unwrap_or_default()
            .parse()
            .unwrap_or(SchemaSelection::Auto)
    }

    /// Requested trial count, defaulting to `default` when left blank.
    pub fn trials(&self, default: usize) -> Result<usize, FormError> {
        match self.trials.as_deref().map(str::trim) {
            None | Some("") => Ok(default.clamp(1, MAX_FORM_TRIALS)),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if (1..=MAX_FORM_TRIALS).contains(&n) => Ok(n),
                _ => Err(FormError::InvalidTrials(raw.to_string())),
            },
        }
    }

    pub fn ground_truth(&self) -> Result<GroundTruth, FormError> {
        Ok(GroundTruth::from_lines(
            self.ground_truth.as_deref().unwrap_or_default(),
        )?)
    }

    pub fn rotation_degrees(&self) -> u32 {
        self.rotation
            .as_deref()
            .and_then(|r| r.parse::<Rotation>().ok())
            .map(|r| r.degrees())
            .unwrap_or(0)
    }
}
