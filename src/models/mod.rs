//! Data models for identity document extraction.

mod document;
mod fields;
mod trial;

pub use document::{DocumentImage, ImageKind, Rotation};
pub use fields::{FieldMapping, FieldSchema, FieldSpec, SchemaError};
pub use trial::{FailureKind, TrialOutcome, TrialResult};
