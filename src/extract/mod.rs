//! Field extraction from identity document images.
//!
//! - `backend`: the `DocumentSubmitter` trait and `ExtractError`
//! - `chat_completion`: OpenAI-compatible vision API submitter
//! - `schemas`: built-in passport / driver's licence schemas and the catalog
//! - `classify`: document type detection for automatic schema selection
//! - `response`: lenient parsing of model replies

mod backend;
mod chat_completion;
mod classify;
mod response;
mod schemas;

pub use backend::{DocumentSubmitter, ExtractError};
pub use chat_completion::ChatCompletionSubmitter;
pub use classify::{classify_document, resolve_schema, DocumentKind, SelectError};
pub use response::parse_field_mapping;
pub use schemas::{
    document_type_schema, drivers_licence_schema, passport_schema, render_instruction,
    SchemaCatalog, SchemaSelection, DOCUMENT_TYPE, DRIVERS_LICENCE, PASSPORT,
};

#[cfg(test)]
pub(crate) use backend::scripted;
