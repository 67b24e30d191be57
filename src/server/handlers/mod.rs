//! HTTP request handlers for the web server.

mod api;
mod evaluate;
mod extract;
mod form;
mod static_files;

// Re-export handlers for use by the router
pub use api::{api_extract, api_schemas};
pub use evaluate::{evaluate_form, evaluate_submit};
pub use extract::{extract_form, extract_submit};
pub use static_files::serve_css;
