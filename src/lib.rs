//! kycscan - identity document field extraction with vision models.
//!
//! Extracts fields such as names and dates from passport and driver's licence
//! images through an OpenAI-compatible vision API, and measures extraction
//! reliability by repeating the same request and aggregating per-field
//! accuracy.

pub mod config;
pub mod evaluation;
pub mod extract;
pub mod models;
pub mod server;
pub mod utils;
