//! Shared utility functions.
//!
//! - `image`: content sniffing, rotation and payload encoding
//! - `format`: human-readable sizes and durations

mod format;
pub mod image;

pub use format::{format_elapsed, format_size};
