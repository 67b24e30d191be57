//! Router configuration for the web server.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Room for the non-file form fields and multipart framing.
const FORM_OVERHEAD: usize = 64 * 1024;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.max_image_bytes + FORM_OVERHEAD;

    Router::new()
        // Single extraction
        .route("/", get(handlers::extract_form))
        .route("/extract", post(handlers::extract_submit))
        // Repeated-trial evaluation
        .route(
            "/evaluate",
            get(handlers::evaluate_form).post(handlers::evaluate_submit),
        )
        // JSON API
        .route("/api/schemas", get(handlers::api_schemas))
        .route("/api/extract", post(handlers::api_extract))
        // Static assets
        .route("/static/style.css", get(handlers::serve_css))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
