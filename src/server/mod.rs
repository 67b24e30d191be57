//! Web form for document extraction and accuracy evaluation.
//!
//! Provides:
//! - A single-shot extraction form with the result rendered inline
//! - A repeated-trial evaluation form with the accuracy table
//! - A small JSON API for schemas and extraction

mod assets;
mod handlers;
mod routes;
mod template_structs;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::extract::{ChatCompletionSubmitter, DocumentSubmitter, ExtractError, SchemaCatalog};

/// Shared state for the web server. Immutable once the server starts.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub catalog: Arc<SchemaCatalog>,
    pub submitter: Arc<dyn DocumentSubmitter>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        catalog: SchemaCatalog,
        submitter: Arc<dyn DocumentSubmitter>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            catalog: Arc::new(catalog),
            submitter,
        }
    }

    /// State backed by the configured chat completions endpoint.
    pub fn from_settings(settings: Settings, catalog: SchemaCatalog) -> Result<Self, ExtractError> {
        let submitter = ChatCompletionSubmitter::from_settings(&settings)?;
        Ok(Self::new(settings, catalog, Arc::new(submitter)))
    }
}

/// Start the web server.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("Extracting with {}", state.submitter.describe());
    let app = create_router(state);

    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
