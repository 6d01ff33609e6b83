//! nota-omr library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod analysis;
pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod notation;
pub mod pipeline;
pub mod preprocess;
pub mod services;
pub mod text_extraction;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;

use nota_common::ServiceConfig;

use crate::pipeline::queue::JobSender;
use crate::services::summarizer::Summarizer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved service configuration
    pub config: ServiceConfig,
    /// Submission handle for the pipeline worker
    pub job_tx: JobSender,
    /// Generative summary client (may be unconfigured)
    pub summarizer: Arc<Summarizer>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServiceConfig, job_tx: JobSender) -> Self {
        let summarizer = Arc::new(Summarizer::new(&config));
        Self {
            db,
            config,
            job_tx,
            summarizer,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::extract::DefaultBodyLimit;
    use axum::routing::{get, post};

    Router::new()
        .route("/health", get(api::health))
        // Scanned scores routinely exceed axum's 2 MB default body limit
        .route(
            "/api/upload",
            post(api::upload_score).layer(DefaultBodyLimit::max(api::MAX_UPLOAD_BYTES)),
        )
        .route("/api/scores", get(api::list_scores))
        .route("/api/scores/:id", get(api::get_score))
        .route("/api/scores/:id/musicxml", get(api::serve_musicxml))
        .route("/api/scores/:id/midi", get(api::serve_midi))
        .route("/api/scores/:id/summary", post(api::generate_summary))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
