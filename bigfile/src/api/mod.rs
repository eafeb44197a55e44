pub mod dto;
pub mod file;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::file::{download_handler, status_handler, upload_chunk_handler};
use crate::utils::state::AppState;

/// Room for the text fields that travel alongside a chunk.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_chunk_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(|| async { "big file server is running" }))
        .route(
            "/BigFileUploader",
            post(upload_chunk_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/BigFileDownloader", get(download_handler))
        .route("/api/file/status", post(status_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
