//! Defines routes for all file operations.
//!
//! ## Structure
//! - **File endpoints** (served at the root and again under `/api/v1`)
//!   - `POST   /files/upload`          — multipart upload
//!   - `GET    /files/download/{name}` — stream file contents
//!   - `GET    /files`                 — list files with metadata
//!   - `DELETE /files/{name}`          — delete file
//!   - `GET    /files/{name}/info`     — file metadata
//!
//! - **Service endpoints**
//!   - `GET /`, `GET /health`, `GET /readyz`

use crate::{
    handlers::{
        file_handlers::{delete_file, download_file, get_file_info, list_files, upload_file},
        health_handlers::{health, readyz, root},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Prefix used by the existing command-line and demo clients.
pub const API_PREFIX: &str = "/api/v1";

/// Build the full router.
///
/// The router carries shared state (`StorageService`) to all handlers.
/// Axum's default body limit is lifted because the service enforces the
/// configured upload size while streaming.
pub fn routes() -> Router<StorageService> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .merge(file_routes())
        .nest(API_PREFIX, file_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn file_routes() -> Router<StorageService> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/upload", post(upload_file))
        .route("/files/download/{name}", get(download_file))
        .route("/files/{name}", delete(delete_file))
        .route("/files/{name}/info", get(get_file_info))
}
