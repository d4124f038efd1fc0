//! Health & readiness handlers.
//!
//! - GET /        -> service banner
//! - GET /health  -> simple liveness
//! - GET /readyz  -> readiness that checks the object store is reachable

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

const SERVICE_NAME: &str = "file-server";

/// `GET /`
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        message: "File server is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /health`
///
/// Liveness probe. Always 200 and never performs I/O.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: SERVICE_NAME,
        }),
    )
}

/// `GET /readyz`
///
/// 200 when the bucket exists and answers, 503 otherwise. The failure
/// detail goes to the log only.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    match service.check_backend().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ok",
                error: None,
            }),
        ),
        Err(err) => {
            tracing::warn!("readiness check failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "error",
                    error: Some("backend_unavailable"),
                }),
            )
        }
    }
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}
