use crate::services::storage_service::StorageError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An HTTP-facing error: status code, short machine-checkable reason, and a
/// human-readable message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub reason: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, reason and message.
    pub fn new(status: StatusCode, reason: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.reason,
            "detail": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "not_found", "File not found")
            }
            StorageError::AlreadyExists(_) => {
                AppError::new(StatusCode::CONFLICT, "already_exists", err.to_string())
            }
            StorageError::TooLarge { limit } => AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "too_large",
                format!("File too large. Maximum size is {limit} bytes"),
            ),
            StorageError::InvalidName(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "invalid_name", err.to_string())
            }
            StorageError::ExtensionNotAllowed(_) => AppError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "extension_not_allowed",
                err.to_string(),
            ),
            // Backend text stays in the logs; clients only learn the category.
            StorageError::BackendUnavailable(ref detail) => {
                tracing::error!("storage backend unavailable: {}", detail);
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "backend_unavailable",
                    "Storage backend unavailable",
                )
            }
            StorageError::Unknown(ref detail) => {
                tracing::error!("storage backend error: {}", detail);
                AppError::internal("Storage backend error")
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::bad_request(format!("Malformed multipart body: {}", err.body_text()))
    }
}
