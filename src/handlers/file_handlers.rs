//! HTTP handlers for file operations.
//! Streams bodies in both directions and delegates policy to
//! `StorageService`.

use crate::{
    errors::AppError,
    models::file::{DEFAULT_CONTENT_TYPE, FileRecord},
    services::storage_service::StorageService,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::io;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// `POST /files/upload` — multipart body with one file part.
///
/// The first part carrying a filename is streamed straight into the
/// service; other parts are skipped.
pub async fn upload_file(
    State(service): State<StorageService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let declared_size = field
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let stream = field.map(|chunk| chunk.map_err(io::Error::other));
        let record = service
            .upload(
                &filename,
                Box::pin(stream),
                declared_size,
                content_type.as_deref(),
            )
            .await?;

        return Ok(Json(UploadResponse {
            message: format!("File {} uploaded successfully", record.name),
            filename: record.name,
            size: record.size,
            content_type: record.content_type,
        }));
    }

    Err(AppError::bad_request("Missing file part in multipart body"))
}

/// `GET /files/download/{name}` — stream the object as an attachment.
pub async fn download_file(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let (record, stream) = service.download(&name).await?;

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &record);
    Ok(response)
}

/// `GET /files` — every file, ordered by name.
pub async fn list_files(
    State(service): State<StorageService>,
) -> Result<Json<Vec<FileRecord>>, AppError> {
    Ok(Json(service.list().await?))
}

/// `DELETE /files/{name}`
pub async fn delete_file(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    service.delete(&name).await?;
    Ok(Json(MessageResponse {
        message: format!("File {name} deleted successfully"),
    }))
}

/// `GET /files/{name}/info`
pub async fn get_file_info(
    State(service): State<StorageService>,
    Path(name): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(service.get_info(&name).await?))
}

fn set_file_headers(headers: &mut HeaderMap, record: &FileRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size));

    if let Ok(value) = HeaderValue::from_str(&content_disposition(&record.name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Ok(value) = HeaderValue::from_str(
        &record
            .last_modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    ) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// `attachment; filename=<name>` for plain ASCII names; anything else is
/// sent in the RFC 6266 `filename*` form.
fn content_disposition(name: &str) -> String {
    let plain = name
        .bytes()
        .all(|b| b.is_ascii_graphic() || b == b' ')
        && !name.contains(['"', ';', '\\']);
    if plain {
        format!("attachment; filename={name}")
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        )
    }
}
