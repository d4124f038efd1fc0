//! End-to-end checks of the HTTP surface against the in-memory backend.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use file_gateway::{
    backend::{MemoryBackend, ObjectBackend},
    routes::routes::routes,
    services::storage_service::{StorageService, UploadPolicy},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "X-FILE-GATEWAY-BOUNDARY";

fn app_with(policy: UploadPolicy) -> (Router, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let service = StorageService::new(backend.clone(), policy);
    (routes().with_state(service), backend)
}

fn app() -> (Router, Arc<MemoryBackend>) {
    app_with(UploadPolicy::new(1024))
}

fn multipart_body(filename: &str, content_type: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
    )
    .into_bytes();
    if let Some(ct) = content_type {
        body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(path: &str, filename: &str, content_type: Option<&str>, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(filename, content_type, data)))
        .unwrap()
}

fn request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn json(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn notes_scenario_upload_info_download_delete() {
    let (app, _) = app();

    let resp = send(
        &app,
        upload_request("/files/upload", "notes.txt", Some("text/plain"), b"hello world"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await;
    assert_eq!(body["filename"], "notes.txt");
    assert_eq!(body["size"], 11);
    assert_eq!(body["content_type"], "text/plain");
    assert_eq!(body["message"], "File notes.txt uploaded successfully");

    let resp = send(&app, request(Method::GET, "/files/notes.txt/info")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let info = json(resp).await;
    assert_eq!(info["name"], "notes.txt");
    assert_eq!(info["size"], 11);
    assert_eq!(info["content_type"], "text/plain");
    assert_eq!(info["last_modified"].as_str().unwrap().len(), "2024-01-01 00:00:00".len());

    let resp = send(&app, request(Method::GET, "/files/download/notes.txt")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=notes.txt"
    );
    assert_eq!(resp.headers()[header::CONTENT_LENGTH], "11");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world");

    let resp = send(&app, request(Method::DELETE, "/files/notes.txt")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["message"], "File notes.txt deleted successfully");

    let resp = send(&app, request(Method::GET, "/files/notes.txt/info")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(resp).await["error"], "not_found");
}

#[tokio::test]
async fn duplicate_upload_is_conflict() {
    let (app, _) = app();
    let first = send(&app, upload_request("/files/upload", "a.bin", None, b"one")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json(first).await["content_type"], "application/octet-stream");

    let second = send(&app, upload_request("/files/upload", "a.bin", None, b"two")).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(json(second).await["error"], "already_exists");

    let resp = send(&app, request(Method::GET, "/files/download/a.bin")).await;
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"one");
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_not_stored() {
    let (app, backend) = app_with(UploadPolicy::new(8));
    let resp = send(
        &app,
        upload_request("/files/upload", "big.bin", None, b"more than eight bytes"),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json(resp).await["error"], "too_large");

    assert!(!backend.exists("big.bin").await.unwrap());
}

#[tokio::test]
async fn disallowed_extension_is_unsupported_media_type() {
    let (app, _) = app_with(UploadPolicy::new(1024).with_allowed_extensions(["txt"]));
    let resp = send(&app, upload_request("/files/upload", "run.exe", None, b"MZ")).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json(resp).await["error"], "extension_not_allowed");
}

#[tokio::test]
async fn upload_without_file_part_is_bad_request() {
    let (app, _) = app();
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nno file here\r\n--{BOUNDARY}--\r\n"
    );
    let req = Request::builder()
        .method(Method::POST)
        .uri("/files/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(resp).await["error"], "bad_request");
}

#[tokio::test]
async fn missing_files_are_404_for_download_info_and_delete() {
    let (app, _) = app();
    for (method, path) in [
        (Method::GET, "/files/download/ghost.txt"),
        (Method::GET, "/files/ghost.txt/info"),
        (Method::DELETE, "/files/ghost.txt"),
    ] {
        let resp = send(&app, request(method, path)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn listing_under_api_prefix_is_ordered_and_complete() {
    let (app, _) = app();
    for (name, ct, data) in [
        ("c.txt", Some("text/plain"), &b"ccc"[..]),
        ("a.json", Some("application/json"), &b"{}"[..]),
        ("b.bin", None, &b"b"[..]),
    ] {
        let resp = send(&app, upload_request("/api/v1/files/upload", name, ct, data)).await;
        assert_eq!(resp.status(), StatusCode::OK, "{name}");
    }

    let resp = send(&app, request(Method::GET, "/api/v1/files")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let list = json(resp).await;
    let entries: Vec<(String, u64, String)> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|f| {
            (
                f["name"].as_str().unwrap().to_string(),
                f["size"].as_u64().unwrap(),
                f["content_type"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        entries,
        vec![
            ("a.json".to_string(), 2, "application/json".to_string()),
            ("b.bin".to_string(), 1, "application/octet-stream".to_string()),
            ("c.txt".to_string(), 3, "text/plain".to_string()),
        ]
    );
}

#[tokio::test]
async fn backend_outage_is_500_and_not_ready() {
    let (app, backend) = app();
    backend.ensure_bucket().await.unwrap();
    backend.set_offline(true);

    let resp = send(&app, request(Method::GET, "/files")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(resp).await["error"], "backend_unavailable");

    let resp = send(&app, request(Method::GET, "/readyz")).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json(resp).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "backend_unavailable");

    backend.set_offline(false);
    let resp = send(&app, request(Method::GET, "/readyz")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_bucket_is_not_ready() {
    let (app, backend) = app();

    let resp = send(&app, request(Method::GET, "/readyz")).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    backend.ensure_bucket().await.unwrap();
    let resp = send(&app, request(Method::GET, "/readyz")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["status"], "ok");
}

#[tokio::test]
async fn declared_part_length_over_limit_is_rejected_before_backend() {
    let (app, backend) = app_with(UploadPolicy::new(8));
    backend.set_offline(true);

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"big.bin\"\r\nContent-Length: 4096\r\n\r\nsmall\r\n--{BOUNDARY}--\r\n"
    );
    let req = Request::builder()
        .method(Method::POST)
        .uri("/files/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    // An offline backend would answer 500; 413 means it was never asked.
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json(resp).await["error"], "too_large");
}

#[tokio::test]
async fn health_and_root_respond() {
    let (app, _) = app();

    let resp = send(&app, request(Method::GET, "/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "file-server");

    let resp = send(&app, request(Method::GET, "/")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["version"], env!("CARGO_PKG_VERSION"));
}
