//! src/services/storage_service.rs
//!
//! StorageService: upload policy and a uniform result vocabulary on top of
//! an [`ObjectBackend`]. The service holds no state of its own: every call
//! re-queries the backend, so one instance is cloned into every request.
//!
//! Uploads check existence before writing. The check and the write are not
//! atomic: two concurrent uploads of the same new name can both pass the
//! check, and the last writer's bytes survive.

use crate::{
    backend::{BackendError, BodyStream, ObjectBackend, ObjectStream},
    models::file::{DEFAULT_CONTENT_TYPE, FileRecord},
};
use futures::{StreamExt, stream};
use std::{io, path::Path, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_NAME_LEN: usize = 1024;

/// Concurrent HEAD requests issued while listing.
const LIST_STAT_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("file `{0}` already exists")]
    AlreadyExists(String),
    #[error("file too large; maximum size is {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("invalid file name: {0}")]
    InvalidName(&'static str),
    #[error("file extension of `{0}` is not allowed")]
    ExtensionNotAllowed(String),
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("storage backend error: {0}")]
    Unknown(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<BackendError> for StorageError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => StorageError::BackendUnavailable(msg),
            BackendError::Body(err) => StorageError::Unknown(format!("upload body: {err}")),
            BackendError::Other(msg) => StorageError::Unknown(msg),
        }
    }
}

/// Raised inside the upload stream once more than the allowed number of
/// bytes has arrived.
#[derive(Debug, Error)]
#[error("upload exceeded {limit} bytes")]
struct LimitExceeded {
    limit: u64,
}

/// Upload rules applied before anything reaches the backend.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: u64,
    /// Lowercase extensions without the leading dot. `None` accepts all.
    pub allowed_extensions: Option<Vec<String>>,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            allowed_extensions: None,
        }
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized: Vec<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.allowed_extensions = (!normalized.is_empty()).then_some(normalized);
        self
    }

    fn extension_allowed(&self, name: &str) -> bool {
        let Some(allowed) = &self.allowed_extensions else {
            return true;
        };
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| allowed.iter().any(|candidate| *candidate == ext))
    }
}

/// File operations exposed to the HTTP layer:
/// - upload a new file (never overwrites)
/// - download a file as a stream plus its record
/// - list every file with its current metadata
/// - fetch one file's metadata
/// - delete a file
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn ObjectBackend>,
    policy: UploadPolicy,
}

impl StorageService {
    pub fn new(backend: Arc<dyn ObjectBackend>, policy: UploadPolicy) -> Self {
        Self { backend, policy }
    }

    /// Names are opaque keys, but empty, oversized or control-character
    /// names are refused before they reach the store.
    fn ensure_name_valid(name: &str) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidName("name must not be empty"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StorageError::InvalidName("name longer than 1024 bytes"));
        }
        if name.chars().any(char::is_control) {
            return Err(StorageError::InvalidName("name contains control characters"));
        }
        Ok(())
    }

    /// Store `body` under `name`.
    ///
    /// - A known `declared_size` above the limit fails with `TooLarge`
    ///   without contacting the backend.
    /// - An existing object fails with `AlreadyExists`.
    /// - Missing or empty content types become `application/octet-stream`.
    /// - Bytes beyond the limit abort the transfer with `TooLarge`; nothing
    ///   is stored in that case.
    ///
    /// The returned size is what was actually transferred.
    pub async fn upload(
        &self,
        name: &str,
        body: BodyStream<'_>,
        declared_size: Option<u64>,
        content_type: Option<&str>,
    ) -> StorageResult<FileRecord> {
        Self::ensure_name_valid(name)?;
        if !self.policy.extension_allowed(name) {
            return Err(StorageError::ExtensionNotAllowed(name.to_string()));
        }

        let limit = self.policy.max_file_size;
        if declared_size.is_some_and(|size| size > limit) {
            debug!("rejecting {}: declared size {:?} > {}", name, declared_size, limit);
            return Err(StorageError::TooLarge { limit });
        }

        if self.backend.exists(name).await? {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }

        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let mut received: u64 = 0;
        let limited: BodyStream<'_> = Box::pin(body.map(move |chunk| {
            let chunk = chunk?;
            received += chunk.len() as u64;
            if received > limit {
                Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    LimitExceeded { limit },
                ))
            } else {
                Ok(chunk)
            }
        }));

        let meta = match self
            .backend
            .put(name, limited, declared_size, content_type)
            .await
        {
            Ok(meta) => meta,
            Err(BackendError::Body(err)) if is_limit_exceeded(&err) => {
                debug!("rejecting {}: streamed body exceeded {} bytes", name, limit);
                return Err(StorageError::TooLarge { limit });
            }
            Err(err) => {
                warn!("upload of {} failed: {}", name, err);
                return Err(err.into());
            }
        };

        info!("Successfully uploaded: {} ({} bytes)", name, meta.size);
        Ok(FileRecord::from_meta(name, meta))
    }

    /// Open `name` for streaming. The record describes the same object
    /// version as the bytes, so it is safe to use for response headers.
    pub async fn download(&self, name: &str) -> StorageResult<(FileRecord, ObjectStream)> {
        let (meta, stream) = self
            .backend
            .get(name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        Ok((FileRecord::from_meta(name, meta), stream))
    }

    /// Every file in the bucket, ordered by name.
    ///
    /// Listings do not carry content types, so each entry costs one extra
    /// HEAD request (a few in flight at a time). Objects deleted between the
    /// listing and their HEAD are left out.
    pub async fn list(&self) -> StorageResult<Vec<FileRecord>> {
        let summaries = self.backend.list().await?;

        let stats: Vec<_> = stream::iter(summaries)
            .map(|summary| {
                let backend = Arc::clone(&self.backend);
                async move {
                    let meta = backend.stat(&summary.name).await?;
                    Ok::<_, BackendError>(meta.map(|meta| FileRecord::from_meta(summary.name, meta)))
                }
            })
            .buffered(LIST_STAT_CONCURRENCY)
            .collect()
            .await;

        let mut records = Vec::with_capacity(stats.len());
        for stat in stats {
            if let Some(record) = stat? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub async fn get_info(&self, name: &str) -> StorageResult<FileRecord> {
        let meta = self
            .backend
            .stat(name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(FileRecord::from_meta(name, meta))
    }

    pub async fn delete(&self, name: &str) -> StorageResult<()> {
        if !self.backend.exists(name).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        // Someone else may have deleted it since the check.
        if !self.backend.delete(name).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        info!("Successfully deleted: {}", name);
        Ok(())
    }

    /// Readiness: the configured bucket exists and the store answers.
    pub async fn check_backend(&self) -> StorageResult<()> {
        self.backend.check_bucket().await?;
        Ok(())
    }
}

fn is_limit_exceeded(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<LimitExceeded>())
}
