//! Object-store backends.
//!
//! [`ObjectBackend`] is the narrow set of primitives the storage service
//! needs from one bucket of a remote object store. "No such key" is never an
//! error here: queryable operations report it as `false` / `None`.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::{io, pin::Pin};
use thiserror::Error;

pub use memory::MemoryBackend;
pub use s3::{S3Backend, S3Settings};

/// Upload body handed to [`ObjectBackend::put`]. It may borrow from the
/// request that produced it.
pub type BodyStream<'a> = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>>;

/// Lazily read object body returned by [`ObjectBackend::get`]. Dropping it
/// releases the underlying backend connection.
pub type ObjectStream = BodyStream<'static>;

/// Metadata of a single stored object, fetched without transferring bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
}

/// One entry of a bucket listing. Listings carry no content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The object store could not be reached (connect, dispatch, timeout).
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    /// The caller-supplied upload stream failed before the write completed.
    #[error("upload body failed: {0}")]
    Body(#[source] io::Error),
    #[error("object store error: {0}")]
    Other(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Primitives against the single configured bucket.
#[async_trait]
pub trait ObjectBackend: Send + Sync + 'static {
    /// Create the bucket if it does not exist yet. Idempotent.
    async fn ensure_bucket(&self) -> BackendResult<()>;

    /// Fails unless the bucket exists and answers. A missing bucket is an
    /// error here, unlike a missing object.
    async fn check_bucket(&self) -> BackendResult<()>;

    async fn exists(&self, name: &str) -> BackendResult<bool>;

    /// Write `body` under `name`, overwriting silently. The returned size is
    /// the number of bytes actually transferred, not `declared_size`.
    async fn put(
        &self,
        name: &str,
        body: BodyStream<'_>,
        declared_size: Option<u64>,
        content_type: &str,
    ) -> BackendResult<ObjectMeta>;

    /// Open `name` for reading. The metadata comes from the same response
    /// as the body, so both always describe one version of the object.
    async fn get(&self, name: &str) -> BackendResult<Option<(ObjectMeta, ObjectStream)>>;

    async fn stat(&self, name: &str) -> BackendResult<Option<ObjectMeta>>;

    /// Every object in the bucket, in the order the store returns them.
    async fn list(&self) -> BackendResult<Vec<ObjectSummary>>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, name: &str) -> BackendResult<bool>;
}
