//! In-process backend.
//!
//! Objects live in a `tokio::sync::RwLock<BTreeMap<..>>`, so listings come
//! back name-ordered like an S3 bucket. Used by the test suite and by
//! `--backend memory` for local runs without an object store.

use super::{
    BackendError, BackendResult, BodyStream, ObjectBackend, ObjectMeta, ObjectStream,
    ObjectSummary,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use tracing::debug;

/// Chunk size used when replaying stored bytes as a stream.
const READ_CHUNK: usize = 64 * 1024;

struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    bucket_ready: AtomicBool,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection to the object store.
    /// While offline every call fails with [`BackendError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn bucket_ready(&self) -> bool {
        self.bucket_ready.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> BackendResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("memory backend is offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn ensure_bucket(&self) -> BackendResult<()> {
        self.check_online()?;
        self.bucket_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn check_bucket(&self) -> BackendResult<()> {
        self.check_online()?;
        if self.bucket_ready() {
            Ok(())
        } else {
            Err(BackendError::Other("bucket has not been created".into()))
        }
    }

    async fn exists(&self, name: &str) -> BackendResult<bool> {
        self.check_online()?;
        Ok(self.objects.read().await.contains_key(name))
    }

    async fn put(
        &self,
        name: &str,
        mut body: BodyStream<'_>,
        declared_size: Option<u64>,
        content_type: &str,
    ) -> BackendResult<ObjectMeta> {
        self.check_online()?;

        let mut buf = BytesMut::with_capacity(declared_size.unwrap_or(0).min(1 << 20) as usize);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(BackendError::Body)?;
            buf.extend_from_slice(&chunk);
        }

        let stored = StoredObject {
            data: buf.freeze(),
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        let meta = ObjectMeta {
            size: stored.data.len() as u64,
            last_modified: stored.last_modified,
            content_type: Some(stored.content_type.clone()),
        };
        debug!("memory put {} ({} bytes)", name, meta.size);
        self.objects.write().await.insert(name.to_string(), stored);
        Ok(meta)
    }

    async fn get(&self, name: &str) -> BackendResult<Option<(ObjectMeta, ObjectStream)>> {
        self.check_online()?;
        let objects = self.objects.read().await;
        let Some(stored) = objects.get(name) else {
            return Ok(None);
        };

        let meta = ObjectMeta {
            size: stored.data.len() as u64,
            last_modified: stored.last_modified,
            content_type: Some(stored.content_type.clone()),
        };
        let data = stored.data.clone();
        let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK).min(data.len()))))
            .collect();
        Ok(Some((meta, Box::pin(stream::iter(chunks)))))
    }

    async fn stat(&self, name: &str) -> BackendResult<Option<ObjectMeta>> {
        self.check_online()?;
        Ok(self.objects.read().await.get(name).map(|stored| ObjectMeta {
            size: stored.data.len() as u64,
            last_modified: stored.last_modified,
            content_type: Some(stored.content_type.clone()),
        }))
    }

    async fn list(&self) -> BackendResult<Vec<ObjectSummary>> {
        self.check_online()?;
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .map(|(name, stored)| ObjectSummary {
                name: name.clone(),
                size: stored.data.len() as u64,
                last_modified: stored.last_modified,
            })
            .collect())
    }

    async fn delete(&self, name: &str) -> BackendResult<bool> {
        self.check_online()?;
        Ok(self.objects.write().await.remove(name).is_some())
    }
}
