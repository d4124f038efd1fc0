//! S3 backend.
//!
//! Talks to any S3-compatible store (MinIO, AWS S3, ...) through
//! `aws-sdk-s3`, against the single bucket named in [`S3Settings`].
//! Path-style addressing is forced so bare `host:port` MinIO endpoints work.
//!
//! Uploads are spooled to a temporary file while the request body streams
//! in, then sent with an exact `Content-Length` and `Content-MD5`. If the
//! incoming body fails half way nothing is sent to the store, so a dropped
//! client never leaves a truncated object behind.

use super::{
    BackendError, BackendResult, BodyStream, ObjectBackend, ObjectMeta, ObjectStream,
    ObjectSummary,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{Credentials, RequestChecksumCalculation},
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, DateTime as S3DateTime},
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for the remote store.
#[derive(Clone)]
pub struct S3Settings {
    /// `host:port`, or a full URL with scheme.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub use_ssl: bool,
}

impl S3Settings {
    /// Endpoint as a URL. A scheme already present in `endpoint` wins over
    /// `use_ssl`.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.use_ssl { "https" } else { "http" };
            format!("{scheme}://{}", self.endpoint)
        }
    }
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

pub struct S3Backend {
    client: Client,
    bucket: String,
    region: String,
    spool_dir: PathBuf,
}

impl S3Backend {
    /// Build the S3 client. No network traffic happens here; call
    /// [`ObjectBackend::ensure_bucket`] to find out whether the store is
    /// actually reachable.
    pub async fn connect(settings: &S3Settings) -> Self {
        let creds = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "file-gateway-config",
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()))
            .endpoint_url(settings.endpoint_url())
            .credentials_provider(creds)
            .load()
            .await;

        // Content-MD5 already covers integrity; skip the SDK's default
        // trailing checksums, which older MinIO releases reject.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        info!(
            "S3 backend initialized: endpoint={} bucket={}",
            settings.endpoint_url(),
            settings.bucket
        );

        Self {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            spool_dir: std::env::temp_dir(),
        }
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn ensure_bucket(&self) -> BackendResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("bucket {} already exists", self.bucket);
                return Ok(());
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {}
            Err(err) => return Err(map_sdk_error("head_bucket", err)),
        }

        let mut req = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match req.send().await {
            Ok(_) => {
                info!("Created bucket: {}", self.bucket);
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(err) => Err(map_sdk_error("create_bucket", err)),
        }
    }

    async fn check_bucket(&self) -> BackendResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("head_bucket", e))?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> BackendResult<bool> {
        Ok(self.stat(name).await?.is_some())
    }

    async fn put(
        &self,
        name: &str,
        body: BodyStream<'_>,
        declared_size: Option<u64>,
        content_type: &str,
    ) -> BackendResult<ObjectMeta> {
        let spool = spool_body(&self.spool_dir, body).await?;
        if let Some(declared) = declared_size.filter(|d| *d != spool.size) {
            debug!(
                "declared size {} for {} differs from transferred {}",
                declared, name, spool.size
            );
        }

        let payload = ByteStream::from_path(spool.path())
            .await
            .map_err(|e| BackendError::Other(format!("open spooled upload: {e}")))?;

        debug!(
            "S3 put_object: bucket={} key={} size={}",
            self.bucket, name, spool.size
        );
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .content_type(content_type)
            .content_length(spool.size as i64)
            .content_md5(general_purpose::STANDARD.encode(spool.md5))
            .body(payload)
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object", e))?;

        // The store assigns the timestamp; ask for it, but the write already
        // succeeded so a failed HEAD only costs precision.
        let last_modified = match self.stat(name).await {
            Ok(Some(meta)) => meta.last_modified,
            Ok(None) => Utc::now(),
            Err(err) => {
                warn!("stat after put of {} failed: {}", name, err);
                Utc::now()
            }
        };

        Ok(ObjectMeta {
            size: spool.size,
            last_modified,
            content_type: Some(content_type.to_string()),
        })
    }

    async fn get(&self, name: &str) -> BackendResult<Option<(ObjectMeta, ObjectStream)>> {
        debug!("S3 get_object: bucket={} key={}", self.bucket, name);
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(resp) => {
                let meta = ObjectMeta {
                    size: resp.content_length().unwrap_or(0).max(0) as u64,
                    last_modified: resp
                        .last_modified()
                        .and_then(to_chrono)
                        .unwrap_or_default(),
                    content_type: resp
                        .content_type()
                        .filter(|ct| !ct.is_empty())
                        .map(str::to_string),
                };
                let reader = resp.body.into_async_read();
                Ok(Some((meta, Box::pin(ReaderStream::new(reader)))))
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => Ok(None),
            Err(err) => Err(map_sdk_error("get_object", err)),
        }
    }

    async fn stat(&self, name: &str) -> BackendResult<Option<ObjectMeta>> {
        debug!("S3 head_object: bucket={} key={}", self.bucket, name);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(resp) => Ok(Some(ObjectMeta {
                size: resp.content_length().unwrap_or(0).max(0) as u64,
                last_modified: resp
                    .last_modified()
                    .and_then(to_chrono)
                    .unwrap_or_default(),
                content_type: resp
                    .content_type()
                    .filter(|ct| !ct.is_empty())
                    .map(str::to_string),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(map_sdk_error("head_object", err)),
        }
    }

    async fn list(&self) -> BackendResult<Vec<ObjectSummary>> {
        let mut summaries = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| map_sdk_error("list_objects_v2", e))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                summaries.push(ObjectSummary {
                    name: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_chrono).unwrap_or_default(),
                });
            }

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }
        debug!("S3 list_objects_v2: bucket={} objects={}", self.bucket, summaries.len());
        Ok(summaries)
    }

    async fn delete(&self, name: &str) -> BackendResult<bool> {
        // DeleteObject succeeds for missing keys, so existence is asked first.
        if !self.exists(name).await? {
            return Ok(false);
        }

        debug!("S3 delete_object: bucket={} key={}", self.bucket, name);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| map_sdk_error("delete_object", e))?;
        Ok(true)
    }
}

/// Split SDK failures into "could not reach the store" and everything else.
fn map_sdk_error<E, R>(op: &str, err: SdkError<E, R>) -> BackendError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let detail = format!("{op}: {}", DisplayErrorContext(&err));
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            BackendError::Unavailable(detail)
        }
        _ => BackendError::Other(detail),
    }
}

fn to_chrono(ts: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

/// A fully received upload body on local disk. The file is removed on drop,
/// including when the owning request is cancelled.
struct SpooledBody {
    path: PathBuf,
    size: u64,
    md5: [u8; 16],
}

impl SpooledBody {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledBody {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!("failed to remove spool file {}: {}", self.path.display(), err);
            }
        }
    }
}

/// Drain `body` into a temp file under `dir`, counting bytes and computing
/// the MD5 digest on the way.
async fn spool_body(dir: &Path, mut body: BodyStream<'_>) -> BackendResult<SpooledBody> {
    let path = dir.join(format!(".file-gateway-upload-{}", Uuid::new_v4()));
    let mut file = File::create(&path)
        .await
        .map_err(|e| BackendError::Other(format!("create spool file: {e}")))?;

    let mut spooled = SpooledBody {
        path,
        size: 0,
        md5: [0; 16],
    };
    let mut digest = md5::Context::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(BackendError::Body)?;
        spooled.size += chunk.len() as u64;
        digest.consume(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|e| BackendError::Other(format!("write spool file: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| BackendError::Other(format!("flush spool file: {e}")))?;

    spooled.md5 = digest.compute().0;
    Ok(spooled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use std::io;

    fn settings(endpoint: &str, use_ssl: bool) -> S3Settings {
        S3Settings {
            endpoint: endpoint.into(),
            access_key: "minioadmin".into(),
            secret_key: "minioadmin123".into(),
            bucket: "files".into(),
            region: DEFAULT_REGION.into(),
            use_ssl,
        }
    }

    #[test]
    fn endpoint_url_adds_scheme_from_tls_flag() {
        assert_eq!(settings("localhost:9000", false).endpoint_url(), "http://localhost:9000");
        assert_eq!(settings("minio.internal", true).endpoint_url(), "https://minio.internal");
    }

    #[test]
    fn endpoint_url_keeps_explicit_scheme() {
        assert_eq!(
            settings("https://s3.example.com", false).endpoint_url(),
            "https://s3.example.com"
        );
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", settings("localhost:9000", false));
        assert!(!rendered.contains("minioadmin123"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn s3_timestamps_convert_to_chrono() {
        let ts = S3DateTime::from_secs(1_700_000_000);
        let converted = to_chrono(&ts).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn spool_counts_bytes_and_hashes() {
        let dir = std::env::temp_dir();
        let body: BodyStream<'static> = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]));

        let spooled = spool_body(&dir, body).await.unwrap();
        assert_eq!(spooled.size, 11);
        assert_eq!(
            spooled.md5,
            md5::compute(b"hello world").0,
        );
        assert_eq!(std::fs::read(spooled.path()).unwrap(), b"hello world");

        let path = spooled.path().to_path_buf();
        drop(spooled);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn spool_failure_surfaces_body_error() {
        let dir = std::env::temp_dir();
        let body: BodyStream<'static> = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ]));

        match spool_body(&dir, body).await {
            Err(BackendError::Body(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other.map(|s| s.size)),
        }
    }
}
