use crate::{backend::S3Settings, services::storage_service::UploadPolicy};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Where file bytes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Remote S3-compatible object store.
    S3,
    /// In-process map; contents vanish on exit.
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s3" | "minio" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown storage backend `{}` (expected `s3` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines `.env`, environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub s3: S3Settings,
    pub max_file_size: u64,
    pub allowed_extensions: Option<Vec<String>>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File server backed by an S3-compatible object store")]
pub struct Args {
    /// Host to bind to (overrides SERVER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SERVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Object store endpoint, `host:port` or URL (overrides MINIO_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Access key (overrides MINIO_ACCESS_KEY)
    #[arg(long)]
    pub access_key: Option<String>,

    /// Secret key (overrides MINIO_SECRET_KEY)
    #[arg(long)]
    pub secret_key: Option<String>,

    /// Bucket holding all files (overrides MINIO_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Region used for signing and bucket creation (overrides MINIO_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Talk to the object store over TLS (overrides MINIO_USE_SSL)
    #[arg(long)]
    pub use_ssl: Option<bool>,

    /// Maximum upload size in bytes (overrides MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Comma-separated list of accepted extensions (overrides ALLOWED_EXTENSIONS)
    #[arg(long)]
    pub allowed_extensions: Option<String>,
}

impl AppConfig {
    /// Load `.env` (if present), then parse environment variables + CLI args.
    pub fn from_env_and_args() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge CLI args over values found through `lookup`, over defaults.
    /// Keys are looked up in upper case first, then in lower case, so
    /// `.env` files written as `minio_endpoint=...` still apply.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| lookup(key).or_else(|| lookup(&key.to_ascii_lowercase()));
        let env_str = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let host = args.host.unwrap_or_else(|| env_str("SERVER_HOST", "0.0.0.0"));
        let port = match args.port {
            Some(port) => port,
            None => parse_env(&lookup, "SERVER_PORT")?.unwrap_or(8080),
        };
        let backend = match args.backend {
            Some(kind) => kind,
            None => parse_env(&lookup, "STORAGE_BACKEND")?.unwrap_or(BackendKind::S3),
        };
        let use_ssl = match args.use_ssl {
            Some(flag) => flag,
            None => match lookup("MINIO_USE_SSL") {
                Some(raw) => parse_bool(&raw)
                    .with_context(|| format!("parsing MINIO_USE_SSL value `{}`", raw))?,
                None => false,
            },
        };
        let max_file_size = match args.max_file_size {
            Some(size) => size,
            None => parse_env(&lookup, "MAX_FILE_SIZE")?.unwrap_or(DEFAULT_MAX_FILE_SIZE),
        };
        let allowed_extensions = args
            .allowed_extensions
            .or_else(|| lookup("ALLOWED_EXTENSIONS"))
            .map(|raw| split_extensions(&raw))
            .filter(|list| !list.is_empty());

        let s3 = S3Settings {
            endpoint: args
                .endpoint
                .unwrap_or_else(|| env_str("MINIO_ENDPOINT", "localhost:9000")),
            access_key: args
                .access_key
                .unwrap_or_else(|| env_str("MINIO_ACCESS_KEY", "minioadmin")),
            secret_key: args
                .secret_key
                .unwrap_or_else(|| env_str("MINIO_SECRET_KEY", "minioadmin123")),
            bucket: args.bucket.unwrap_or_else(|| env_str("MINIO_BUCKET", "files")),
            region: args.region.unwrap_or_else(|| env_str("MINIO_REGION", "us-east-1")),
            use_ssl,
        };

        if s3.bucket.trim().is_empty() {
            bail!("bucket name must not be empty");
        }

        Ok(Self {
            host,
            port,
            backend,
            s3,
            max_file_size,
            allowed_extensions,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        let policy = UploadPolicy::new(self.max_file_size);
        match &self.allowed_extensions {
            Some(extensions) => policy.with_allowed_extensions(extensions),
            None => policy,
        }
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", key, value, err)),
        None => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got `{}`", other),
    }
}

fn split_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
