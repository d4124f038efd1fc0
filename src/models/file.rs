//! Represents a stored file as exposed by the API.

use crate::backend::ObjectMeta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type recorded when the uploader does not supply one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single file in the bucket.
///
/// The store is the only owner of this data; a `FileRecord` is a snapshot
/// taken at call time and never cached.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Object key; doubles as the display name. Case-sensitive, unnormalized.
    pub name: String,

    /// Size in bytes as reported by the store.
    pub size: u64,

    /// Time of the last successful write, assigned by the store.
    #[serde(with = "timestamp")]
    pub last_modified: DateTime<Utc>,

    /// MIME type fixed at upload time.
    pub content_type: String,
}

impl FileRecord {
    pub fn from_meta(name: impl Into<String>, meta: ObjectMeta) -> Self {
        Self {
            name: name.into(),
            size: meta.size,
            last_modified: meta.last_modified,
            content_type: meta
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC, the format existing clients display.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
