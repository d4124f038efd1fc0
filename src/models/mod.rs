//! Data models shared by the storage service and the HTTP layer.
//!
//! Records serialize naturally as JSON via `serde`; the object store owns
//! the underlying state.

pub mod file;
