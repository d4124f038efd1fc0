//! File gateway: upload, download, list, inspect and delete named files kept
//! in one bucket of an S3-compatible object store, over a small JSON/HTTP
//! API.
//!
//! - [`backend`]: object-store primitives ([`backend::ObjectBackend`]) with
//!   S3 and in-memory implementations
//! - [`services::storage_service`]: upload policy and the error vocabulary
//! - [`handlers`], [`routes`], [`errors`]: the axum HTTP surface
//! - [`config`]: `.env` / environment / CLI configuration

pub mod backend;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
