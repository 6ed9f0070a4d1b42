//! bucket-store: a single-node object store over a plain directory tree.
//!
//! Clients authenticate with hour-windowed tokens derived from a shared
//! secret, then read and write opaque objects grouped into buckets. The
//! storage engine lives in [`services::storage_service`], token checks in
//! [`services::auth_service`]; `handlers` and `routes` adapt both to HTTP.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use services::{auth_service::Authorizer, storage_service::StorageService};

/// Shared state handed to every handler via `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub authorizer: Authorizer,
}
