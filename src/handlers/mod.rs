//! axum handlers translating HTTP requests into storage and auth calls.

pub mod auth;
pub mod health_handlers;
pub mod object_handlers;
