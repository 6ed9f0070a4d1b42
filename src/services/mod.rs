//! Storage engine, authorizer and their supporting pieces.

pub mod auth_service;
pub mod object_locks;
pub mod storage_service;
