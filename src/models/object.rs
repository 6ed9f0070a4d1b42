//! Results handed back by object reads.

use super::meta::ObjectMeta;
use bytes::Bytes;
use std::path::PathBuf;

/// Outcome of a read carrying an `If-None-Match` validator.
#[derive(Debug)]
pub enum Conditional<T> {
    /// The validator matched the current fingerprint; content was not touched.
    NotModified { etag: String },
    /// The validator was absent or stale.
    Modified(T),
}

impl<T> Conditional<T> {
    pub fn into_modified(self) -> Option<T> {
        match self {
            Conditional::Modified(value) => Some(value),
            Conditional::NotModified { .. } => None,
        }
    }
}

/// An object read fully into memory.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub content: Bytes,
    pub etag: String,
}

/// Location of an object's content on disk, for callers that stream it.
#[derive(Debug, Clone)]
pub struct ObjectFile {
    pub path: PathBuf,
    pub meta: ObjectMeta,
    pub etag: String,
    /// Content length in bytes at the time of the lookup.
    pub size_bytes: u64,
}
