//! Descriptive record persisted next to every object's content.
//!
//! The on-disk form is a small JSON document. Field names are kept short
//! (`mime`, `modified`, `user`) so existing storage directories stay readable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata for a stored object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Content type served back to clients.
    #[serde(rename = "mime")]
    pub mime_type: String,

    /// Last successful write, milliseconds since the Unix epoch.
    #[serde(rename = "modified")]
    pub modified_at: i64,

    /// Client that performed the last write.
    #[serde(rename = "user")]
    pub owner_id: String,
}

#[derive(Debug, Error)]
#[error("malformed object metadata: {0}")]
pub struct MetaCodecError(#[from] serde_json::Error);

impl ObjectMeta {
    /// Serialize into the persisted textual form.
    pub fn encode(&self) -> Result<Vec<u8>, MetaCodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a persisted record.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetaCodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
