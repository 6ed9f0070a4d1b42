//! Notifications published by the storage engine.

use serde::Serialize;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StorageEvent {
    /// A bucket directory was materialized.
    BucketCreated { bucket: String },
    /// Content and metadata for an object were both persisted.
    ObjectWritten {
        bucket: String,
        object_id: String,
        owner_id: String,
    },
    /// Content and metadata for an object were removed.
    ObjectDeleted {
        bucket: String,
        object_id: String,
        owner_id: String,
    },
}
