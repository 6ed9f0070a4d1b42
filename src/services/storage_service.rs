//! src/services/storage_service.rs
//!
//! StorageService — bucket/object operations over a plain directory tree.
//! Each bucket is a directory under `base_path`; each object is a file named
//! by its id, with a sibling `_{id}` file holding its serialized metadata.
//! Nothing is cached: every read goes back to disk.

use crate::models::{
    event::StorageEvent,
    meta::{MetaCodecError, ObjectMeta},
    object::{Conditional, ObjectFile, StoredObject},
};
use crate::services::object_locks::ObjectLocks;
use bytes::Bytes;
use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::broadcast,
};
use uuid::Uuid;

/// Prefix marking entries that are not objects (metadata and temp files).
pub const META_PREFIX: &str = "_";

const TMP_PREFIX: &str = "_.tmp-";
const DEFAULT_MIME: &str = "application/octet-stream";
const MAX_OBJECT_ID_LEN: usize = 255;
const EVENT_CAPACITY: usize = 256;

/// Names that collide with top-level service routes.
const RESERVED_BUCKETS: [&str; 2] = ["healthz", "readyz"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object id `{id}` invalid: {reason}")]
    InvalidObjectId { id: String, reason: String },
    #[error("metadata for `{bucket}/{key}` is corrupt: {source}")]
    CorruptMeta {
        bucket: String,
        key: String,
        #[source]
        source: MetaCodecError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the bucket/object namespace:
/// - Lazily create buckets on first write
/// - Write an object (content file, then metadata file)
/// - Read metadata, content, or the content's location, with ETag short-circuit
/// - Delete an object (content file, then metadata file)
/// - List buckets and objects
///
/// Writes and deletes of the same `(bucket, id)` are serialized through a
/// keyed lock so a content/metadata pair always comes from one operation.
/// A failure between the two steps is surfaced without rollback.
#[derive(Clone)]
pub struct StorageService {
    /// Root directory holding one subdirectory per bucket.
    pub base_path: PathBuf,

    locks: ObjectLocks,
    events: broadcast::Sender<StorageEvent>,
}

impl StorageService {
    /// Create a StorageService rooted at `base_path`. The directory is expected
    /// to exist already.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            base_path: base_path.into(),
            locks: ObjectLocks::new(),
            events,
        }
    }

    /// Register for `bucketCreated` / `objectWritten` / `objectDeleted`
    /// notifications. Events published before the call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StorageEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Validate an object id before it is turned into a file name.
    ///
    /// Ids must be a single path component and may not collide with the
    /// metadata naming convention.
    fn ensure_object_id_safe(&self, id: &str) -> StorageResult<()> {
        let reject = |reason: &str| {
            Err(StorageError::InvalidObjectId {
                id: id.to_string(),
                reason: reason.into(),
            })
        };
        if id.is_empty() {
            return reject("must not be empty");
        }
        if id.len() > MAX_OBJECT_ID_LEN {
            return reject("must be at most 255 bytes");
        }
        if id.starts_with(META_PREFIX) {
            return reject("must not start with `_`");
        }
        if id == "." || id == ".." {
            return reject("must not be a relative path component");
        }
        if id
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            return reject("must not contain path separators or control characters");
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// A bucket name becomes a directory name directly under the storage root,
    /// so it must be a single, visible path component.
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let reject = |reason: &str| {
            Err(StorageError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };
        if name.is_empty() {
            return reject("must not be empty");
        }
        if name.starts_with('.') || name.starts_with(META_PREFIX) {
            return reject("must not start with `.` or `_`");
        }
        if name.contains("..") {
            return reject("must not contain `..`");
        }
        if RESERVED_BUCKETS.contains(&name) {
            return reject("reserved for service endpoints");
        }
        if name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            return reject("must not contain path separators or control characters");
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    fn object_path(&self, bucket_name: &str, id: &str) -> PathBuf {
        self.bucket_root(bucket_name).join(id)
    }

    fn meta_path(&self, bucket_name: &str, id: &str) -> PathBuf {
        self.bucket_root(bucket_name)
            .join(format!("{}{}", META_PREFIX, id))
    }

    fn not_found(bucket: &str, id: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: id.to_string(),
        }
    }

    /// Idempotently create the bucket directory.
    ///
    /// Returns `true` if this call created it. Directory creation is atomic,
    /// so among concurrent callers exactly one sees `true` and publishes
    /// `BucketCreated`; the rest succeed quietly.
    pub async fn ensure_bucket(&self, bucket: &str) -> StorageResult<bool> {
        self.ensure_bucket_name_safe(bucket)?;
        match fs::create_dir(self.bucket_root(bucket)).await {
            Ok(()) => {
                self.publish(StorageEvent::BucketCreated {
                    bucket: bucket.to_string(),
                });
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Enumerate bucket directories under the storage root, sorted by name.
    pub async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                buckets.push(name);
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    /// List object ids in a bucket, sorted. Metadata and temp entries are
    /// skipped.
    pub async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<String>> {
        self.ensure_bucket_name_safe(bucket)?;
        let mut entries = match fs::read_dir(self.bucket_root(bucket)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::BucketNotFound(bucket.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with(META_PREFIX) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Generate a fresh object id: hex MD5 over the bucket name, a random
    /// value and the current time.
    pub fn create_object_id(bucket: &str) -> String {
        let nonce: u64 = rand::random();
        let seed = format!("{}/{}:{}", bucket, nonce, Utc::now().timestamp_millis());
        format!("{:x}", md5::compute(seed))
    }

    /// Cache fingerprint for an object at a given modification time.
    pub fn create_etag(object_id: &str, meta: &ObjectMeta) -> String {
        format!(
            "{:x}",
            md5::compute(format!("{}:{}", object_id, meta.modified_at))
        )
    }

    /// Mime type for an object stored without an explicit one.
    fn infer_mime(object_id: &str) -> String {
        mime_guess::from_path(object_id)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_MIME.to_string())
    }

    /// Write `data` to `path` through a temp file in the same directory and
    /// rename it into place. Readers see either the old or the new file.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "object path missing parent directory")
        })?;
        let tmp_path = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));

        let result = match write_synced(&tmp_path, data).await {
            Ok(()) => fs::rename(&tmp_path, path).await,
            Err(err) => Err(err),
        };
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    async fn read_meta(&self, bucket: &str, id: &str) -> StorageResult<ObjectMeta> {
        let raw = match fs::read(self.meta_path(bucket, id)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Self::not_found(bucket, id));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };
        ObjectMeta::decode(&raw).map_err(|source| StorageError::CorruptMeta {
            bucket: bucket.to_string(),
            key: id.to_string(),
            source,
        })
    }

    /// Store `content` under `object_id` (or a generated id) and record its
    /// metadata.
    ///
    /// - Creates the bucket on first use.
    /// - Writes content first, then metadata; each step replaces atomically.
    /// - `modified_at` strictly increases across writes of the same id, so
    ///   every write yields a new ETag.
    ///
    /// If the metadata write fails after the content write succeeded, the
    /// error is returned and the new content stays in place without matching
    /// metadata.
    pub async fn write_object(
        &self,
        bucket: &str,
        object_id: Option<&str>,
        mime_type: Option<&str>,
        content: Bytes,
        owner_id: &str,
    ) -> StorageResult<String> {
        self.ensure_bucket_name_safe(bucket)?;
        let object_id = match object_id {
            Some(id) => {
                self.ensure_object_id_safe(id)?;
                id.to_string()
            }
            None => Self::create_object_id(bucket),
        };

        self.ensure_bucket(bucket).await?;

        let _guard = self.locks.lock(bucket, &object_id).await;
        let previous = self.read_meta(bucket, &object_id).await.ok();
        self.store_locked(bucket, &object_id, previous, mime_type, content, owner_id)
            .await?;

        Ok(object_id)
    }

    /// Like [`write_object`](Self::write_object) with an explicit id, but only
    /// for an object that already has metadata. The existence check and the
    /// write happen under the same object lock, so a concurrent delete either
    /// wins (and this fails with `ObjectNotFound`) or runs afterwards.
    pub async fn replace_object(
        &self,
        bucket: &str,
        object_id: &str,
        mime_type: Option<&str>,
        content: Bytes,
        owner_id: &str,
    ) -> StorageResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_object_id_safe(object_id)?;

        let _guard = self.locks.lock(bucket, object_id).await;
        let previous = self.read_meta(bucket, object_id).await?;
        self.store_locked(bucket, object_id, Some(previous), mime_type, content, owner_id)
            .await
    }

    /// Content then metadata. Caller holds the object lock.
    async fn store_locked(
        &self,
        bucket: &str,
        object_id: &str,
        previous: Option<ObjectMeta>,
        mime_type: Option<&str>,
        content: Bytes,
        owner_id: &str,
    ) -> StorageResult<()> {
        self.write_atomic(&self.object_path(bucket, object_id), &content)
            .await?;

        let mut modified_at = Utc::now().timestamp_millis();
        if let Some(prev) = previous {
            modified_at = modified_at.max(prev.modified_at.saturating_add(1));
        }

        let meta = ObjectMeta {
            mime_type: mime_type
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Self::infer_mime(object_id)),
            modified_at,
            owner_id: owner_id.to_string(),
        };
        let encoded = meta.encode().map_err(|source| StorageError::CorruptMeta {
            bucket: bucket.to_string(),
            key: object_id.to_string(),
            source,
        })?;
        self.write_atomic(&self.meta_path(bucket, object_id), &encoded)
            .await?;

        self.publish(StorageEvent::ObjectWritten {
            bucket: bucket.to_string(),
            object_id: object_id.to_string(),
            owner_id: owner_id.to_string(),
        });
        Ok(())
    }

    /// Fetch only object metadata.
    ///
    /// An object whose metadata entry is missing is reported as not found;
    /// an unparsable entry as `CorruptMeta`.
    pub async fn get_meta(&self, bucket: &str, object_id: &str) -> StorageResult<ObjectMeta> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_object_id_safe(object_id)?;
        self.read_meta(bucket, object_id).await
    }

    /// Resolve where an object's content lives, for streaming by the caller.
    ///
    /// When `if_none_match` equals the current ETag the content entry is not
    /// touched and `NotModified` is returned.
    pub async fn get_object_file(
        &self,
        bucket: &str,
        object_id: &str,
        if_none_match: Option<&str>,
    ) -> StorageResult<Conditional<ObjectFile>> {
        let meta = self.get_meta(bucket, object_id).await?;
        let etag = Self::create_etag(object_id, &meta);
        if if_none_match == Some(etag.as_str()) {
            return Ok(Conditional::NotModified { etag });
        }

        let path = self.object_path(bucket, object_id);
        let size_bytes = match fs::metadata(&path).await {
            Ok(stat) if stat.is_file() => stat.len(),
            Ok(_) => return Err(Self::not_found(bucket, object_id)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Self::not_found(bucket, object_id));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(Conditional::Modified(ObjectFile {
            path,
            meta,
            etag,
            size_bytes,
        }))
    }

    /// Same conditional semantics as [`get_object_file`](Self::get_object_file),
    /// but reads the content into memory.
    pub async fn get_object(
        &self,
        bucket: &str,
        object_id: &str,
        if_none_match: Option<&str>,
    ) -> StorageResult<Conditional<StoredObject>> {
        let meta = self.get_meta(bucket, object_id).await?;
        let etag = Self::create_etag(object_id, &meta);
        if if_none_match == Some(etag.as_str()) {
            return Ok(Conditional::NotModified { etag });
        }

        let content = match fs::read(self.object_path(bucket, object_id)).await {
            Ok(content) => Bytes::from(content),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Self::not_found(bucket, object_id));
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(Conditional::Modified(StoredObject {
            meta,
            content,
            etag,
        }))
    }

    /// Delete an object's content, then its metadata.
    ///
    /// Fails with `ObjectNotFound` if there is no content entry. A missing
    /// metadata entry is tolerated (content left behind by a failed write);
    /// any other failure removing it is returned after the content is
    /// already gone.
    pub async fn delete_object(
        &self,
        bucket: &str,
        object_id: &str,
        owner_id: &str,
    ) -> StorageResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_object_id_safe(object_id)?;

        let _guard = self.locks.lock(bucket, object_id).await;

        match fs::remove_file(self.object_path(bucket, object_id)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Self::not_found(bucket, object_id));
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        match fs::remove_file(self.meta_path(bucket, object_id)).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }

        self.publish(StorageEvent::ObjectDeleted {
            bucket: bucket.to_string(),
            object_id: object_id.to_string(),
            owner_id: owner_id.to_string(),
        });

        Ok(())
    }
}

/// Create `path`, write `data` and fsync it.
async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}
