//! Keyed async locks serializing mutations of a single `(bucket, object)` pair.
//!
//! Each key maps to a `tokio` mutex created on first use. The slot is
//! removed from the table when its last holder releases it, so the table
//! only ever contains keys with an in-flight operation.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type ObjectKey = (String, String);
type LockTable = HashMap<ObjectKey, Arc<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct ObjectLocks {
    table: Arc<Mutex<LockTable>>,
}

/// Held for the duration of a write or delete sequence.
pub struct ObjectLockGuard {
    key: ObjectKey,
    slot: Arc<AsyncMutex<()>>,
    table: Arc<Mutex<LockTable>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ObjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds the lock for `bucket/object_id`.
    pub async fn lock(&self, bucket: &str, object_id: &str) -> ObjectLockGuard {
        let key = (bucket.to_string(), object_id.to_string());
        let slot = {
            let mut table = self.table.lock();
            table.entry(key.clone()).or_default().clone()
        };
        let guard = slot.clone().lock_owned().await;
        ObjectLockGuard {
            key,
            slot,
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently tracked.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().len()
    }
}

impl Drop for ObjectLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.table.lock();
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn released_keys_leave_the_table() {
        let locks = ObjectLocks::new();
        {
            let _a = locks.lock("docs", "a").await;
            let _b = locks.lock("docs", "b").await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn same_key_waits_for_holder() {
        let locks = ObjectLocks::new();
        let held = locks.lock("docs", "a").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.lock("docs", "a").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = ObjectLocks::new();
        let _held = locks.lock("docs", "a").await;
        let other = tokio::time::timeout(Duration::from_secs(1), locks.lock("docs", "b")).await;
        assert!(other.is_ok());
        let other_bucket =
            tokio::time::timeout(Duration::from_secs(1), locks.lock("pics", "a")).await;
        assert!(other_bucket.is_ok());
    }
}
