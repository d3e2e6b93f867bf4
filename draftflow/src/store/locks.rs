//! Per-document run locks.
//!
//! Keeps two jobs for the same document from driving the orchestrator at the
//! same time, which is what makes concurrent `ensure` calls for one key
//! impossible. Locks carry a TTL so a crashed holder is eventually reclaimed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    token: Uuid,
    expires_at: Instant,
}

/// Registry of held document locks.
#[derive(Debug, Default, Clone)]
pub struct DocumentLocks {
    held: Arc<DashMap<Uuid, LockEntry>>,
}

/// Releases the lock when dropped.
#[derive(Debug)]
pub struct DocumentLockGuard {
    held: Arc<DashMap<Uuid, LockEntry>>,
    document_id: Uuid,
    token: Uuid,
}

impl DocumentLockGuard {
    /// The locked document.
    #[must_use]
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }
}

impl Drop for DocumentLockGuard {
    fn drop(&mut self) {
        // Only release if the lock was not reclaimed by someone else after expiry.
        self.held
            .remove_if(&self.document_id, |_, entry| entry.token == self.token);
    }
}

impl DocumentLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock if it is free or expired.
    #[must_use]
    pub fn try_acquire(&self, document_id: Uuid, ttl: Duration) -> Option<DocumentLockGuard> {
        let now = Instant::now();
        let token = Uuid::new_v4();
        let fresh = LockEntry {
            token,
            expires_at: now + ttl,
        };
        match self.held.entry(document_id) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return None;
                }
                tracing::warn!(document_id = %document_id, "Reclaiming expired document lock");
                held.insert(fresh);
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
            }
        }
        Some(DocumentLockGuard {
            held: self.held.clone(),
            document_id,
            token,
        })
    }

    /// Polls for the lock until `timeout` elapses.
    pub async fn acquire(
        &self,
        document_id: Uuid,
        ttl: Duration,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Option<DocumentLockGuard> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_acquire(document_id, ttl) {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Returns true if a live lock is held for the document.
    #[must_use]
    pub fn is_locked(&self, document_id: Uuid) -> bool {
        self.held
            .get(&document_id)
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let locks = DocumentLocks::new();
        let doc = Uuid::new_v4();

        let guard = locks.try_acquire(doc, Duration::from_secs(60)).unwrap();
        assert!(locks.is_locked(doc));
        assert!(locks.try_acquire(doc, Duration::from_secs(60)).is_none());

        drop(guard);
        assert!(!locks.is_locked(doc));
        assert!(locks.try_acquire(doc, Duration::from_secs(60)).is_some());
    }

    #[test]
    fn test_expired_lock_is_reclaimed() {
        let locks = DocumentLocks::new();
        let doc = Uuid::new_v4();

        let stale = locks.try_acquire(doc, Duration::ZERO).unwrap();
        let fresh = locks.try_acquire(doc, Duration::from_secs(60)).unwrap();

        // Dropping the stale guard must not release the new holder.
        drop(stale);
        assert!(locks.is_locked(doc));
        drop(fresh);
        assert!(!locks.is_locked(doc));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = DocumentLocks::new();
        let doc = Uuid::new_v4();
        let guard = locks.try_acquire(doc, Duration::from_secs(60)).unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire(doc, Duration::from_secs(60), Duration::from_secs(2), Duration::from_millis(5))
                    .await
                    .is_some()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_acquire_times_out() {
        let locks = DocumentLocks::new();
        let doc = Uuid::new_v4();
        let _guard = locks.try_acquire(doc, Duration::from_secs(60)).unwrap();

        let result = tokio_test::block_on(locks.acquire(
            doc,
            Duration::from_secs(60),
            Duration::from_millis(20),
            Duration::from_millis(5),
        ));
        assert!(result.is_none());
    }
}
