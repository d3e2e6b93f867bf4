//! Persistence contracts for artifacts and call records.
//!
//! The engine needs only three primitives from a backend: insert with a
//! uniqueness check, read the latest row by key, and single-row
//! compare-and-update. Any relational or key-value store offering those can
//! back the traits below; the in-memory implementations are used by tests and
//! single-process deployments.

mod ensure;
mod locks;
mod memory;

pub use ensure::{ArtifactStore, Ensured, DEFAULT_ERROR_LIMIT};
pub use locks::{DocumentLockGuard, DocumentLocks};
pub use memory::{InMemoryArtifactRepository, InMemoryCallRepository};

use crate::core::{Artifact, CallRecord, CallStatus};
use crate::errors::StoreError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use uuid::Uuid;

/// Result of an insert-if-absent on the call store.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The record was inserted; the caller holds the lock.
    Inserted,
    /// A record with the same fingerprint exists; it is returned as read.
    Conflict(CallRecord),
}

/// Storage backend for artifact rows.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Inserts a new row.
    async fn insert(&self, artifact: Artifact) -> Result<(), StoreError>;

    /// Compare-and-update: replaces the row with the same id, but only while
    /// the stored row is still `Running`. Returns false when another writer
    /// already finished it; the stored row is then left untouched.
    async fn complete(&self, artifact: Artifact) -> Result<bool, StoreError>;

    /// Gets a row by id.
    async fn get(&self, id: Uuid) -> Result<Option<Artifact>, StoreError>;

    /// Latest authoritative (successful, not invalidated) row for the key.
    async fn latest_success(&self, owner_id: Uuid, kind: &str)
        -> Result<Option<Artifact>, StoreError>;

    /// All rows of a document in creation order.
    async fn list(&self, owner_id: Uuid) -> Result<Vec<Artifact>, StoreError>;

    /// Flags every authoritative row of the given kinds as invalidated.
    /// Returns the ids that were flagged.
    async fn invalidate(&self, owner_id: Uuid, kinds: &[String]) -> Result<Vec<Uuid>, StoreError>;

    /// `Running` rows of a document last updated before `cutoff`.
    async fn running_before(&self, owner_id: Uuid, cutoff: Timestamp) -> Result<Vec<Artifact>, StoreError>;
}

/// Storage backend for call dedup/lock records.
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Inserts the record unless one with the same fingerprint exists.
    async fn insert_if_absent(&self, record: CallRecord) -> Result<InsertOutcome, StoreError>;

    /// Gets a record by fingerprint.
    async fn get(&self, fingerprint: &str) -> Result<Option<CallRecord>, StoreError>;

    /// Writes the record by fingerprint (insert or replace).
    async fn update(&self, record: CallRecord) -> Result<(), StoreError>;

    /// Compare-and-update: moves the record back to `InProgress` with a fresh
    /// `updated_at`, but only if it still has the status and timestamp the
    /// caller observed. Returns true when the caller now holds the lock.
    async fn reclaim(
        &self,
        fingerprint: &str,
        seen_status: CallStatus,
        seen_updated_at: Timestamp,
    ) -> Result<bool, StoreError>;
}
