//! In-memory repositories.

use super::{ArtifactRepository, CallRepository, InsertOutcome};
use crate::core::{Artifact, ArtifactStatus, CallRecord, CallStatus};
use crate::errors::StoreError;
use crate::utils::{now_utc, Timestamp};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory artifact repository. Rows are kept in insertion order, which is
/// also creation order.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactRepository {
    rows: Arc<RwLock<Vec<Artifact>>>,
}

impl InMemoryArtifactRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of rows with the given status.
    #[must_use]
    pub fn count_status(&self, status: ArtifactStatus) -> usize {
        self.rows.read().iter().filter(|a| a.status == status).count()
    }

    /// Snapshot of all rows.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Artifact> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryArtifactRepository {
    async fn insert(&self, artifact: Artifact) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.iter().any(|a| a.id == artifact.id) {
            return Err(StoreError::Conflict(artifact.id.to_string()));
        }
        rows.push(artifact);
        Ok(())
    }

    async fn complete(&self, artifact: Artifact) -> Result<bool, StoreError> {
        let mut rows = self.rows.write();
        let row = rows
            .iter_mut()
            .find(|a| a.id == artifact.id)
            .ok_or_else(|| StoreError::NotFound(artifact.id.to_string()))?;
        if row.status != ArtifactStatus::Running {
            return Ok(false);
        }
        *row = artifact;
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Artifact>, StoreError> {
        Ok(self.rows.read().iter().find(|a| a.id == id).cloned())
    }

    async fn latest_success(
        &self,
        owner_id: Uuid,
        kind: &str,
    ) -> Result<Option<Artifact>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .rev()
            .find(|a| a.owner_id == owner_id && a.kind == kind && a.is_authoritative())
            .cloned())
    }

    async fn list(&self, owner_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn invalidate(&self, owner_id: Uuid, kinds: &[String]) -> Result<Vec<Uuid>, StoreError> {
        let now = now_utc();
        let mut flagged = Vec::new();
        for row in self.rows.write().iter_mut() {
            if row.owner_id == owner_id && kinds.contains(&row.kind) && row.is_authoritative() {
                row.invalidated_at = Some(now);
                flagged.push(row.id);
            }
        }
        Ok(flagged)
    }

    async fn running_before(&self, owner_id: Uuid, cutoff: Timestamp) -> Result<Vec<Artifact>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|a| a.owner_id == owner_id && a.status == ArtifactStatus::Running && a.updated_at < cutoff)
            .cloned()
            .collect())
    }
}

/// In-memory call repository. The map entry API provides the atomic
/// insert-or-detect-conflict the deduplicator relies on.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCallRepository {
    records: Arc<DashMap<String, CallRecord>>,
}

impl InMemoryCallRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CallRepository for InMemoryCallRepository {
    async fn insert_if_absent(&self, record: CallRecord) -> Result<InsertOutcome, StoreError> {
        match self.records.entry(record.fingerprint.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Conflict(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.records.get(fingerprint).map(|r| r.clone()))
    }

    async fn update(&self, record: CallRecord) -> Result<(), StoreError> {
        self.records.insert(record.fingerprint.clone(), record);
        Ok(())
    }

    async fn reclaim(
        &self,
        fingerprint: &str,
        seen_status: CallStatus,
        seen_updated_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let Some(mut record) = self.records.get_mut(fingerprint) else {
            return Ok(false);
        };
        if record.status != seen_status || record.updated_at != seen_updated_at {
            return Ok(false);
        }
        record.status = CallStatus::InProgress;
        record.error = None;
        record.updated_at = now_utc();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_uuid;

    fn success(owner: Uuid, kind: &str) -> Artifact {
        let mut artifact = Artifact::running(owner, kind);
        artifact.status = ArtifactStatus::Success;
        artifact
    }

    #[tokio::test]
    async fn test_latest_success_prefers_newest() {
        let repo = InMemoryArtifactRepository::new();
        let owner = generate_uuid();
        let first = success(owner, "toc:v1");
        let second = success(owner, "toc:v1");
        repo.insert(first).await.unwrap();
        repo.insert(second.clone()).await.unwrap();
        repo.insert(Artifact::running(owner, "toc:v1")).await.unwrap();

        let latest = repo.latest_success(owner, "toc:v1").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[tokio::test]
    async fn test_latest_success_scoped_by_owner_and_kind() {
        let repo = InMemoryArtifactRepository::new();
        let owner = generate_uuid();
        repo.insert(success(generate_uuid(), "toc:v1")).await.unwrap();
        repo.insert(success(owner, "outline:v1")).await.unwrap();

        assert!(repo.latest_success(owner, "toc:v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_flags_only_authoritative_rows() {
        let repo = InMemoryArtifactRepository::new();
        let owner = generate_uuid();
        let draft = success(owner, "document_draft:v1");
        repo.insert(draft.clone()).await.unwrap();
        repo.insert(Artifact::running(owner, "document_draft:v1")).await.unwrap();
        repo.insert(success(owner, "outline:v1")).await.unwrap();

        let flagged = repo
            .invalidate(owner, &["document_draft:v1".to_string()])
            .await
            .unwrap();

        assert_eq!(flagged, vec![draft.id]);
        assert!(repo.latest_success(owner, "document_draft:v1").await.unwrap().is_none());
        assert!(repo.latest_success(owner, "outline:v1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_complete_missing_row_fails() {
        let repo = InMemoryArtifactRepository::new();
        let err = repo
            .complete(Artifact::running(generate_uuid(), "toc:v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_only_finishes_running_rows() {
        let repo = InMemoryArtifactRepository::new();
        let row = Artifact::running(generate_uuid(), "toc:v1");
        repo.insert(row.clone()).await.unwrap();

        let mut failed = row.clone();
        failed.status = ArtifactStatus::Failed;
        assert!(repo.complete(failed).await.unwrap());

        let mut late = row;
        late.status = ArtifactStatus::Success;
        assert!(!repo.complete(late).await.unwrap());
        assert_eq!(repo.count_status(ArtifactStatus::Failed), 1);
        assert_eq!(repo.count_status(ArtifactStatus::Success), 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let repo = InMemoryArtifactRepository::new();
        let row = Artifact::running(generate_uuid(), "toc:v1");
        repo.insert(row.clone()).await.unwrap();
        let err = repo.insert(row).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_if_absent_conflicts() {
        let repo = InMemoryCallRepository::new();
        let outcome = repo
            .insert_if_absent(CallRecord::in_progress("fp", "m"))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let outcome = repo
            .insert_if_absent(CallRecord::in_progress("fp", "m"))
            .await
            .unwrap();
        assert!(matches!(outcome, InsertOutcome::Conflict(r) if r.fingerprint == "fp"));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_reclaim_is_compare_and_update() {
        let repo = InMemoryCallRepository::new();
        let record = CallRecord::in_progress("fp", "m").failed("boom");
        let seen = record.updated_at;
        repo.update(record).await.unwrap();

        assert!(repo.reclaim("fp", CallStatus::Failed, seen).await.unwrap());
        // The second reclaim observed a stale view and must lose.
        assert!(!repo.reclaim("fp", CallStatus::Failed, seen).await.unwrap());

        let current = repo.get("fp").await.unwrap().unwrap();
        assert_eq!(current.status, CallStatus::InProgress);
        assert!(current.error.is_none());
    }

    #[tokio::test]
    async fn test_reclaim_missing_record() {
        let repo = InMemoryCallRepository::new();
        assert!(!repo.reclaim("nope", CallStatus::Failed, now_utc()).await.unwrap());
    }
}
