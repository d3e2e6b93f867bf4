//! The generic "ensure" cache over artifact rows.

use super::ArtifactRepository;
use crate::core::{Artifact, ArtifactKind, ArtifactStatus, BuildOutput};
use crate::errors::DraftflowError;
use crate::observability::SpanTimer;
use crate::utils::timestamps::format_iso8601;
use crate::utils::{generate_uuid_v7, now_utc, truncate_chars};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Maximum length of the error text stored on failed rows.
pub const DEFAULT_ERROR_LIMIT: usize = 1000;

/// Result of an `ensure` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensured {
    /// The authoritative artifact.
    pub artifact: Artifact,
    /// True when served from cache without running the builder.
    pub cached: bool,
}

/// Caches step results per `(owner, kind)` on top of an [`ArtifactRepository`].
#[derive(Clone)]
pub struct ArtifactStore {
    repo: Arc<dyn ArtifactRepository>,
    error_limit: usize,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("error_limit", &self.error_limit)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Creates a store over the given repository.
    #[must_use]
    pub fn new(repo: Arc<dyn ArtifactRepository>) -> Self {
        Self {
            repo,
            error_limit: DEFAULT_ERROR_LIMIT,
        }
    }

    /// Sets the maximum stored error length.
    #[must_use]
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    /// Returns the cached artifact for `(owner_id, kind)` or runs `builder`
    /// exactly once and records the outcome.
    ///
    /// With `force = false` a successful, non-invalidated row is returned
    /// unchanged and nothing is written. Otherwise a new `Running` row is
    /// inserted; on success payload, hash and meta are written in a single
    /// update, on failure the row is marked `Failed` with truncated error text
    /// and the builder's error is returned.
    pub async fn ensure<F, Fut>(
        &self,
        owner_id: Uuid,
        kind: &ArtifactKind,
        builder: F,
        force: bool,
    ) -> Result<Ensured, DraftflowError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<BuildOutput, DraftflowError>> + Send,
    {
        let key = kind.as_key();

        if !force {
            if let Some(artifact) = self.repo.latest_success(owner_id, &key).await? {
                tracing::debug!(document_id = %owner_id, kind = %key, "Artifact cache hit");
                return Ok(Ensured {
                    artifact,
                    cached: true,
                });
            }
        }

        let mut artifact = Artifact::running(owner_id, key.clone());
        self.repo.insert(artifact.clone()).await?;
        tracing::debug!(document_id = %owner_id, kind = %key, artifact_id = %artifact.id, force, "Building artifact");

        let timer = SpanTimer::start(key.clone());
        match builder().await {
            Ok(output) => {
                let finished = now_utc();
                artifact.hash = Some(output.payload.hash());
                artifact.payload = output.payload;
                artifact.meta.extend(output.meta);
                artifact
                    .meta
                    .insert("status".to_string(), Value::String("success".to_string()));
                artifact.meta.insert(
                    "finished_at".to_string(),
                    Value::String(format_iso8601(&finished)),
                );
                artifact
                    .meta
                    .insert("duration_ms".to_string(), serde_json::json!(timer.elapsed_millis()));
                artifact.status = ArtifactStatus::Success;
                artifact.updated_at = finished;
                if !self.repo.complete(artifact.clone()).await? {
                    // The running row was finished elsewhere (reaped as stale);
                    // it keeps its outcome and the result gets a row of its own.
                    tracing::warn!(
                        document_id = %owner_id,
                        kind = %key,
                        artifact_id = %artifact.id,
                        "Running row already finished; recording result as a new row"
                    );
                    artifact.id = generate_uuid_v7();
                    artifact.created_at = finished;
                    self.repo.insert(artifact.clone()).await?;
                }

                tracing::info!(
                    document_id = %owner_id,
                    kind = %key,
                    duration_ms = timer.elapsed_millis(),
                    "Artifact built"
                );
                Ok(Ensured {
                    artifact,
                    cached: false,
                })
            }
            Err(err) => {
                let finished = now_utc();
                artifact.status = ArtifactStatus::Failed;
                artifact.error = Some(truncate_chars(&err.to_string(), self.error_limit));
                artifact
                    .meta
                    .insert("status".to_string(), Value::String("failed".to_string()));
                artifact.meta.insert(
                    "finished_at".to_string(),
                    Value::String(format_iso8601(&finished)),
                );
                artifact.updated_at = finished;
                match self.repo.complete(artifact).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(document_id = %owner_id, kind = %key, "Running row already finished");
                    }
                    Err(store_err) => {
                        tracing::warn!(
                            document_id = %owner_id,
                            kind = %key,
                            error = %store_err,
                            "Failed to record artifact failure"
                        );
                    }
                }
                tracing::warn!(document_id = %owner_id, kind = %key, error = %err, "Artifact build failed");
                Err(err)
            }
        }
    }

    /// Latest authoritative artifact for the key.
    pub async fn latest(
        &self,
        owner_id: Uuid,
        kind: &ArtifactKind,
    ) -> Result<Option<Artifact>, DraftflowError> {
        Ok(self.repo.latest_success(owner_id, &kind.as_key()).await?)
    }

    /// Returns true if an authoritative artifact exists for the key.
    pub async fn has_success(
        &self,
        owner_id: Uuid,
        kind: &ArtifactKind,
    ) -> Result<bool, DraftflowError> {
        Ok(self.latest(owner_id, kind).await?.is_some())
    }

    /// All rows of a document.
    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<Artifact>, DraftflowError> {
        Ok(self.repo.list(owner_id).await?)
    }

    /// Flags the authoritative rows of `kinds` so they are rebuilt on next read.
    pub async fn invalidate(
        &self,
        owner_id: Uuid,
        kinds: &[ArtifactKind],
    ) -> Result<Vec<Uuid>, DraftflowError> {
        let keys: Vec<String> = kinds.iter().map(ArtifactKind::as_key).collect();
        let flagged = self.repo.invalidate(owner_id, &keys).await?;
        if !flagged.is_empty() {
            tracing::info!(document_id = %owner_id, count = flagged.len(), "Invalidated artifacts");
        }
        Ok(flagged)
    }

    /// Invalidates draft, table of contents and quality report.
    pub async fn invalidate_assembly(&self, owner_id: Uuid) -> Result<Vec<Uuid>, DraftflowError> {
        self.invalidate(owner_id, &ArtifactKind::ASSEMBLY).await
    }

    /// Marks the document's `Running` rows untouched for longer than
    /// `older_than` as failed. Returns how many rows were reaped.
    ///
    /// Such rows are left behind by crashed workers. They never block a
    /// rebuild, but reaping keeps the history honest.
    pub async fn reap_stale(&self, owner_id: Uuid, older_than: Duration) -> Result<usize, DraftflowError> {
        let now = now_utc();
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| DraftflowError::Internal(e.to_string()))?;
        let cutoff = now - age;
        let mut count = 0;
        for mut artifact in self.repo.running_before(owner_id, cutoff).await? {
            artifact.status = ArtifactStatus::Failed;
            artifact.error = Some("stale: builder did not finish".to_string());
            artifact
                .meta
                .insert("status".to_string(), Value::String("failed".to_string()));
            artifact.updated_at = now;
            if self.repo.complete(artifact).await? {
                count += 1;
            }
        }
        if count > 0 {
            tracing::warn!(document_id = %owner_id, count, "Reaped stale running artifacts");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryArtifactRepository;
    use crate::utils::generate_uuid;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> (ArtifactStore, InMemoryArtifactRepository) {
        let repo = InMemoryArtifactRepository::new();
        (ArtifactStore::new(Arc::new(repo.clone())), repo)
    }

    #[tokio::test]
    async fn test_ensure_runs_builder_once() {
        let (store, repo) = store();
        let owner = generate_uuid();
        let calls = Arc::new(AtomicUsize::new(0));

        let build = || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(BuildOutput::data(serde_json::json!({"title": "Doc"})))
            }
        };

        let first = store.ensure(owner, &ArtifactKind::Outline, build, false).await.unwrap();
        let second = store.ensure(owner, &ArtifactKind::Outline, build, false).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.artifact.id, second.artifact.id);
        assert_eq!(first.artifact.hash, second.artifact.hash);
        assert_eq!(first.artifact.payload, second.artifact.payload);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_success_meta() {
        let (store, _) = store();
        let ensured = store
            .ensure(
                generate_uuid(),
                &ArtifactKind::Toc,
                || async { Ok(BuildOutput::text("toc").with_meta("items", serde_json::json!(3))) },
                false,
            )
            .await
            .unwrap();

        let meta = &ensured.artifact.meta;
        assert_eq!(meta.get("status"), Some(&serde_json::json!("success")));
        assert_eq!(meta.get("items"), Some(&serde_json::json!(3)));
        assert!(meta.contains_key("started_at"));
        assert!(meta.contains_key("finished_at"));
        assert_eq!(ensured.artifact.status, ArtifactStatus::Success);
    }

    #[tokio::test]
    async fn test_force_creates_new_row() {
        let (store, repo) = store();
        let owner = generate_uuid();
        let kind = ArtifactKind::Section("intro".into());

        let first = store
            .ensure(owner, &kind, || async { Ok(BuildOutput::text("v1")) }, false)
            .await
            .unwrap();
        let forced = store
            .ensure(owner, &kind, || async { Ok(BuildOutput::text("v2")) }, true)
            .await
            .unwrap();

        assert_ne!(first.artifact.id, forced.artifact.id);
        assert_eq!(repo.len(), 2);
        let latest = store.latest(owner, &kind).await.unwrap().unwrap();
        assert_eq!(latest.text(), Some("v2"));
    }

    #[tokio::test]
    async fn test_failure_marks_failed_and_reraises() {
        let (store, repo) = store();
        let owner = generate_uuid();
        let long_error = "x".repeat(5000);

        let err = store
            .ensure(
                owner,
                &ArtifactKind::Outline,
                || async move { Err(DraftflowError::validation(long_error)) },
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DraftflowError::Validation(_)));
        let rows = repo.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ArtifactStatus::Failed);
        assert_eq!(
            rows[0].error.as_ref().map(|e| e.chars().count()),
            Some(DEFAULT_ERROR_LIMIT)
        );
        assert!(store.latest(owner, &ArtifactKind::Outline).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_assembly_forces_rebuild() {
        let (store, _) = store();
        let owner = generate_uuid();
        store
            .ensure(owner, &ArtifactKind::DocumentDraft, || async { Ok(BuildOutput::text("d")) }, false)
            .await
            .unwrap();

        let flagged = store.invalidate_assembly(owner).await.unwrap();
        assert_eq!(flagged.len(), 1);

        let rebuilt = store
            .ensure(owner, &ArtifactKind::DocumentDraft, || async { Ok(BuildOutput::text("d2")) }, false)
            .await
            .unwrap();
        assert!(!rebuilt.cached);
        assert_eq!(rebuilt.artifact.text(), Some("d2"));
    }

    #[tokio::test]
    async fn test_reap_stale_running() {
        let (store, repo) = store();
        let owner = generate_uuid();
        let mut stale = Artifact::running(owner, "toc:v1");
        stale.updated_at = now_utc() - chrono::Duration::hours(2);
        repo.insert(stale).await.unwrap();
        repo.insert(Artifact::running(owner, "toc:v1")).await.unwrap();
        let mut other_document = Artifact::running(generate_uuid(), "toc:v1");
        other_document.updated_at = now_utc() - chrono::Duration::hours(2);
        repo.insert(other_document).await.unwrap();

        let reaped = store.reap_stale(owner, Duration::from_secs(3600)).await.unwrap();

        assert_eq!(reaped, 1);
        assert_eq!(repo.count_status(ArtifactStatus::Failed), 1);
        assert_eq!(repo.count_status(ArtifactStatus::Running), 2);
    }

    #[tokio::test]
    async fn test_reaped_row_is_not_resurrected() {
        let (store, repo) = store();
        let owner = generate_uuid();

        let reaper = store.clone();
        let ensured = store
            .ensure(
                owner,
                &ArtifactKind::Outline,
                || async move {
                    let reaped = reaper.reap_stale(owner, Duration::ZERO).await?;
                    assert_eq!(reaped, 1);
                    Ok(BuildOutput::text("outline"))
                },
                false,
            )
            .await
            .unwrap();

        let rows = repo.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, ArtifactStatus::Failed);
        assert!(rows[0].error.as_deref().is_some_and(|e| e.starts_with("stale")));
        assert_eq!(rows[1].status, ArtifactStatus::Success);
        assert_eq!(rows[1].id, ensured.artifact.id);
        assert_ne!(rows[0].id, rows[1].id);
        assert_eq!(
            store.latest(owner, &ArtifactKind::Outline).await.unwrap().unwrap().id,
            ensured.artifact.id
        );
    }
}
