//! Task queue: a fixed pool of tokio workers running document jobs.
//!
//! Jobs are pulled from a bounded channel. Each job takes the per-document
//! lock before it touches the orchestrator, so runs of one document never
//! overlap while different documents proceed in parallel. The queue adds no
//! retries of its own; failed steps are retried by re-enqueueing, which
//! resumes from the cached artifacts.

use crate::config::{PipelineConfig, QueueConfig};
use crate::pipeline::{Document, GenerationProfile, ProgressFn, RunOptions, RunResult, StepOrchestrator};
use crate::store::DocumentLocks;
use crate::utils::generate_uuid;
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Interval between attempts to take a busy document lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// [`StepOrchestrator::run_full`].
    RunFull,
    /// [`StepOrchestrator::run_section`].
    RunSection {
        /// Section key.
        key: String,
    },
    /// [`StepOrchestrator::resume`].
    Resume,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunFull => write!(f, "run_full"),
            Self::RunSection { key } => write!(f, "run_section:{key}"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// A job to enqueue.
#[derive(Clone)]
pub struct JobRequest {
    /// What to run.
    pub kind: JobKind,
    /// The document.
    pub document: Arc<Document>,
    /// Job identifier, generated when not given.
    pub job_id: String,
    /// Profile name; the configured default when absent.
    pub profile: Option<String>,
    /// Rebuild cached steps.
    pub force: bool,
    /// Progress callback.
    pub progress: Option<ProgressFn>,
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("kind", &self.kind)
            .field("document_id", &self.document.id)
            .field("job_id", &self.job_id)
            .field("profile", &self.profile)
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}

impl JobRequest {
    /// Creates a job of `kind` for `document`.
    #[must_use]
    pub fn new(kind: JobKind, document: Arc<Document>) -> Self {
        Self {
            kind,
            document,
            job_id: generate_uuid().to_string(),
            profile: None,
            force: false,
            progress: None,
        }
    }

    /// A full run.
    #[must_use]
    pub fn run_full(document: Arc<Document>) -> Self {
        Self::new(JobKind::RunFull, document)
    }

    /// A single-section run.
    #[must_use]
    pub fn run_section(document: Arc<Document>, key: impl Into<String>) -> Self {
        Self::new(JobKind::RunSection { key: key.into() }, document)
    }

    /// A resume.
    #[must_use]
    pub fn resume(document: Arc<Document>) -> Self {
        Self::new(JobKind::Resume, document)
    }

    /// Sets the job id.
    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Sets the profile.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Sets the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Awaitable outcome of an enqueued job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    receiver: oneshot::Receiver<Result<RunResult>>,
}

impl JobHandle {
    /// The job id.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits for the job. A run that stopped at a failing step is still
    /// `Ok`; errors are reserved for jobs that could not run at all.
    pub async fn wait(self) -> Result<RunResult> {
        self.receiver
            .await
            .map_err(|_| anyhow!("job {} was dropped before completion", self.job_id))?
    }
}

struct Job {
    request: JobRequest,
    reply: oneshot::Sender<Result<RunResult>>,
}

#[derive(Clone)]
struct Worker {
    orchestrator: Arc<StepOrchestrator>,
    locks: DocumentLocks,
    pipeline: PipelineConfig,
}

impl Worker {
    async fn run(self, id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
        tracing::debug!(worker = id, "Worker started");
        loop {
            let job = receiver.lock().await.recv().await;
            let Some(Job { request, reply }) = job else {
                break;
            };
            let job_id = request.job_id.clone();
            let worker = self.clone();
            // A panicking job must not take the worker down with it.
            let outcome = match tokio::spawn(async move { worker.execute(request).await }).await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(anyhow!("job {job_id} panicked: {join_error}")),
            };
            if reply.send(outcome).is_err() {
                tracing::debug!(worker = id, job_id = %job_id, "Job result dropped by caller");
            }
        }
        tracing::debug!(worker = id, "Worker stopped");
    }

    async fn execute(&self, request: JobRequest) -> Result<RunResult> {
        let document = request.document.clone();
        let profile_name = request
            .profile
            .clone()
            .unwrap_or_else(|| self.pipeline.default_profile.clone());
        let profile = GenerationProfile::by_name(&profile_name)?;

        let ttl = Duration::from_secs(self.pipeline.document_lock_ttl_s);
        let _guard = self
            .locks
            .acquire(document.id, ttl, ttl, LOCK_POLL_INTERVAL)
            .await
            .ok_or_else(|| anyhow!("document {} is locked by another job", document.id))?;

        let stale_after = Duration::from_secs(self.pipeline.artifact_stale_after_s);
        if let Err(err) = self.orchestrator.store().reap_stale(document.id, stale_after).await {
            tracing::warn!(job_id = %request.job_id, error = %err, "Failed to reap stale artifacts");
        }

        tracing::info!(
            job_id = %request.job_id,
            document_id = %document.id,
            kind = %request.kind,
            profile = %profile.name,
            "Job started"
        );
        let mut options = RunOptions::new()
            .with_force(request.force)
            .with_job_id(request.job_id.clone());
        if let Some(progress) = request.progress.clone() {
            options = options.with_progress(progress);
        }

        let result = match &request.kind {
            JobKind::RunFull => self.orchestrator.run_full(&document, &profile, options).await,
            JobKind::RunSection { key } => self
                .orchestrator
                .run_section(&document, key, &profile, options)
                .await
                .with_context(|| format!("job {} could not run section '{key}'", request.job_id))?,
            JobKind::Resume => self.orchestrator.resume(&document, &profile, options).await,
        };

        tracing::info!(
            job_id = %request.job_id,
            success = result.success,
            created = result.artifacts_created,
            cached = result.artifacts_cached,
            "Job finished"
        );
        Ok(result)
    }
}

/// Worker pool over a bounded job channel.
pub struct TaskQueue {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    locks: DocumentLocks,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("workers", &self.workers.lock().len())
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

impl TaskQueue {
    /// Spawns the workers. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(orchestrator: Arc<StepOrchestrator>, queue: &QueueConfig, pipeline: &PipelineConfig) -> Self {
        let (sender, receiver) = mpsc::channel(queue.capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let locks = DocumentLocks::new();
        let worker = Worker {
            orchestrator,
            locks: locks.clone(),
            pipeline: pipeline.clone(),
        };

        let workers = (0..queue.workers.max(1))
            .map(|id| tokio::spawn(worker.clone().run(id, receiver.clone())))
            .collect();
        tracing::info!(workers = queue.workers.max(1), capacity = queue.capacity, "Task queue started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            locks,
        }
    }

    /// Per-document locks held by running jobs.
    #[must_use]
    pub fn locks(&self) -> &DocumentLocks {
        &self.locks
    }

    /// Queues a job, waiting for room when the queue is full.
    pub async fn enqueue(&self, request: JobRequest) -> Result<JobHandle> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("task queue is shut down"))?;
        let job_id = request.job_id.clone();
        let (reply, receiver) = oneshot::channel();

        tracing::debug!(job_id = %job_id, kind = %request.kind, "Job enqueued");
        sender
            .send(Job { request, reply })
            .await
            .map_err(|_| anyhow!("task queue is shut down"))?;
        Ok(JobHandle { job_id, receiver })
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for err in join_all(workers).await.into_iter().filter_map(|joined| joined.err()) {
            tracing::warn!(error = %err, "Worker ended abnormally");
        }
        tracing::info!("Task queue stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{document_provider, sample_document, two_section_registry, TestEngine};

    fn queue(engine: &TestEngine) -> TaskQueue {
        let config = QueueConfig {
            workers: 2,
            capacity: 8,
        };
        TaskQueue::start(engine.orchestrator.clone(), &config, &PipelineConfig::default())
    }

    fn engine() -> TestEngine {
        TestEngine::new(document_provider(), two_section_registry())
    }

    #[tokio::test]
    async fn test_enqueue_runs_job() {
        let engine = engine();
        let queue = queue(&engine);
        let document = Arc::new(sample_document());

        let handle = queue
            .enqueue(JobRequest::run_full(document.clone()).with_job_id("job-7").with_profile("fast"))
            .await
            .unwrap();
        assert_eq!(handle.job_id(), "job-7");
        let result = handle.wait().await.unwrap();

        assert!(result.success);
        assert_eq!(result.job_id.as_deref(), Some("job-7"));
        assert_eq!(result.artifacts_created, 10);
        assert!(!queue.locks().is_locked(document.id));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_document_jobs_do_not_overlap() {
        let engine = engine();
        let queue = queue(&engine);
        let document = Arc::new(sample_document());

        let first = queue
            .enqueue(JobRequest::run_full(document.clone()).with_profile("fast"))
            .await
            .unwrap();
        let second = queue
            .enqueue(JobRequest::run_full(document.clone()).with_profile("fast"))
            .await
            .unwrap();
        let (a, b) = (first.wait().await.unwrap(), second.wait().await.unwrap());

        assert!(a.success && b.success);
        assert_eq!(a.artifacts_created + b.artifacts_created, 10);
        assert_eq!(engine.artifacts.len(), 10);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_job_errors_are_reported() {
        let engine = engine();
        let queue = queue(&engine);
        let document = Arc::new(sample_document());

        let unknown_profile = queue
            .enqueue(JobRequest::run_full(document.clone()).with_profile("turbo"))
            .await
            .unwrap();
        let err = unknown_profile.wait().await.unwrap_err();
        assert!(err.to_string().contains("Unknown profile"));

        let unknown_section = queue
            .enqueue(JobRequest::run_section(document, "appendix").with_profile("fast"))
            .await
            .unwrap();
        let err = unknown_section.wait().await.unwrap_err();
        assert!(format!("{err:#}").contains("Unknown section: appendix"));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_progress_reaches_caller() {
        let engine = engine();
        let queue = queue(&engine);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = queue
            .enqueue(
                JobRequest::run_full(Arc::new(sample_document()))
                    .with_profile("fast")
                    .with_progress(Arc::new(move |percent: u8, _step: &str| sink.lock().push(percent))),
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();

        assert_eq!(seen.lock().last().copied(), Some(100));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let engine = engine();
        let queue = queue(&engine);
        queue.shutdown().await;

        let err = queue
            .enqueue(JobRequest::resume(Arc::new(sample_document())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("shut down"));
    }

    #[test]
    fn test_job_kind_serde() {
        let kind = JobKind::RunSection { key: "intro".into() };
        assert_eq!(
            serde_json::to_value(&kind).unwrap(),
            serde_json::json!({"type": "run_section", "key": "intro"})
        );
        assert_eq!(kind.to_string(), "run_section:intro");
    }
}
