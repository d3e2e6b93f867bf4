//! Document runs over the artifact store.
//!
//! A run walks the fixed step order
//! `outline → (context pack → section → summary)* → enrichment → editing →
//! literature → assemble → toc → quality` and ensures one artifact per step.
//! Steps that already have an authoritative artifact are served from cache,
//! so re-running a finished document costs nothing and re-running a failed
//! one resumes at the failing step.
//!
//! Freshness cascades forward inside a section: a rebuilt context pack with a
//! different hash forces the section text, and a rebuilt text forces its
//! summary. Any fresh generation artifact invalidates the assembly artifacts
//! (draft, toc, quality) so they are never served from superseded content.

use super::steps::{assemble, literature, outline, quality, refine, section, toc, StepContext};
use super::{Document, GenerationProfile, SectionRegistry, SectionSpec, StageFlag, StepSpec};
use crate::budget::ContextBudgeter;
use crate::config::EngineConfig;
use crate::core::{ArtifactKind, BuildOutput};
use crate::errors::{DraftflowError, StepFailure};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::llm::{CallDeduplicator, DedupSettings, GenerationProvider};
use crate::observability::{SpanTimer, StepSpanAttributes};
use crate::store::{ArtifactRepository, ArtifactStore, CallRepository, Ensured};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Progress callback: `(percent, step)`. Percentages never decrease within
/// a run.
pub type ProgressFn = Arc<dyn Fn(u8, &str) + Send + Sync>;

const OUTLINE_PROGRESS: u8 = 10;
const SECTIONS_DONE_PROGRESS: u8 = 70;
const ENRICHMENT_PROGRESS: u8 = 75;
const EDITING_PROGRESS: u8 = 80;
const LITERATURE_PROGRESS: u8 = 85;
const ASSEMBLE_PROGRESS: u8 = 90;
const TOC_PROGRESS: u8 = 95;
const QUALITY_PROGRESS: u8 = 100;

/// What a run was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every step.
    Full,
    /// One section, then reassembly.
    Section,
    /// Every missing step, then reassembly.
    Resume,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Section => write!(f, "section"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Per-run options.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Rebuild steps even when cached.
    pub force: bool,
    /// Caller's job identifier, echoed in the result.
    pub job_id: Option<String>,
    /// Progress callback.
    pub progress: Option<ProgressFn>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("force", &self.force)
            .field("job_id", &self.job_id)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl RunOptions {
    /// Default options: cached, no job id, no callback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets the job id.
    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Sets the progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// One ensured step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name, e.g. `section:intro`.
    pub step: String,
    /// Artifact kind key.
    pub kind: String,
    /// The authoritative artifact after the step.
    pub artifact_id: Uuid,
    /// True when served from cache.
    pub cached: bool,
    /// Wall time of the step.
    pub duration_ms: u64,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// True when every step succeeded.
    pub success: bool,
    /// Document id.
    pub document_id: Uuid,
    /// Caller's job id.
    pub job_id: Option<String>,
    /// Profile name.
    pub profile: String,
    /// Run mode.
    pub mode: RunMode,
    /// Artifacts built by this run.
    pub artifacts_created: usize,
    /// Artifacts reused from cache.
    pub artifacts_cached: usize,
    /// Assembly artifacts invalidated by this run.
    pub invalidated: usize,
    /// The failing step, if any. A run stops at its first failure.
    pub errors: Vec<StepFailure>,
    /// Ensured steps in order.
    pub steps: Vec<StepRecord>,
    /// Wall time of the run.
    pub duration_ms: u64,
    /// Last reported progress.
    pub progress: u8,
}

impl RunResult {
    fn new(document_id: Uuid, profile: &str, mode: RunMode, job_id: Option<String>) -> Self {
        Self {
            success: false,
            document_id,
            job_id,
            profile: profile.to_string(),
            mode,
            artifacts_created: 0,
            artifacts_cached: 0,
            invalidated: 0,
            errors: Vec::new(),
            steps: Vec::new(),
            duration_ms: 0,
            progress: 0,
        }
    }

    /// The first failure, if the run failed.
    #[must_use]
    pub fn first_error(&self) -> Option<&StepFailure> {
        self.errors.first()
    }

    /// Record of a step, if the run reached it.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == name)
    }

    /// Names of the steps that built a new artifact.
    #[must_use]
    pub fn created_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.cached)
            .map(|s| s.step.as_str())
            .collect()
    }
}

/// Step name of an artifact kind, as used in events, errors and plans.
#[must_use]
pub fn step_name(kind: &ArtifactKind) -> String {
    match kind {
        ArtifactKind::Outline => "outline".to_string(),
        ArtifactKind::ContextPack(key) => format!("context_pack:{key}"),
        ArtifactKind::Section(key) => format!("section:{key}"),
        ArtifactKind::SectionSummary(key) => format!("section_summary:{key}"),
        ArtifactKind::EnrichmentReport => "enrichment".to_string(),
        ArtifactKind::DocumentEdited => "editing".to_string(),
        ArtifactKind::Literature => "literature".to_string(),
        ArtifactKind::DocumentDraft => "assemble".to_string(),
        ArtifactKind::Toc => "toc".to_string(),
        ArtifactKind::QualityReport => "quality".to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn section_progress(done: usize, total: usize) -> u8 {
    let span = usize::from(SECTIONS_DONE_PROGRESS - OUTLINE_PROGRESS);
    let done = done.min(total);
    OUTLINE_PROGRESS + (span * done / total.max(1)) as u8
}

/// Drives document runs.
pub struct StepOrchestrator {
    store: ArtifactStore,
    dedup: CallDeduplicator,
    budgeter: ContextBudgeter,
    registry: Arc<SectionRegistry>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for StepOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepOrchestrator")
            .field("store", &self.store)
            .field("dedup", &self.dedup)
            .field("sections", &self.registry.keys())
            .finish_non_exhaustive()
    }
}

impl StepOrchestrator {
    /// Creates an orchestrator with the default registry and budget and no
    /// event sink.
    #[must_use]
    pub fn new(store: ArtifactStore, dedup: CallDeduplicator) -> Self {
        Self {
            store,
            dedup,
            budgeter: ContextBudgeter::default(),
            registry: Arc::new(SectionRegistry::defaults()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Wires an orchestrator from configuration and backends.
    pub fn from_config(
        config: &EngineConfig,
        provider: Arc<dyn GenerationProvider>,
        artifacts: Arc<dyn ArtifactRepository>,
        calls: Arc<dyn CallRepository>,
    ) -> Result<Self, DraftflowError> {
        config.validate()?;
        let dedup = CallDeduplicator::new(provider, calls, DedupSettings::from(&config.llm));
        Ok(Self::new(ArtifactStore::new(artifacts), dedup)
            .with_budgeter(ContextBudgeter::new(config.budget.clone())))
    }

    /// Sets the budgeter.
    #[must_use]
    pub fn with_budgeter(mut self, budgeter: ContextBudgeter) -> Self {
        self.budgeter = budgeter;
        self
    }

    /// Sets the section registry.
    #[must_use]
    pub fn with_registry(mut self, registry: SectionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// The artifact store.
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The section registry.
    #[must_use]
    pub fn registry(&self) -> &SectionRegistry {
        &self.registry
    }

    /// Steps a full run with `profile` executes, in order, with their
    /// dependencies. Steps switched off by the profile are left out.
    #[must_use]
    pub fn plan(&self, profile: &GenerationProfile) -> Vec<StepSpec> {
        let outline = step_name(&ArtifactKind::Outline);
        let mut steps = vec![StepSpec::new(outline.clone())];
        let mut section_steps = Vec::new();

        for spec in self.registry.ordered() {
            let pack = step_name(&ArtifactKind::ContextPack(spec.key.clone()));
            let mut pack_deps = vec![outline.clone()];
            if spec.needs_summaries {
                pack_deps.extend(
                    self.registry
                        .ordered()
                        .iter()
                        .take_while(|s| s.key != spec.key)
                        .map(|s| step_name(&ArtifactKind::SectionSummary(s.key.clone()))),
                );
            }
            steps.push(StepSpec::new(pack.clone()).with_dependencies(pack_deps));

            let text = spec.to_step_spec().with_dependency(pack);
            let summary = StepSpec::new(step_name(&ArtifactKind::SectionSummary(spec.key.clone())))
                .with_dependency(text.key.clone());
            section_steps.push(text.key.clone());
            steps.push(text);
            steps.push(summary);
        }

        let enrichment = step_name(&ArtifactKind::EnrichmentReport);
        steps.push(
            StepSpec::new(enrichment.clone())
                .with_dependencies(section_steps.clone())
                .requires(StageFlag::Enrichment),
        );
        let mut editing_deps = section_steps.clone();
        if profile.toggles.enrichment {
            editing_deps.push(enrichment);
        }
        steps.push(
            StepSpec::new(step_name(&ArtifactKind::DocumentEdited))
                .with_dependencies(editing_deps)
                .requires(StageFlag::Editing),
        );
        steps.push(
            StepSpec::new(step_name(&ArtifactKind::Literature))
                .with_dependency(outline.clone())
                .requires(StageFlag::Literature),
        );

        let assemble = step_name(&ArtifactKind::DocumentDraft);
        let mut assemble_deps = vec![outline];
        assemble_deps.extend(section_steps);
        steps.push(StepSpec::new(assemble.clone()).with_dependencies(assemble_deps));
        steps.push(StepSpec::new(step_name(&ArtifactKind::Toc)).with_dependency(assemble.clone()));
        steps.push(StepSpec::new(step_name(&ArtifactKind::QualityReport)).with_dependency(assemble));

        steps.retain(|s| !matches!(s.required_flag, Some(flag) if !profile.toggles.enabled(flag)));
        steps
    }

    /// Builder context for one document and profile.
    pub(crate) fn context<'a>(&'a self, document: &'a Document, profile: &'a GenerationProfile) -> StepContext<'a> {
        StepContext {
            document,
            profile,
            registry: &self.registry,
            store: &self.store,
            dedup: &self.dedup,
            budgeter: &self.budgeter,
        }
    }

    fn begin<'a>(
        &'a self,
        document: &'a Document,
        profile: &'a GenerationProfile,
        mode: RunMode,
        options: &RunOptions,
    ) -> Run<'a> {
        tracing::info!(
            document_id = %document.id,
            mode = %mode,
            profile = %profile.name,
            force = options.force,
            job_id = options.job_id.as_deref().unwrap_or(""),
            "Run started"
        );
        PipelineEvent::RunStarted {
            document_id: document.id,
            mode: mode.to_string(),
            profile: profile.name.clone(),
        }
        .send(&*self.events);

        let mut run = Run {
            ctx: self.context(document, profile),
            events: &*self.events,
            progress: options.progress.clone(),
            result: RunResult::new(document.id, &profile.name, mode, options.job_id.clone()),
            sections_rebuilt: false,
            timer: SpanTimer::start(format!("run:{mode}")),
        };
        run.advance(0, "start");
        run
    }

    /// Runs every step in order. With `force` every step is rebuilt.
    ///
    /// Never fails as a whole: a failing step stops the run and is reported
    /// in [`RunResult::errors`]; earlier artifacts stay valid.
    pub async fn run_full(
        &self,
        document: &Document,
        profile: &GenerationProfile,
        options: RunOptions,
    ) -> RunResult {
        let force = options.force;
        let mut run = self.begin(document, profile, RunMode::Full, &options);
        let specs: Vec<&SectionSpec> = self.registry.ordered().iter().collect();

        let outcome = async {
            run.outline(force).await?;
            run.sections(&specs, force).await?;
            run.refinement(force).await?;
            run.assembly(force).await
        }
        .await;
        run.complete(outcome)
    }

    /// Runs one section (honoring `force`), creating the outline first if
    /// it is missing, then rebuilds draft, toc and quality report.
    ///
    /// Fails up front with [`DraftflowError::UnknownSection`] for keys not in
    /// the registry.
    pub async fn run_section(
        &self,
        document: &Document,
        section_key: &str,
        profile: &GenerationProfile,
        options: RunOptions,
    ) -> Result<RunResult, DraftflowError> {
        let spec = self.registry.require(section_key)?;
        let force = options.force;
        let mut run = self.begin(document, profile, RunMode::Section, &options);

        let outcome = async {
            run.outline(false).await?;
            run.sections(&[spec], force).await?;
            run.assembly(true).await
        }
        .await;
        Ok(run.complete(outcome))
    }

    /// Continues a document from its first missing step. Finished steps are
    /// reused; draft, toc and quality report are always rebuilt.
    pub async fn resume(
        &self,
        document: &Document,
        profile: &GenerationProfile,
        options: RunOptions,
    ) -> RunResult {
        let mut run = self.begin(document, profile, RunMode::Resume, &options);
        let specs: Vec<&SectionSpec> = self.registry.ordered().iter().collect();

        let outcome = async {
            if let Some(from) = run.first_missing_section(&specs).await? {
                tracing::info!(document_id = %document.id, section = %from, "Resuming from section");
            }
            run.outline(false).await?;
            run.sections(&specs, false).await?;
            run.refinement(false).await?;
            run.assembly(true).await
        }
        .await;
        run.complete(outcome)
    }
}

/// State of one run.
struct Run<'a> {
    ctx: StepContext<'a>,
    events: &'a dyn EventSink,
    progress: Option<ProgressFn>,
    result: RunResult,
    sections_rebuilt: bool,
    timer: SpanTimer,
}

impl<'a> Run<'a> {
    fn advance(&mut self, percent: u8, step: &str) {
        self.result.progress = self.result.progress.max(percent);
        if let Some(progress) = &self.progress {
            progress(self.result.progress, step);
        }
    }

    async fn step<F, Fut>(&mut self, kind: ArtifactKind, force: bool, builder: F) -> Result<Ensured, StepFailure>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<BuildOutput, DraftflowError>> + Send,
    {
        let step = step_name(&kind);
        let document_id = self.ctx.document.id;
        PipelineEvent::StepStarted {
            document_id,
            step: step.clone(),
        }
        .send(self.events);

        let timer = SpanTimer::start(step.clone());
        let ensured = match self.ctx.store.ensure(document_id, &kind, builder, force).await {
            Ok(ensured) => ensured,
            Err(err) => {
                let attributes = StepSpanAttributes::new(&step)
                    .with_kind(kind.as_key())
                    .with_duration_ms(timer.elapsed_ms())
                    .with_error(err.to_string());
                tracing::warn!(document_id = %document_id, attributes = %attributes.to_json(), "Step failed");
                PipelineEvent::StepFailed {
                    document_id,
                    step: step.clone(),
                    error: err.to_string(),
                }
                .send(self.events);
                return Err(StepFailure::new(step, err.to_string()));
            }
        };

        let duration_ms = timer.elapsed_millis();
        if ensured.cached {
            self.result.artifacts_cached += 1;
        } else {
            self.result.artifacts_created += 1;
        }
        self.result.steps.push(StepRecord {
            step: step.clone(),
            kind: kind.as_key(),
            artifact_id: ensured.artifact.id,
            cached: ensured.cached,
            duration_ms,
        });
        PipelineEvent::StepCompleted {
            document_id,
            step: step.clone(),
            artifact_id: ensured.artifact.id,
            cached: ensured.cached,
            duration_ms,
        }
        .send(self.events);

        if !ensured.cached && kind.is_generation() {
            self.invalidate_assembly(&step).await?;
        }
        Ok(ensured)
    }

    async fn invalidate_assembly(&mut self, step: &str) -> Result<(), StepFailure> {
        let document_id = self.ctx.document.id;
        let flagged = self
            .ctx
            .store
            .invalidate_assembly(document_id)
            .await
            .map_err(|e| StepFailure::new(step, e.to_string()))?;
        if !flagged.is_empty() {
            self.result.invalidated += flagged.len();
            PipelineEvent::ArtifactsInvalidated {
                document_id,
                count: flagged.len(),
            }
            .send(self.events);
        }
        Ok(())
    }

    async fn first_missing_section(&self, specs: &[&SectionSpec]) -> Result<Option<String>, StepFailure> {
        for spec in specs {
            let kind = ArtifactKind::Section(spec.key.clone());
            let done = self
                .ctx
                .store
                .has_success(self.ctx.document.id, &kind)
                .await
                .map_err(|e| StepFailure::new(step_name(&kind), e.to_string()))?;
            if !done {
                return Ok(Some(spec.key.clone()));
            }
        }
        Ok(None)
    }

    async fn outline(&mut self, force: bool) -> Result<(), StepFailure> {
        let ctx = self.ctx;
        self.step(ArtifactKind::Outline, force, move || async move { outline::build(&ctx).await })
            .await?;
        self.advance(OUTLINE_PROGRESS, "outline");
        Ok(())
    }

    async fn sections(&mut self, specs: &[&'a SectionSpec], force: bool) -> Result<(), StepFailure> {
        for (i, &spec) in specs.iter().enumerate() {
            self.section(spec, force).await?;
            self.advance(section_progress(i + 1, specs.len()), &spec.step_key());
        }
        Ok(())
    }

    async fn section(&mut self, spec: &'a SectionSpec, force: bool) -> Result<(), StepFailure> {
        let ctx = self.ctx;
        let pack_kind = ArtifactKind::ContextPack(spec.key.clone());
        let previous_hash = ctx
            .store
            .latest(ctx.document.id, &pack_kind)
            .await
            .map_err(|e| StepFailure::new(step_name(&pack_kind), e.to_string()))?
            .and_then(|a| a.hash);

        let pack = self
            .step(pack_kind, force, move || async move { section::context_pack(&ctx, spec).await })
            .await?;
        let pack_changed = !pack.cached && pack.artifact.hash != previous_hash;

        let text = self
            .step(
                ArtifactKind::Section(spec.key.clone()),
                force || pack_changed,
                move || async move { section::generate(&ctx, spec).await },
            )
            .await?;
        self.sections_rebuilt |= !text.cached;

        self.step(
            ArtifactKind::SectionSummary(spec.key.clone()),
            force || !text.cached,
            move || async move { section::summarize(&ctx, spec).await },
        )
        .await?;
        Ok(())
    }

    async fn refinement(&mut self, force: bool) -> Result<(), StepFailure> {
        let ctx = self.ctx;
        let toggles = ctx.profile.toggles;
        let mut enriched = false;

        if toggles.enabled(StageFlag::Enrichment) {
            let report = self
                .step(
                    ArtifactKind::EnrichmentReport,
                    force || self.sections_rebuilt,
                    move || async move { refine::enrich(&ctx).await },
                )
                .await?;
            enriched = !report.cached;
        }
        self.advance(ENRICHMENT_PROGRESS, "enrichment");

        if toggles.enabled(StageFlag::Editing) {
            self.step(
                ArtifactKind::DocumentEdited,
                force || self.sections_rebuilt || enriched,
                move || async move { refine::edit(&ctx).await },
            )
            .await?;
        }
        self.advance(EDITING_PROGRESS, "editing");

        if toggles.enabled(StageFlag::Literature) {
            self.step(ArtifactKind::Literature, force, move || async move { literature::build(&ctx).await })
                .await?;
        }
        self.advance(LITERATURE_PROGRESS, "literature");
        Ok(())
    }

    async fn assembly(&mut self, force: bool) -> Result<(), StepFailure> {
        let ctx = self.ctx;
        self.step(ArtifactKind::DocumentDraft, force, move || async move { assemble::build(&ctx).await })
            .await?;
        self.advance(ASSEMBLE_PROGRESS, "assemble");
        self.step(ArtifactKind::Toc, force, move || async move { toc::build(&ctx).await })
            .await?;
        self.advance(TOC_PROGRESS, "toc");
        self.step(ArtifactKind::QualityReport, force, move || async move { quality::build(&ctx).await })
            .await?;
        self.advance(QUALITY_PROGRESS, "quality");
        Ok(())
    }

    fn complete(mut self, outcome: Result<(), StepFailure>) -> RunResult {
        let document_id = self.ctx.document.id;
        self.result.duration_ms = self.timer.elapsed_millis();
        match outcome {
            Ok(()) => {
                self.result.success = true;
                tracing::info!(
                    document_id = %document_id,
                    created = self.result.artifacts_created,
                    cached = self.result.artifacts_cached,
                    duration_ms = self.result.duration_ms,
                    "Run completed"
                );
                PipelineEvent::RunCompleted {
                    document_id,
                    created: self.result.artifacts_created,
                    cached: self.result.artifacts_cached,
                    duration_ms: self.result.duration_ms,
                }
                .send(self.events);
            }
            Err(failure) => {
                tracing::warn!(
                    document_id = %document_id,
                    step = %failure.step,
                    error = %failure.error,
                    "Run failed"
                );
                PipelineEvent::RunFailed {
                    document_id,
                    step: failure.step.clone(),
                    error: failure.error.clone(),
                }
                .send(self.events);
                self.result.errors.push(failure);
            }
        }
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SectionSpec;
    use crate::store::{InMemoryArtifactRepository, InMemoryCallRepository};
    use crate::testing::ScriptedProvider;

    fn orchestrator(registry: SectionRegistry) -> StepOrchestrator {
        let provider = Arc::new(ScriptedProvider::always("text"));
        let dedup = CallDeduplicator::new(
            provider,
            Arc::new(InMemoryCallRepository::new()),
            DedupSettings::default(),
        );
        StepOrchestrator::new(ArtifactStore::new(Arc::new(InMemoryArtifactRepository::new())), dedup)
            .with_registry(registry)
    }

    #[test]
    fn test_section_progress_is_proportional() {
        assert_eq!(section_progress(0, 4), 10);
        assert_eq!(section_progress(2, 4), 40);
        assert_eq!(section_progress(4, 4), 70);
        assert_eq!(section_progress(1, 0), 10);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(step_name(&ArtifactKind::Section("intro".into())), "section:intro");
        assert_eq!(step_name(&ArtifactKind::DocumentDraft), "assemble");
        assert_eq!(step_name(&ArtifactKind::QualityReport), "quality");
    }

    #[test]
    fn test_plan_follows_profile_toggles() {
        let registry = SectionRegistry::empty()
            .with_section(SectionSpec::new("intro", "Introduction", 1))
            .with_section(SectionSpec::new("conclusion", "Conclusion", 2));
        let orchestrator = orchestrator(registry);

        let fast: Vec<String> = orchestrator
            .plan(&GenerationProfile::fast())
            .into_iter()
            .map(|s| s.key)
            .collect();
        assert_eq!(
            fast,
            vec![
                "outline",
                "context_pack:intro",
                "section:intro",
                "section_summary:intro",
                "context_pack:conclusion",
                "section:conclusion",
                "section_summary:conclusion",
                "assemble",
                "toc",
                "quality",
            ]
        );

        let heavy = orchestrator.plan(&GenerationProfile::heavy());
        let editing = heavy.iter().find(|s| s.key == "editing").unwrap();
        assert!(editing.depends_on.contains(&"enrichment".to_string()));
        assert!(heavy.iter().any(|s| s.key == "literature"));
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let orchestrator = orchestrator(SectionRegistry::defaults());
        let plan = orchestrator.plan(&GenerationProfile::heavy());
        for (i, step) in plan.iter().enumerate() {
            for dep in &step.depends_on {
                let position = plan.iter().position(|s| &s.key == dep);
                assert!(
                    position.is_some_and(|p| p < i),
                    "{} depends on {dep}, which is not planned before it",
                    step.key
                );
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_section_fails_up_front() {
        let orchestrator = orchestrator(SectionRegistry::defaults());
        let document = Document::new("Doc");
        let err = orchestrator
            .run_section(&document, "appendix", &GenerationProfile::fast(), RunOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftflowError::UnknownSection(key) if key == "appendix"));
        assert!(orchestrator.store().list(document.id).await.unwrap().is_empty());
    }
}
