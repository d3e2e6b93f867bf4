//! Step builders.
//!
//! Each builder reads what it needs from the artifact store, does its work
//! (usually one or more deduplicated generation calls) and returns a
//! [`BuildOutput`] for `ArtifactStore::ensure` to persist. Builders never
//! write artifacts themselves.

pub mod assemble;
pub mod literature;
pub mod outline;
pub mod quality;
pub mod refine;
pub mod section;
pub mod toc;

use super::{Document, GenerationProfile, SectionRegistry};
use crate::budget::ContextBudgeter;
use crate::core::{Artifact, ArtifactKind, BuildOutput};
use crate::errors::DraftflowError;
use crate::llm::{CallDeduplicator, CallMeta, CallParams};
use crate::store::ArtifactStore;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Everything a builder may read.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// The document being generated.
    pub document: &'a Document,
    /// Active profile.
    pub profile: &'a GenerationProfile,
    /// Section registry.
    pub registry: &'a SectionRegistry,
    /// Artifact store, for reading upstream artifacts.
    pub store: &'a ArtifactStore,
    /// Generation calls.
    pub dedup: &'a CallDeduplicator,
    /// Request budgeting.
    pub budgeter: &'a ContextBudgeter,
}

impl StepContext<'_> {
    /// Latest authoritative artifact of `kind`, if any.
    pub async fn artifact(&self, kind: &ArtifactKind) -> Result<Option<Artifact>, DraftflowError> {
        self.store.latest(self.document.id, kind).await
    }

    /// Latest authoritative artifact of `kind`, failing if it is missing.
    pub async fn require(&self, kind: &ArtifactKind) -> Result<Artifact, DraftflowError> {
        self.artifact(kind).await?.ok_or_else(|| {
            DraftflowError::validation(format!(
                "Artifact '{kind}' is required but missing for document {}",
                self.document.id
            ))
        })
    }

    /// Structured payload of the latest artifact of `kind`, if any.
    pub async fn data<T: DeserializeOwned>(&self, kind: &ArtifactKind) -> Result<Option<T>, DraftflowError> {
        match self.artifact(kind).await? {
            Some(artifact) => artifact_data(&artifact).map(Some),
            None => Ok(None),
        }
    }

    /// Call parameters for a request on behalf of `section_key`, using the
    /// profile's budget for that section.
    #[must_use]
    pub fn params_for(&self, section_key: &str) -> CallParams {
        let budget = self.profile.budget_for(section_key);
        self.params(budget.temperature, budget.max_output_tokens)
    }

    /// Call parameters with explicit sampling settings.
    #[must_use]
    pub fn params(&self, temperature: f64, max_tokens: usize) -> CallParams {
        let mut params = CallParams::new()
            .with_temperature(temperature)
            .with_max_tokens(u32::try_from(max_tokens).unwrap_or(u32::MAX));
        if let Some(model) = &self.profile.model {
            params = params.with_model(model.clone());
        }
        params
    }
}

/// Deserializes an artifact's structured payload.
pub fn artifact_data<T: DeserializeOwned>(artifact: &Artifact) -> Result<T, DraftflowError> {
    let data = artifact.data().ok_or_else(|| {
        DraftflowError::validation(format!("Artifact '{}' has no structured payload", artifact.kind))
    })?;
    Ok(serde_json::from_value(data.clone())?)
}

/// Adds call usage to a build output's meta.
#[must_use]
pub fn with_call_meta(output: BuildOutput, meta: &CallMeta, profile: &GenerationProfile) -> BuildOutput {
    output
        .with_meta("llm", meta.to_json())
        .with_meta("profile", Value::String(profile.name.clone()))
}

/// Sums usage over several calls for aggregate steps.
#[must_use]
pub fn aggregate_meta(metas: &[CallMeta]) -> Value {
    let prompt: u64 = metas.iter().map(|m| m.prompt_tokens).sum();
    let completion: u64 = metas.iter().map(|m| m.completion_tokens).sum();
    let cost: f64 = metas.iter().map(|m| m.cost_estimate).sum();
    json!({
        "calls": metas.len(),
        "cached_calls": metas.iter().filter(|m| m.cached).count(),
        "prompt_tokens": prompt,
        "completion_tokens": completion,
        "cost_estimate": (cost * 1_000_000.0).round() / 1_000_000.0,
    })
}
