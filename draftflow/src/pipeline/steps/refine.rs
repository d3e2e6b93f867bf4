//! Whole-document refinement passes: fact enrichment and style editing.
//!
//! Both passes rewrite every generated section and record, per section, the
//! content hash of the section artifact they started from. Assembly only
//! uses a refined text while that hash still matches, so regenerating a
//! single section never resurrects an outdated refined version.

use super::{aggregate_meta, StepContext};
use crate::budget::ContextPack;
use crate::core::{Artifact, ArtifactKind, BuildOutput};
use crate::errors::DraftflowError;
use crate::llm::CallMeta;
use crate::utils::count_words;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Facts offered to the enrichment call per section.
const ENRICHMENT_FACT_LIMIT: usize = 5;
/// Sampling temperature for editing.
const EDITING_TEMPERATURE: f64 = 0.3;

/// One section after a refinement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedSection {
    /// Section key.
    pub key: String,
    /// Refined text.
    pub text: String,
    /// Hash of the section artifact the text was derived from.
    pub source_hash: String,
    /// Facts worked into the text.
    #[serde(default)]
    pub facts_added: Vec<String>,
    /// Word count change.
    pub words_added: i64,
}

/// Output of a refinement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// Refined sections in document order.
    pub sections: Vec<RefinedSection>,
    /// Facts added across all sections.
    pub total_facts_used: usize,
    /// Word count change across all sections.
    pub total_words_added: i64,
}

impl RefinementReport {
    /// Refined text of a section, if it was derived from `source_hash`.
    #[must_use]
    pub fn text_for(&self, key: &str, source_hash: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.key == key && s.source_hash == source_hash)
            .map(|s| s.text.as_str())
    }

    fn push(&mut self, section: RefinedSection) {
        self.total_facts_used += section.facts_added.len();
        self.total_words_added += section.words_added;
        self.sections.push(section);
    }

    fn into_output(self, metas: &[CallMeta]) -> Result<BuildOutput, DraftflowError> {
        Ok(BuildOutput::data(serde_json::to_value(&self)?)
            .with_meta("sections", json!(self.sections.len()))
            .with_meta("total_facts_used", json!(self.total_facts_used))
            .with_meta("total_words_added", json!(self.total_words_added))
            .with_meta("llm", aggregate_meta(metas)))
    }
}

async fn generated_sections(ctx: &StepContext<'_>) -> Result<Vec<Artifact>, DraftflowError> {
    let mut sections = Vec::new();
    for spec in ctx.registry.ordered() {
        if let Some(artifact) = ctx.artifact(&ArtifactKind::Section(spec.key.clone())).await? {
            sections.push(artifact);
        }
    }
    Ok(sections)
}

fn section_key(artifact: &Artifact) -> String {
    ArtifactKind::parse(&artifact.kind)
        .and_then(|k| k.section_key().map(ToString::to_string))
        .unwrap_or_default()
}

#[allow(clippy::cast_possible_wrap)]
fn word_delta(before: &str, after: &str) -> i64 {
    count_words(after) as i64 - count_words(before) as i64
}

/// Works facts the section selected but did not mention into its text.
pub async fn enrich(ctx: &StepContext<'_>) -> Result<BuildOutput, DraftflowError> {
    let mut report = RefinementReport::default();
    let mut metas = Vec::new();

    for artifact in generated_sections(ctx).await? {
        let key = section_key(&artifact);
        let original = artifact.text().unwrap_or_default();
        let lowered = original.to_lowercase();

        let pack: Option<ContextPack> = ctx.data(&ArtifactKind::ContextPack(key.clone())).await?;
        let unused: Vec<_> = pack
            .iter()
            .flat_map(|p| p.selected_facts.iter())
            .filter_map(|r| ctx.document.facts.get(&r.fact_id))
            .filter(|f| !f.text.trim().is_empty() && !lowered.contains(&f.text.to_lowercase()))
            .take(ENRICHMENT_FACT_LIMIT)
            .collect();

        let source_hash = artifact.hash.clone().unwrap_or_default();
        if unused.is_empty() {
            report.push(RefinedSection {
                key,
                text: original.to_string(),
                source_hash,
                facts_added: Vec::new(),
                words_added: 0,
            });
            continue;
        }

        let facts = unused
            .iter()
            .map(|f| format!("[{}] {}", f.id, f.text))
            .collect::<Vec<_>>()
            .join("\n");
        let system = "You extend a document section with additional facts. Keep all existing \
                      content and structure, weave each fact in where it fits, and return the \
                      full revised section in markdown.";
        let user = format!("# SECTION\n{original}\n\n# FACTS TO ADD\n{facts}");
        let result = ctx.dedup.call_text(system, user, ctx.params_for(&key)).await?;
        let text = result.text.trim().to_string();

        report.push(RefinedSection {
            words_added: word_delta(original, &text),
            facts_added: unused.iter().map(|f| f.id.clone()).collect(),
            key,
            text,
            source_hash,
        });
        metas.push(result.meta);
    }

    tracing::info!(
        document_id = %ctx.document.id,
        sections = report.sections.len(),
        facts = report.total_facts_used,
        "Enrichment pass finished"
    );
    report.into_output(&metas)
}

/// Rewrites each section in the document's style, starting from the
/// enriched text when it is current.
pub async fn edit(ctx: &StepContext<'_>) -> Result<BuildOutput, DraftflowError> {
    let enrichment: Option<RefinementReport> = ctx.data(&ArtifactKind::EnrichmentReport).await?;
    let mut report = RefinementReport::default();
    let mut metas = Vec::new();

    for artifact in generated_sections(ctx).await? {
        let key = section_key(&artifact);
        let source_hash = artifact.hash.clone().unwrap_or_default();
        let source = enrichment
            .as_ref()
            .and_then(|r| r.text_for(&key, &source_hash))
            .or_else(|| artifact.text())
            .unwrap_or_default();
        if source.trim().is_empty() {
            continue;
        }

        let system = "You are an editor. Improve clarity, consistency of terminology and flow \
                      of the section without changing its meaning, facts or structure. Return \
                      the full edited section in markdown.";
        let user = format!("Language: {}\n\n{source}", ctx.document.language);
        let result = ctx
            .dedup
            .call_text(system, user, ctx.params(EDITING_TEMPERATURE, ctx.profile.budget_for(&key).max_output_tokens))
            .await?;
        let text = result.text.trim().to_string();

        report.push(RefinedSection {
            words_added: word_delta(source, &text),
            key,
            text,
            source_hash,
            facts_added: Vec::new(),
        });
        metas.push(result.meta);
    }

    report.into_output(&metas)
}
