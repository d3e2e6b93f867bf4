//! Assembly: the document draft built from the latest section texts.

use super::literature::Literature;
use super::refine::RefinementReport;
use super::{artifact_data, StepContext};
use crate::core::{ArtifactKind, BuildOutput};
use crate::errors::DraftflowError;
use crate::pipeline::{Outline, SectionSummary};
use crate::utils::{char_len, count_words};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Which version of a section went into the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Output of the editing pass.
    Edited,
    /// Output of the enrichment pass.
    Enriched,
    /// The generated section text.
    Raw,
}

/// One section of the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDraft {
    /// Section key.
    pub key: String,
    /// Section title.
    pub title: String,
    /// 1-based position.
    pub order: usize,
    /// Markdown body.
    pub content_md: String,
    /// Summary bullets, if summarized.
    #[serde(default)]
    pub summary_bullets: Vec<String>,
    /// Words in the body.
    pub word_count: usize,
    /// Characters in the body.
    pub char_count: usize,
    /// Version used.
    pub source: TextSource,
}

/// The assembled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    /// Document title.
    pub title: String,
    /// Sections in order.
    pub sections: Vec<SectionDraft>,
    /// Numbered reference list.
    #[serde(default)]
    pub bibliography: Vec<String>,
}

impl DocumentDraft {
    /// Total words across sections.
    #[must_use]
    pub fn total_words(&self) -> usize {
        self.sections.iter().map(|s| s.word_count).sum()
    }

    /// Total characters across sections.
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.sections.iter().map(|s| s.char_count).sum()
    }

    /// Renders the draft as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut parts = vec![format!("# {}", self.title)];
        for section in &self.sections {
            parts.push(format!("## {}\n\n{}", section.title, section.content_md.trim()));
        }
        if !self.bibliography.is_empty() {
            parts.push(format!("## References\n\n{}", self.bibliography.join("\n")));
        }
        parts.join("\n\n") + "\n"
    }
}

/// Builds the draft. Sections that were never generated are skipped.
pub async fn build(ctx: &StepContext<'_>) -> Result<BuildOutput, DraftflowError> {
    let outline: Outline = artifact_data(&ctx.require(&ArtifactKind::Outline).await?)?;
    let edited: Option<RefinementReport> = ctx.data(&ArtifactKind::DocumentEdited).await?;
    let enriched: Option<RefinementReport> = ctx.data(&ArtifactKind::EnrichmentReport).await?;
    let literature: Option<Literature> = ctx.data(&ArtifactKind::Literature).await?;

    let mut sections = Vec::new();
    for spec in ctx.registry.ordered() {
        let Some(artifact) = ctx.artifact(&ArtifactKind::Section(spec.key.clone())).await? else {
            tracing::warn!(document_id = %ctx.document.id, section = %spec.key, "Section missing from draft");
            continue;
        };
        let hash = artifact.hash.clone().unwrap_or_default();
        let (content, source) = if let Some(text) = edited.as_ref().and_then(|r| r.text_for(&spec.key, &hash)) {
            (text.to_string(), TextSource::Edited)
        } else if let Some(text) = enriched.as_ref().and_then(|r| r.text_for(&spec.key, &hash)) {
            (text.to_string(), TextSource::Enriched)
        } else {
            (artifact.text().unwrap_or_default().to_string(), TextSource::Raw)
        };

        let summary_bullets = ctx
            .data::<SectionSummary>(&ArtifactKind::SectionSummary(spec.key.clone()))
            .await?
            .map(|s| s.points)
            .unwrap_or_default();
        let title = outline
            .section(&spec.key)
            .map_or_else(|| spec.title.clone(), |s| s.title.clone());

        sections.push(SectionDraft {
            key: spec.key.clone(),
            title,
            order: sections.len() + 1,
            word_count: count_words(&content),
            char_count: char_len(&content),
            content_md: content,
            summary_bullets,
            source,
        });
    }
    if sections.is_empty() {
        return Err(DraftflowError::validation("No generated sections to assemble"));
    }

    let draft = DocumentDraft {
        title: if outline.title.trim().is_empty() {
            ctx.document.title.clone()
        } else {
            outline.title.clone()
        },
        sections,
        bibliography: literature.map(|l| l.bibliography()).unwrap_or_default(),
    };

    Ok(BuildOutput::text(draft.to_markdown())
        .with_data(serde_json::to_value(&draft)?)
        .with_meta("section_count", json!(draft.sections.len()))
        .with_meta("total_words", json!(draft.total_words()))
        .with_meta("total_chars", json!(draft.total_chars())))
}
