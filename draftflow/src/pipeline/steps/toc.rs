//! Table of contents, from the draft's headings or, failing that, the
//! outline.

use super::assemble::DocumentDraft;
use super::{artifact_data, StepContext};
use crate::core::{ArtifactKind, BuildOutput};
use crate::errors::DraftflowError;
use crate::pipeline::Outline;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::LazyLock;

/// ATX heading: level marks, then the title without closing marks.
#[allow(clippy::expect_used)]
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").expect("heading pattern is valid"));

#[allow(clippy::expect_used)]
static SLUG_STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("slug strip pattern is valid"));

#[allow(clippy::expect_used)]
static SLUG_JOIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("slug join pattern is valid"));

/// Deepest heading level listed.
const MAX_LEVEL: usize = 3;

/// One table of contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocItem {
    /// 1 for sections, 2 and 3 for headings inside them.
    pub level: usize,
    /// Entry text.
    pub title: String,
    /// Owning section.
    pub section_key: String,
    /// Link anchor.
    pub anchor: String,
}

/// Where the entries were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TocSource {
    /// Headings of the assembled draft.
    Draft,
    /// Sections and points of the outline.
    Outline,
}

/// The table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toc {
    /// Entries in document order.
    pub items: Vec<TocItem>,
    /// Entry source.
    pub source: TocSource,
}

/// Lowercases, drops punctuation and joins words with `-`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(&lowered, "");
    SLUG_JOIN_RE.replace_all(&stripped, "-").trim_matches('-').to_string()
}

/// Markdown headings of `content` as `(level, title)` pairs.
#[must_use]
pub fn extract_headings(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .filter_map(|line| {
            let caps = HEADING_RE.captures(line.trim())?;
            Some((caps[1].len(), caps[2].trim().to_string()))
        })
        .collect()
}

impl Toc {
    /// Entries from the draft: each section, then its level 2 and 3
    /// headings. Deeper headings are folded into level 3.
    #[must_use]
    pub fn from_draft(draft: &DocumentDraft) -> Self {
        let mut items = Vec::new();
        for section in &draft.sections {
            items.push(TocItem {
                level: 1,
                title: section.title.clone(),
                section_key: section.key.clone(),
                anchor: slugify(&section.title),
            });
            items.extend(
                extract_headings(&section.content_md)
                    .into_iter()
                    .filter(|(level, _)| *level > 1)
                    .map(|(level, title)| TocItem {
                        level: level.min(MAX_LEVEL),
                        anchor: slugify(&title),
                        title,
                        section_key: section.key.clone(),
                    }),
            );
        }
        Self {
            items,
            source: TocSource::Draft,
        }
    }

    /// Entries from the outline: sections and their points.
    #[must_use]
    pub fn from_outline(outline: &Outline) -> Self {
        let mut items = Vec::new();
        for section in &outline.sections {
            items.push(TocItem {
                level: 1,
                title: section.title.clone(),
                section_key: section.key.clone(),
                anchor: slugify(&section.title),
            });
            items.extend(section.points.iter().map(|point| TocItem {
                level: 2,
                title: point.clone(),
                section_key: section.key.clone(),
                anchor: slugify(point),
            }));
        }
        Self {
            items,
            source: TocSource::Outline,
        }
    }
}

/// Builds the table of contents.
pub async fn build(ctx: &StepContext<'_>) -> Result<BuildOutput, DraftflowError> {
    let toc = if let Some(draft) = ctx.artifact(&ArtifactKind::DocumentDraft).await? {
        Toc::from_draft(&artifact_data(&draft)?)
    } else if let Some(outline) = ctx.artifact(&ArtifactKind::Outline).await? {
        Toc::from_outline(&artifact_data(&outline)?)
    } else {
        return Err(DraftflowError::validation(format!(
            "No draft or outline for document {}",
            ctx.document.id
        )));
    };

    Ok(BuildOutput::data(serde_json::to_value(&toc)?)
        .with_meta("source", json!(toc.source))
        .with_meta("item_count", json!(toc.items.len())))
}
