//! Artifact kinds: the versioned step identifiers artifacts are keyed by.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which step produced an artifact.
///
/// The string form (`section:intro:v1`, `toc:v1`, ...) is what the stores
/// persist; bumping the version suffix orphans old cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactKind {
    /// Document outline (title plus sections).
    Outline,
    /// Budgeted request payload for one section.
    ContextPack(String),
    /// Generated markdown for one section.
    Section(String),
    /// Bullet summary of one section.
    SectionSummary(String),
    /// Fact enrichment pass over all sections.
    EnrichmentReport,
    /// Style editing pass over all sections.
    DocumentEdited,
    /// Reference list.
    Literature,
    /// Assembled document.
    DocumentDraft,
    /// Table of contents.
    Toc,
    /// Quality report.
    QualityReport,
}

const VERSION: &str = "v1";

impl ArtifactKind {
    /// Kinds rebuilt from section content and invalidated when it changes.
    pub const ASSEMBLY: [Self; 3] = [Self::DocumentDraft, Self::Toc, Self::QualityReport];

    /// Returns the persisted key, e.g. `section_summary:intro:v1`.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::Outline => format!("outline:{VERSION}"),
            Self::ContextPack(key) => format!("context_pack:{key}:{VERSION}"),
            Self::Section(key) => format!("section:{key}:{VERSION}"),
            Self::SectionSummary(key) => format!("section_summary:{key}:{VERSION}"),
            Self::EnrichmentReport => format!("enrichment_report:{VERSION}"),
            Self::DocumentEdited => format!("document_edited:{VERSION}"),
            Self::Literature => format!("literature:{VERSION}"),
            Self::DocumentDraft => format!("document_draft:{VERSION}"),
            Self::Toc => format!("toc:{VERSION}"),
            Self::QualityReport => format!("quality_report:{VERSION}"),
        }
    }

    /// Parses a persisted key. Unknown prefixes or versions yield `None`.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        match parts.as_slice() {
            [name, version] if *version == VERSION => match *name {
                "outline" => Some(Self::Outline),
                "enrichment_report" => Some(Self::EnrichmentReport),
                "document_edited" => Some(Self::DocumentEdited),
                "literature" => Some(Self::Literature),
                "document_draft" => Some(Self::DocumentDraft),
                "toc" => Some(Self::Toc),
                "quality_report" => Some(Self::QualityReport),
                _ => None,
            },
            [name, section, version] if *version == VERSION && !section.is_empty() => {
                let section = (*section).to_string();
                match *name {
                    "context_pack" => Some(Self::ContextPack(section)),
                    "section" => Some(Self::Section(section)),
                    "section_summary" => Some(Self::SectionSummary(section)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The section key for per-section kinds.
    #[must_use]
    pub fn section_key(&self) -> Option<&str> {
        match self {
            Self::ContextPack(key) | Self::Section(key) | Self::SectionSummary(key) => Some(key),
            _ => None,
        }
    }

    /// Returns true for kinds whose builder calls the generation service.
    /// A fresh artifact of such a kind invalidates the assembly kinds.
    #[must_use]
    pub fn is_generation(&self) -> bool {
        matches!(
            self,
            Self::Outline
                | Self::Section(_)
                | Self::SectionSummary(_)
                | Self::EnrichmentReport
                | Self::DocumentEdited
                | Self::Literature
        )
    }

    /// Returns true for draft, toc and quality report.
    #[must_use]
    pub fn is_assembly(&self) -> bool {
        Self::ASSEMBLY.contains(self)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<ArtifactKind> for String {
    fn from(kind: ArtifactKind) -> Self {
        kind.as_key()
    }
}

impl TryFrom<String> for ArtifactKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown artifact kind: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_keys() {
        assert_eq!(ArtifactKind::Outline.as_key(), "outline:v1");
        assert_eq!(ArtifactKind::Section("intro".into()).as_key(), "section:intro:v1");
        assert_eq!(
            ArtifactKind::SectionSummary("theory".into()).as_key(),
            "section_summary:theory:v1"
        );
        assert_eq!(ArtifactKind::QualityReport.as_key(), "quality_report:v1");
    }

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            ArtifactKind::Outline,
            ArtifactKind::ContextPack("a".into()),
            ArtifactKind::Section("a".into()),
            ArtifactKind::SectionSummary("a".into()),
            ArtifactKind::EnrichmentReport,
            ArtifactKind::DocumentEdited,
            ArtifactKind::Literature,
            ArtifactKind::DocumentDraft,
            ArtifactKind::Toc,
            ArtifactKind::QualityReport,
        ] {
            assert_eq!(ArtifactKind::parse(&kind.as_key()), Some(kind));
        }
    }

    #[test]
    fn test_kind_parse_rejects_unknown() {
        assert_eq!(ArtifactKind::parse("outline:v2"), None);
        assert_eq!(ArtifactKind::parse("section::v1"), None);
        assert_eq!(ArtifactKind::parse("nonsense"), None);
    }

    #[test]
    fn test_generation_and_assembly_flags() {
        assert!(ArtifactKind::Section("x".into()).is_generation());
        assert!(!ArtifactKind::ContextPack("x".into()).is_generation());
        assert!(ArtifactKind::Toc.is_assembly());
        assert!(!ArtifactKind::Outline.is_assembly());
    }
}
