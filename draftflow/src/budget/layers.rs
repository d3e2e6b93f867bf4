//! Context layers and their text rendering.

use super::facts::{FactRef, FactSet};
use crate::pipeline::{Outline, OutlineMode, SectionSpec, SectionSummary};
use serde::{Deserialize, Serialize};

/// Maximum outline points listed per section in local mode.
const LOCAL_POINTS_LIMIT: usize = 5;

/// The rendered parts of a generation request, before the task line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLayers {
    /// Document-wide context (title, topic, language).
    pub global_context: String,
    /// Outline excerpt in the section's outline mode.
    pub outline: String,
    /// Selected facts.
    pub facts: String,
    /// Summaries of earlier sections.
    pub summaries: String,
    /// Length target and section constraints.
    pub constraints: String,
}

impl ContextLayers {
    /// Total characters across all layers.
    #[must_use]
    pub fn char_count(&self) -> usize {
        [
            &self.global_context,
            &self.outline,
            &self.facts,
            &self.summaries,
            &self.constraints,
        ]
        .iter()
        .map(|s| s.chars().count())
        .sum()
    }
}

/// Renders the outline excerpt for `current` in the given mode.
#[must_use]
pub fn outline_excerpt(outline: &Outline, mode: OutlineMode, current: &str) -> String {
    match mode {
        OutlineMode::Full => serde_json::to_string_pretty(outline).unwrap_or_default(),
        OutlineMode::Structure => {
            let mut lines = vec![format!("Title: {}", outline.title), String::new(), "Structure:".to_string()];
            for (i, section) in outline.sections.iter().enumerate() {
                let marker = if section.key == current { ">" } else { " " };
                lines.push(format!("{marker} {}. {}", i + 1, section.title));
            }
            lines.join("\n")
        }
        OutlineMode::Local => {
            let Some(pos) = outline.sections.iter().position(|s| s.key == current) else {
                return outline_excerpt(outline, OutlineMode::Structure, current);
            };
            let start = pos.saturating_sub(1);
            let end = (pos + 2).min(outline.sections.len());

            let mut lines = vec![format!("Title: {}", outline.title), String::new()];
            for section in &outline.sections[start..end] {
                let marker = if section.key == current { ">" } else { " " };
                lines.push(format!("{marker} [{}] {}", section.key, section.title));
                lines.extend(
                    section
                        .points
                        .iter()
                        .take(LOCAL_POINTS_LIMIT)
                        .map(|p| format!("    - {p}")),
                );
            }
            lines.join("\n")
        }
    }
}

/// Reduces an outline excerpt to heading lines: indented point lines are
/// dropped, and a JSON excerpt keeps only its `title` lines.
#[must_use]
pub fn outline_headings(excerpt: &str, limit: usize) -> String {
    let json_like = excerpt.trim_start().starts_with('{');
    excerpt
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return false;
            }
            if json_like {
                trimmed.contains("\"title\"")
            } else {
                !trimmed.starts_with("- ")
            }
        })
        .take(limit)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders selected facts, one `[id] text` line each, with an indented
/// details line when `with_details` is set.
#[must_use]
pub fn format_facts(facts: &FactSet, selected: &[FactRef], with_details: bool) -> String {
    let mut lines = Vec::new();
    for fact in selected.iter().filter_map(|r| facts.get(&r.fact_id)) {
        lines.push(format!("[{}] {}", fact.id, fact.text));
        if with_details {
            if let Some(details) = fact.details_line() {
                lines.push(format!("  Details: {details}"));
            }
        }
    }
    lines.join("\n")
}

/// Renders summaries of the given sections, skipping empty ones.
#[must_use]
pub fn format_summaries(summaries: &[SectionSummary]) -> String {
    summaries
        .iter()
        .filter(|s| !s.points.is_empty())
        .map(|s| {
            let mut block = format!("Section '{}':", s.section_key);
            for point in &s.points {
                block.push_str("\n  - ");
                block.push_str(point);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders the length target and the section's constraints.
#[must_use]
pub fn format_constraints(spec: &SectionSpec, target_words: (usize, usize)) -> String {
    let mut lines = vec![format!("Length: {}-{} words", target_words.0, target_words.1)];
    lines.extend(spec.constraints.iter().map(|c| format!("- {c}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::Fact;
    use crate::pipeline::OutlineSection;
    use pretty_assertions::assert_eq;

    fn outline() -> Outline {
        Outline {
            title: "Draftflow".to_string(),
            sections: vec![
                OutlineSection::new("intro", "Introduction").with_points(["Motivation", "Goals"]),
                OutlineSection::new("theory", "Background").with_points(["Caching"]),
                OutlineSection::new("architecture", "Architecture"),
                OutlineSection::new("conclusion", "Conclusion"),
            ],
        }
    }

    #[test]
    fn test_structure_mode_marks_current() {
        let text = outline_excerpt(&outline(), OutlineMode::Structure, "theory");
        assert_eq!(
            text,
            "Title: Draftflow\n\nStructure:\n  1. Introduction\n> 2. Background\n  3. Architecture\n  4. Conclusion"
        );
    }

    #[test]
    fn test_local_mode_windows_neighbours() {
        let text = outline_excerpt(&outline(), OutlineMode::Local, "theory");
        assert!(text.contains("  [intro] Introduction\n    - Motivation"));
        assert!(text.contains("> [theory] Background"));
        assert!(text.contains("[architecture]"));
        assert!(!text.contains("[conclusion]"));
    }

    #[test]
    fn test_local_mode_unknown_section_falls_back() {
        let text = outline_excerpt(&outline(), OutlineMode::Local, "missing");
        assert!(text.contains("Structure:"));
    }

    #[test]
    fn test_headings_drop_points() {
        let local = outline_excerpt(&outline(), OutlineMode::Local, "theory");
        let headings = outline_headings(&local, 20);
        assert!(!headings.contains("Motivation"));
        assert!(headings.contains("[theory] Background"));

        let full = outline_excerpt(&outline(), OutlineMode::Full, "theory");
        let headings = outline_headings(&full, 2);
        assert_eq!(headings.lines().count(), 2);
        assert!(headings.lines().all(|l| l.contains("\"title\"")));
    }

    #[test]
    fn test_format_facts_with_and_without_details() {
        let facts = FactSet::new(vec![
            Fact::new("f1", "Uses Rust").with_details(serde_json::json!("edition 2021")),
        ]);
        let selected = vec![FactRef {
            fact_id: "f1".to_string(),
            reason: "tag:x".to_string(),
            weight: 1.0,
        }];
        assert_eq!(
            format_facts(&facts, &selected, true),
            "[f1] Uses Rust\n  Details: edition 2021"
        );
        assert_eq!(format_facts(&facts, &selected, false), "[f1] Uses Rust");
    }

    #[test]
    fn test_format_summaries() {
        let summaries = vec![
            SectionSummary::new("intro", vec!["One".to_string(), "Two".to_string()]),
            SectionSummary::new("theory", Vec::new()),
        ];
        assert_eq!(format_summaries(&summaries), "Section 'intro':\n  - One\n  - Two");
    }
}
