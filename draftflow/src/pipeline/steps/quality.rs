//! Quality report over the generated sections.
//!
//! Structural checks only: presence, length against the word target, title
//! clashes and 3-gram repetition. Style and terminology linting is left to
//! external tools.

use super::assemble::DocumentDraft;
use super::{artifact_data, StepContext};
use crate::core::{ArtifactKind, BuildOutput};
use crate::errors::DraftflowError;
use crate::pipeline::Outline;
use crate::utils::{char_len, count_words};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Share of 3-grams repeated more than twice above which a section is
/// flagged.
const REPETITION_THRESHOLD: f64 = 0.1;
/// Sections with fewer 3-grams are not checked for repetition.
const MIN_NGRAMS: usize = 10;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Fails the report.
    Error,
    /// Reported only.
    Warning,
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Machine-readable code, e.g. `MISSING_SECTION`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Affected section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_key: Option<String>,
    /// Severity.
    pub severity: Severity,
}

/// Aggregate numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityStats {
    /// Words across generated sections.
    pub total_words: usize,
    /// Characters across generated sections.
    pub total_chars: usize,
    /// Generated sections.
    pub section_count: usize,
    /// Words per section.
    pub section_words: BTreeMap<String, usize>,
    /// Mean words per section, one decimal.
    pub avg_words_per_section: f64,
}

/// The quality report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Findings that fail the report.
    pub errors: Vec<QualityIssue>,
    /// Findings that do not.
    pub warnings: Vec<QualityIssue>,
    /// Aggregate numbers.
    pub stats: QualityStats,
}

impl QualityReport {
    /// Returns true when there are no errors.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, code: &str, message: String, section_key: Option<&str>) {
        self.errors.push(QualityIssue {
            code: code.to_string(),
            message,
            section_key: section_key.map(ToString::to_string),
            severity: Severity::Error,
        });
    }

    fn warning(&mut self, code: &str, message: String, section_key: &str) {
        self.warnings.push(QualityIssue {
            code: code.to_string(),
            message,
            section_key: Some(section_key.to_string()),
            severity: Severity::Warning,
        });
    }

    /// Codes of all findings, errors first.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .map(|i| i.code.as_str())
            .collect()
    }
}

/// Share of distinct word 3-grams occurring more than twice. `None` when
/// the text is too short to judge.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn repetition_ratio(text: &str) -> Option<f64> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.len() < 3 {
        return None;
    }
    let ngrams: Vec<&[String]> = words.windows(3).collect();
    if ngrams.len() < MIN_NGRAMS {
        return None;
    }
    let mut counts: HashMap<&[String], usize> = HashMap::new();
    for gram in ngrams {
        *counts.entry(gram).or_default() += 1;
    }
    let repeated = counts.values().filter(|&&n| n > 2).count();
    Some(repeated as f64 / counts.len() as f64)
}

/// Builds the quality report.
#[allow(clippy::cast_precision_loss)]
pub async fn build(ctx: &StepContext<'_>) -> Result<BuildOutput, DraftflowError> {
    let mut report = QualityReport::default();

    let outline: Option<Outline> = match ctx.artifact(&ArtifactKind::Outline).await? {
        Some(artifact) => Some(artifact_data(&artifact)?),
        None => None,
    };
    if outline.is_none() {
        report.error("NO_OUTLINE", "Outline not found".to_string(), None);
    }
    let draft: Option<DocumentDraft> = ctx.data(&ArtifactKind::DocumentDraft).await?;

    let mut seen_titles = HashSet::new();
    for spec in ctx.registry.ordered() {
        let key = spec.key.as_str();
        let Some(artifact) = ctx.artifact(&ArtifactKind::Section(spec.key.clone())).await? else {
            report.error(
                "MISSING_SECTION",
                format!("Section '{key}' was not generated"),
                Some(key),
            );
            continue;
        };

        let content = artifact.text().unwrap_or_default();
        let words = count_words(content);
        report.stats.section_words.insert(key.to_string(), words);
        report.stats.total_words += words;
        report.stats.total_chars += char_len(content);
        report.stats.section_count += 1;

        if content.trim().is_empty() {
            report.error("EMPTY_SECTION", format!("Section '{key}' is empty"), Some(key));
            continue;
        }

        let (min_words, max_words) = ctx.profile.target_words(spec.target_words);
        if (words as f64) < min_words as f64 * 0.5 {
            report.warning(
                "SECTION_TOO_SHORT",
                format!("Section '{key}' has {words} words, expected at least {min_words}"),
                key,
            );
        } else if words as f64 > max_words as f64 * 1.5 {
            report.warning(
                "SECTION_TOO_LONG",
                format!("Section '{key}' has {words} words, expected at most {max_words}"),
                key,
            );
        }

        let title = draft
            .as_ref()
            .and_then(|d| d.sections.iter().find(|s| s.key == key))
            .map(|s| s.title.clone());
        if let Some(title) = title {
            if !seen_titles.insert(title.clone()) {
                report.warning(
                    "DUPLICATE_TITLE",
                    format!("Title '{title}' appears more than once"),
                    key,
                );
            }
        }

        if let Some(ratio) = repetition_ratio(content).filter(|r| *r > REPETITION_THRESHOLD) {
            report.warning(
                "HIGH_REPETITION",
                format!("Section '{key}' repeats 3-grams heavily ({:.1}%)", ratio * 100.0),
                key,
            );
        }

        if outline.as_ref().is_some_and(|o| !o.contains(key)) {
            report.warning(
                "SECTION_NOT_IN_OUTLINE",
                format!("Section '{key}' was generated but is not in the outline"),
                key,
            );
        }
    }

    if report.stats.section_count > 0 {
        let avg = report.stats.total_words as f64 / report.stats.section_count as f64;
        report.stats.avg_words_per_section = (avg * 10.0).round() / 10.0;
    }
    tracing::info!(
        document_id = %ctx.document.id,
        passed = report.passed(),
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "Quality report built"
    );

    Ok(BuildOutput::data(serde_json::to_value(&report)?)
        .with_meta("passed", json!(report.passed()))
        .with_meta("error_count", json!(report.errors.len()))
        .with_meta("warning_count", json!(report.warnings.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repetition_ratio() {
        assert_eq!(repetition_ratio("too short"), None);
        let varied = "one two three four five six seven eight nine ten eleven twelve thirteen";
        assert_eq!(repetition_ratio(varied), Some(0.0));

        let looped = "cache the result ".repeat(10);
        assert!(repetition_ratio(&looped).unwrap() > REPETITION_THRESHOLD);
    }

    #[test]
    fn test_report_passes_without_errors() {
        let mut report = QualityReport::default();
        assert!(report.passed());
        report.warning("SECTION_TOO_SHORT", "short".to_string(), "intro");
        assert!(report.passed());
        report.error("MISSING_SECTION", "missing".to_string(), Some("theory"));
        assert!(!report.passed());
        assert_eq!(report.codes(), vec!["MISSING_SECTION", "SECTION_TOO_SHORT"]);
    }
}
