//! Step and section specifications.

use crate::errors::DraftflowError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Optional pipeline stages a profile can switch on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFlag {
    /// Fact enrichment of generated sections.
    Enrichment,
    /// Style editing of generated sections.
    Editing,
    /// Reference list generation.
    Literature,
}

impl fmt::Display for StageFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enrichment => write!(f, "enrichment"),
            Self::Editing => write!(f, "editing"),
            Self::Literature => write!(f, "literature"),
        }
    }
}

/// Static description of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step key, e.g. `outline` or `section:intro`.
    pub key: String,
    /// Steps whose artifacts must exist first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Expected output size in words, when the step produces prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size_range: Option<(usize, usize)>,
    /// Stage toggle the step is gated on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_flag: Option<StageFlag>,
}

impl StepSpec {
    /// Creates a step with no dependencies.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            depends_on: Vec::new(),
            target_size_range: None,
            required_flag: None,
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the expected output size.
    #[must_use]
    pub fn with_target_size(mut self, range: (usize, usize)) -> Self {
        self.target_size_range = Some(range);
        self
    }

    /// Gates the step on a stage toggle.
    #[must_use]
    pub fn requires(mut self, flag: StageFlag) -> Self {
        self.required_flag = Some(flag);
        self
    }
}

/// How much of the outline a section's request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineMode {
    /// The whole outline as JSON.
    #[default]
    Full,
    /// Title and numbered section list.
    Structure,
    /// The current section and its neighbours with their points.
    Local,
}

/// Register of the generated prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingStyle {
    /// Formal academic register.
    #[default]
    Academic,
    /// Concise business register.
    Business,
}

/// Description of one document section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Section key.
    pub key: String,
    /// Display title.
    pub title: String,
    /// Position in the document.
    pub order: u32,
    /// Sections that must be generated first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Length target in words before profile scaling.
    pub target_words: (usize, usize),
    /// Fact tags this section draws on.
    #[serde(default)]
    pub fact_tags: Vec<String>,
    /// Fact key paths this section draws on.
    #[serde(default)]
    pub fact_keys: Vec<String>,
    /// Outline excerpt mode.
    #[serde(default)]
    pub outline_mode: OutlineMode,
    /// Whether summaries of earlier sections are included.
    #[serde(default)]
    pub needs_summaries: bool,
    /// Writing style.
    #[serde(default)]
    pub style: WritingStyle,
    /// Static instructions for the section.
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl SectionSpec {
    /// Creates a section with default length and no facts.
    #[must_use]
    pub fn new(key: impl Into<String>, title: impl Into<String>, order: u32) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            order,
            depends_on: Vec::new(),
            target_words: (500, 1500),
            fact_tags: Vec::new(),
            fact_keys: Vec::new(),
            outline_mode: OutlineMode::Full,
            needs_summaries: true,
            style: WritingStyle::Academic,
            constraints: Vec::new(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the word target.
    #[must_use]
    pub fn with_target_words(mut self, min: usize, max: usize) -> Self {
        self.target_words = (min, max);
        self
    }

    /// Sets the fact tags.
    #[must_use]
    pub fn with_fact_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fact_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the fact keys.
    #[must_use]
    pub fn with_fact_keys(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fact_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the outline mode.
    #[must_use]
    pub fn with_outline_mode(mut self, mode: OutlineMode) -> Self {
        self.outline_mode = mode;
        self
    }

    /// Sets whether earlier summaries are included.
    #[must_use]
    pub fn with_summaries(mut self, needs_summaries: bool) -> Self {
        self.needs_summaries = needs_summaries;
        self
    }

    /// Sets the writing style.
    #[must_use]
    pub fn with_style(mut self, style: WritingStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets the constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    /// Step key of the section's text step.
    #[must_use]
    pub fn step_key(&self) -> String {
        format!("section:{}", self.key)
    }

    /// The section as a pipeline step.
    #[must_use]
    pub fn to_step_spec(&self) -> StepSpec {
        let mut deps = vec!["outline".to_string()];
        deps.extend(self.depends_on.iter().map(|d| format!("section:{d}")));
        StepSpec::new(self.step_key())
            .with_dependencies(deps)
            .with_target_size(self.target_words)
    }
}

/// The sections a document is made of, in order.
///
/// Built once at startup and shared by reference; there is no global
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRegistry {
    sections: Vec<SectionSpec>,
}

impl Default for SectionRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

impl SectionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// The standard seven-section technical report.
    #[must_use]
    pub fn defaults() -> Self {
        let sections = vec![
            SectionSpec::new("intro", "Introduction", 1)
                .with_target_words(400, 800)
                .with_fact_tags(["project_name", "description", "tech_stack", "purpose"])
                .with_summaries(false)
                .with_constraints(["Avoid implementation details", "Justify the relevance of the topic"]),
            SectionSpec::new("theory", "Theoretical Background", 2)
                .with_dependencies(["intro"])
                .with_target_words(800, 1500)
                .with_fact_tags(["tech_stack", "frameworks", "architecture"])
                .with_outline_mode(OutlineMode::Structure)
                .with_constraints(["Describe the theory behind the technologies used"]),
            SectionSpec::new("analysis", "Domain Analysis", 3)
                .with_dependencies(["theory"])
                .with_target_words(600, 1200)
                .with_fact_tags(["modules", "models", "dependencies"])
                .with_outline_mode(OutlineMode::Structure)
                .with_constraints(["Analyse the requirements", "Describe the business logic"]),
            SectionSpec::new("architecture", "System Architecture", 4)
                .with_dependencies(["analysis"])
                .with_target_words(800, 1500)
                .with_fact_tags(["architecture", "modules", "layers", "storage", "queue", "infra"])
                .with_outline_mode(OutlineMode::Structure)
                .with_constraints(["Describe the system components", "Show how modules interact"]),
            SectionSpec::new("implementation", "Implementation", 5)
                .with_dependencies(["architecture"])
                .with_target_words(1000, 2000)
                .with_fact_tags(["api", "endpoints", "models", "modules"])
                .with_fact_keys(["api.endpoints", "models"])
                .with_outline_mode(OutlineMode::Local)
                .with_constraints(["Describe the key algorithms", "Include code examples"]),
            SectionSpec::new("testing", "Testing", 6)
                .with_dependencies(["implementation"])
                .with_target_words(400, 800)
                .with_fact_tags(["testing", "quality"])
                .with_outline_mode(OutlineMode::Local)
                .with_constraints(["Describe the testing strategy", "Present the results"]),
            SectionSpec::new("conclusion", "Conclusion", 7)
                .with_dependencies(["testing"])
                .with_target_words(300, 600)
                .with_fact_tags(["project_name", "purpose"])
                .with_summaries(false)
                .with_constraints(["Summarise the work", "Outline future development"]),
        ];
        Self { sections }
    }

    /// Adds a section, replacing any section with the same key.
    #[must_use]
    pub fn with_section(mut self, spec: SectionSpec) -> Self {
        self.sections.retain(|s| s.key != spec.key);
        self.sections.push(spec);
        self.sections.sort_by_key(|s| s.order);
        self
    }

    /// Looks a section up by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Like [`get`](Self::get), failing with `UnknownSection`.
    pub fn require(&self, key: &str) -> Result<&SectionSpec, DraftflowError> {
        self.get(key)
            .ok_or_else(|| DraftflowError::UnknownSection(key.to_string()))
    }

    /// Sections in document order.
    #[must_use]
    pub fn ordered(&self) -> &[SectionSpec] {
        &self.sections
    }

    /// Section keys in document order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.key.as_str()).collect()
    }

    /// Number of sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns true when there are no sections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Checks that keys are unique and every dependency names an earlier
    /// section.
    pub fn validate(&self) -> Result<(), DraftflowError> {
        if self.sections.is_empty() {
            return Err(DraftflowError::validation("Section registry is empty"));
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for section in &self.sections {
            if section.key.trim().is_empty() || section.key.contains(':') {
                return Err(DraftflowError::validation(format!(
                    "Invalid section key '{}'",
                    section.key
                )));
            }
            for dep in &section.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(DraftflowError::validation(format!(
                        "Section '{}' depends on '{}', which does not precede it",
                        section.key, dep
                    )));
                }
            }
            if !seen.insert(section.key.as_str()) {
                return Err(DraftflowError::validation(format!(
                    "Duplicate section key '{}'",
                    section.key
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_and_ordered() {
        let registry = SectionRegistry::defaults();
        assert!(registry.validate().is_ok());
        assert_eq!(
            registry.keys(),
            vec!["intro", "theory", "analysis", "architecture", "implementation", "testing", "conclusion"]
        );
        assert_eq!(registry.get("implementation").unwrap().outline_mode, OutlineMode::Local);
        assert!(!registry.get("intro").unwrap().needs_summaries);
    }

    #[test]
    fn test_with_section_replaces_and_sorts() {
        let registry = SectionRegistry::empty()
            .with_section(SectionSpec::new("b", "B", 2))
            .with_section(SectionSpec::new("a", "A", 1))
            .with_section(SectionSpec::new("b", "B2", 2));
        assert_eq!(registry.keys(), vec!["a", "b"]);
        assert_eq!(registry.get("b").unwrap().title, "B2");
    }

    #[test]
    fn test_validate_rejects_forward_dependency() {
        let registry = SectionRegistry::empty()
            .with_section(SectionSpec::new("a", "A", 1).with_dependencies(["b"]))
            .with_section(SectionSpec::new("b", "B", 2));
        assert!(registry.validate().is_err());
        assert!(SectionRegistry::empty().validate().is_err());
    }

    #[test]
    fn test_require_unknown_section() {
        let err = SectionRegistry::defaults().require("appendix").unwrap_err();
        assert_eq!(err.error_type(), "UnknownSection");
    }

    #[test]
    fn test_section_step_spec() {
        let spec = SectionRegistry::defaults().get("theory").cloned().unwrap();
        let step = spec.to_step_spec();
        assert_eq!(step.key, "section:theory");
        assert_eq!(step.depends_on, vec!["outline", "section:intro"]);
        assert_eq!(step.target_size_range, Some((800, 1500)));
        assert_eq!(step.required_flag, None);
    }
}
