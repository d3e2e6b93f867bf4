//! Documents and the structured payloads steps exchange.

use crate::budget::FactSet;
use crate::errors::{DraftflowError, GenerationError};
use crate::utils::generate_uuid;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// A document to generate, with everything the steps read from outside
/// the artifact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id; artifacts are owned by it.
    pub id: Uuid,
    /// Working title.
    pub title: String,
    /// Free-form description of the subject.
    #[serde(default)]
    pub topic: String,
    /// Output language tag, e.g. `en-US`.
    pub language: String,
    /// Facts from the analysis of the subject.
    #[serde(default)]
    pub facts: FactSet,
    /// Extra parameters passed to the outline prompt.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Document {
    /// Creates a document with a fresh id.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: generate_uuid(),
            title: title.into(),
            topic: String::new(),
            language: "en-US".to_string(),
            facts: FactSet::default(),
            params: Map::new(),
        }
    }

    /// Sets the topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Sets the language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the facts.
    #[must_use]
    pub fn with_facts(mut self, facts: FactSet) -> Self {
        self.facts = facts;
        self
    }

    /// Adds an outline parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// The global context layer shared by every section request.
    #[must_use]
    pub fn global_context(&self) -> String {
        let mut lines = vec![
            format!("Title: {}", self.title),
            format!("Language: {}", self.language),
        ];
        if !self.topic.trim().is_empty() {
            lines.push(format!("Topic: {}", self.topic.trim()));
        }
        lines.join("\n")
    }
}

/// One outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    /// Section key.
    pub key: String,
    /// Section title.
    pub title: String,
    /// Talking points.
    #[serde(default)]
    pub points: Vec<String>,
}

impl OutlineSection {
    /// Creates an entry without points.
    #[must_use]
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            points: Vec::new(),
        }
    }

    /// Sets the points.
    #[must_use]
    pub fn with_points(mut self, points: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.points = points.into_iter().map(Into::into).collect();
        self
    }
}

/// The document outline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Document title.
    pub title: String,
    /// Sections in order.
    pub sections: Vec<OutlineSection>,
}

impl Outline {
    /// JSON schema the outline response must satisfy.
    #[must_use]
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["title", "sections"],
            "properties": {
                "title": {"type": "string"},
                "sections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["key", "title"],
                        "properties": {
                            "key": {"type": "string"},
                            "title": {"type": "string"},
                            "points": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                }
            }
        })
    }

    /// Reads an outline from a validated response or a stored payload.
    pub fn from_value(value: &Value) -> Result<Self, DraftflowError> {
        let outline: Self = serde_json::from_value(value.clone())
            .map_err(|e| GenerationError::InvalidResponse(format!("outline: {e}")))?;
        if outline.sections.is_empty() {
            return Err(DraftflowError::validation("Outline has no sections"));
        }
        Ok(outline)
    }

    /// Looks a section up by key.
    #[must_use]
    pub fn section(&self, key: &str) -> Option<&OutlineSection> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Returns true if the outline lists the section.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.section(key).is_some()
    }
}

/// Bullet summary of one generated section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSummary {
    /// Section key.
    pub section_key: String,
    /// Summary bullets.
    pub points: Vec<String>,
}

impl SectionSummary {
    /// Creates a summary.
    #[must_use]
    pub fn new(section_key: impl Into<String>, points: Vec<String>) -> Self {
        Self {
            section_key: section_key.into(),
            points,
        }
    }

    /// Extracts bullets from a summary response: lines starting with `-`,
    /// `*` or `•`, markers stripped.
    #[must_use]
    pub fn parse(section_key: impl Into<String>, text: &str) -> Self {
        let points = text
            .lines()
            .map(str::trim)
            .filter_map(|line| {
                line.strip_prefix('-')
                    .or_else(|| line.strip_prefix('•'))
                    .or_else(|| line.strip_prefix('*'))
            })
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();
        Self::new(section_key, points)
    }
}
