//! Facts and their selection for a section.
//!
//! Facts come from an external analysis step. Only `id`, `tags`, `key_path`,
//! `text` and `details` are interpreted here; anything else in the source is
//! ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Points awarded per matched fact key.
const KEY_SCORE: f64 = 2.0;
/// Points awarded per matched tag.
const TAG_SCORE: f64 = 1.0;

/// A single fact about the subject of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Stable identifier.
    pub id: String,
    /// Topical tags, matched against a section's fact tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Dotted path in the source structure, matched against fact keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// One-line statement.
    #[serde(default)]
    pub text: String,
    /// Supporting detail, dropped first when trimming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Fact {
    /// Creates a fact with an id and text.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the key path.
    #[must_use]
    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Sets the details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Details rendered as a single line, if present and non-empty.
    #[must_use]
    pub fn details_line(&self) -> Option<String> {
        match self.details.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(a) if a.is_empty() => None,
            Value::Object(o) if o.is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

/// Why a fact was selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRef {
    /// Fact identifier.
    pub fact_id: String,
    /// First matching criterion, `key:<path>` or `tag:<tag>`.
    pub reason: String,
    /// Selection score.
    pub weight: f64,
}

/// An ordered collection of facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactSet {
    facts: Vec<Fact>,
}

impl FactSet {
    /// Creates a fact set, dropping facts without an id.
    #[must_use]
    pub fn new(facts: Vec<Fact>) -> Self {
        Self {
            facts: facts.into_iter().filter(|f| !f.id.trim().is_empty()).collect(),
        }
    }

    /// Reads facts from analysis output: either `{"facts": [...]}` or a bare
    /// array. Entries that are not objects or lack an `id` are skipped.
    #[must_use]
    pub fn from_analysis(value: &Value) -> Self {
        let items = match value {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => map
                .get("facts")
                .and_then(Value::as_array)
                .map_or(&[][..], Vec::as_slice),
            _ => &[],
        };
        let facts = items
            .iter()
            .filter_map(|item| serde_json::from_value::<Fact>(item.clone()).ok())
            .collect();
        Self::new(facts)
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true when there are no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Iterates over the facts in source order.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    /// Looks a fact up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == id)
    }

    /// Scores every fact against the given keys and tags and keeps the best
    /// `max_facts`. Facts that match nothing are never selected; equal
    /// scores keep source order.
    #[must_use]
    pub fn select(&self, fact_keys: &[String], fact_tags: &[String], max_facts: usize) -> Vec<FactRef> {
        let mut scored: Vec<FactRef> = self
            .facts
            .iter()
            .filter_map(|fact| score_fact(fact, fact_keys, fact_tags))
            .collect();
        // Stable sort keeps source order among ties.
        scored.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        scored.truncate(max_facts);
        scored
    }
}

fn score_fact(fact: &Fact, fact_keys: &[String], fact_tags: &[String]) -> Option<FactRef> {
    let mut weight = 0.0;
    let mut reason = None;

    if let Some(path) = fact.key_path.as_deref() {
        for key in fact_keys.iter().filter(|k| key_matches(path, k)) {
            weight += KEY_SCORE;
            reason.get_or_insert_with(|| format!("key:{key}"));
        }
    }
    for tag in fact_tags.iter().filter(|t| fact.tags.contains(t)) {
        weight += TAG_SCORE;
        reason.get_or_insert_with(|| format!("tag:{tag}"));
    }

    reason.map(|reason| FactRef {
        fact_id: fact.id.clone(),
        reason,
        weight,
    })
}

/// A key matches its own path and every path below it.
fn key_matches(path: &str, key: &str) -> bool {
    path == key
        || path
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('.'))
}

impl<'a> IntoIterator for &'a FactSet {
    type Item = &'a Fact;
    type IntoIter = std::slice::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.facts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn facts() -> FactSet {
        FactSet::new(vec![
            Fact::new("f1", "Uses PostgreSQL").with_tags(["storage"]),
            Fact::new("f2", "REST API").with_tags(["api", "modules"]).with_key_path("api.endpoints"),
            Fact::new("f3", "Written in Rust").with_tags(["tech_stack"]),
            Fact::new("f4", "Has a worker queue").with_tags(["queue", "storage"]),
        ])
    }

    #[test]
    fn test_from_analysis_accepts_both_shapes() {
        let wrapped = json!({"facts": [{"id": "a", "text": "x", "tags": ["t"]}, {"text": "no id"}]});
        let bare = json!([{"id": "a", "text": "x"}, 42]);

        assert_eq!(FactSet::from_analysis(&wrapped).len(), 1);
        assert_eq!(FactSet::from_analysis(&bare).len(), 1);
        assert!(FactSet::from_analysis(&json!("nope")).is_empty());
    }

    #[test]
    fn test_select_scores_keys_above_tags() {
        let selected = facts().select(&strings(&["api"]), &strings(&["storage", "queue"]), 10);
        let ids: Vec<&str> = selected.iter().map(|r| r.fact_id.as_str()).collect();

        // f4 matches two tags (2.0), f2 one key (2.0), f1 one tag (1.0).
        assert_eq!(ids, vec!["f2", "f4", "f1"]);
        assert_eq!(selected[0].reason, "key:api");
        assert_eq!(selected[1].reason, "tag:storage");
        assert!((selected[2].weight - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_select_respects_max_facts() {
        let selected = facts().select(&[], &strings(&["storage", "tech_stack", "api"]), 2);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_select_skips_unmatched() {
        assert!(facts().select(&[], &strings(&["unknown"]), 10).is_empty());
    }

    #[test]
    fn test_key_prefix_match() {
        assert!(key_matches("api.endpoints", "api"));
        assert!(key_matches("api", "api"));
        assert!(!key_matches("apis", "api"));
    }

    #[test]
    fn test_details_line() {
        let fact = Fact::new("f", "t").with_details(json!({"port": 8080}));
        assert_eq!(fact.details_line().as_deref(), Some(r#"{"port":8080}"#));
        assert_eq!(Fact::new("f", "t").with_details(json!("")).details_line(), None);
    }
}
