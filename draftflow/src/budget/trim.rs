//! Ordered trims applied when a request exceeds its budget.

use super::layers::{format_facts, outline_headings, ContextLayers};
use super::{FactRef, FactSet, TokenEstimator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One trimming step. Steps are applied in [`TrimStep::ORDER`] until the
/// request fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimStep {
    /// Facts lose their details lines.
    FactsDetailsTrimmed,
    /// The outline excerpt keeps only headings.
    OutlineReducedToHeadings,
    /// Prior summaries are cut to a token target.
    SummariesTrimmed,
}

impl TrimStep {
    /// Application order.
    pub const ORDER: [Self; 3] = [
        Self::FactsDetailsTrimmed,
        Self::OutlineReducedToHeadings,
        Self::SummariesTrimmed,
    ];

    /// Stable name, as recorded in `trims_applied`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FactsDetailsTrimmed => "facts_details_trimmed",
            Self::OutlineReducedToHeadings => "outline_reduced_to_headings",
            Self::SummariesTrimmed => "summaries_trimmed",
        }
    }
}

impl fmt::Display for TrimStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a trim needs besides the layers themselves.
#[derive(Debug, Clone, Copy)]
pub struct TrimInputs<'a> {
    /// The full fact set.
    pub facts: &'a FactSet,
    /// Facts selected for the request.
    pub selected: &'a [FactRef],
    /// Estimator for the summaries cut.
    pub estimator: &'a TokenEstimator,
    /// Token target for summaries.
    pub summary_trim_tokens: usize,
    /// Maximum outline heading lines.
    pub outline_heading_limit: usize,
}

impl TrimStep {
    /// Applies this trim to `layers`. A layer is only replaced when the
    /// trimmed text is not longer than the current one, so no trim ever
    /// grows the request.
    pub fn apply(self, layers: &mut ContextLayers, inputs: &TrimInputs<'_>) {
        let (slot, trimmed) = match self {
            Self::FactsDetailsTrimmed => (
                &mut layers.facts,
                format_facts(inputs.facts, inputs.selected, false),
            ),
            Self::OutlineReducedToHeadings => {
                let headings = outline_headings(&layers.outline, inputs.outline_heading_limit);
                (&mut layers.outline, headings)
            }
            Self::SummariesTrimmed => {
                let cut = inputs
                    .estimator
                    .trim_to_budget(&layers.summaries, inputs.summary_trim_tokens);
                (&mut layers.summaries, cut)
            }
        };
        if trimmed.chars().count() <= slot.chars().count() {
            *slot = trimmed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::Fact;

    #[test]
    fn test_order_and_names() {
        let names: Vec<&str> = TrimStep::ORDER.iter().map(TrimStep::as_str).collect();
        assert_eq!(
            names,
            vec!["facts_details_trimmed", "outline_reduced_to_headings", "summaries_trimmed"]
        );
        assert_eq!(
            serde_json::to_value(TrimStep::SummariesTrimmed).unwrap(),
            serde_json::json!("summaries_trimmed")
        );
    }

    #[test]
    fn test_trims_never_grow_layers() {
        let facts = FactSet::new(vec![Fact::new("f1", "text").with_details(serde_json::json!("long detail"))]);
        let selected = vec![FactRef {
            fact_id: "f1".to_string(),
            reason: "tag:t".to_string(),
            weight: 1.0,
        }];
        let estimator = TokenEstimator::default();
        let inputs = TrimInputs {
            facts: &facts,
            selected: &selected,
            estimator: &estimator,
            summary_trim_tokens: 5,
            outline_heading_limit: 20,
        };

        let mut layers = ContextLayers {
            facts: "[f1] text\n  Details: long detail".to_string(),
            outline: "Title: T\n  [a] A\n    - point".to_string(),
            summaries: "x".repeat(200),
            ..ContextLayers::default()
        };
        let mut previous = layers.char_count();
        for step in TrimStep::ORDER {
            step.apply(&mut layers, &inputs);
            assert!(layers.char_count() <= previous, "{step} grew the request");
            previous = layers.char_count();
        }
        assert_eq!(layers.facts, "[f1] text");
        assert!(!layers.outline.contains("point"));
        assert!(layers.summaries.len() < 200);
    }

    #[test]
    fn test_trim_keeps_shorter_original() {
        let facts = FactSet::default();
        let estimator = TokenEstimator::default();
        let inputs = TrimInputs {
            facts: &facts,
            selected: &[],
            estimator: &estimator,
            summary_trim_tokens: 500,
            outline_heading_limit: 20,
        };
        let mut layers = ContextLayers {
            summaries: "short".to_string(),
            ..ContextLayers::default()
        };
        TrimStep::SummariesTrimmed.apply(&mut layers, &inputs);
        assert_eq!(layers.summaries, "short");
    }
}
