//! Generation profiles: budgets, lengths and stage toggles per quality tier.

use super::StageFlag;
use crate::budget::{Budget, BudgetConfig};
use crate::errors::DraftflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-section token budget and sampling temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionBudget {
    /// Input token ceiling.
    pub max_input_tokens: usize,
    /// Completion token ceiling.
    pub max_output_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
}

impl SectionBudget {
    /// Creates a section budget.
    #[must_use]
    pub const fn new(max_input_tokens: usize, max_output_tokens: usize, temperature: f64) -> Self {
        Self {
            max_input_tokens,
            max_output_tokens,
            temperature,
        }
    }
}

/// Which optional stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageToggles {
    /// Run fact enrichment.
    pub enrichment: bool,
    /// Run style editing.
    pub editing: bool,
    /// Generate a reference list.
    pub literature: bool,
}

impl StageToggles {
    /// Returns true if the stage is switched on.
    #[must_use]
    pub fn enabled(&self, flag: StageFlag) -> bool {
        match flag {
            StageFlag::Enrichment => self.enrichment,
            StageFlag::Editing => self.editing,
            StageFlag::Literature => self.literature,
        }
    }
}

/// A named quality tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProfile {
    /// Profile name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Budget used unless a section override exists.
    pub budget: SectionBudget,
    /// Scale applied to section word targets.
    pub target_words_multiplier: f64,
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Facts selected per section.
    pub max_facts: usize,
    /// Accepted summary bullet count.
    pub summary_bullets: (usize, usize),
    /// Optional stages.
    pub toggles: StageToggles,
    /// Per-section budget overrides.
    #[serde(default)]
    pub overrides: BTreeMap<String, SectionBudget>,
}

impl GenerationProfile {
    /// Quick generation with smaller outputs and no optional stages.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            name: "fast".to_string(),
            description: "Quick generation with smaller outputs".to_string(),
            budget: SectionBudget::new(2000, 1000, 0.5),
            target_words_multiplier: 0.6,
            model: None,
            max_facts: 15,
            summary_bullets: (3, 5),
            toggles: StageToggles::default(),
            overrides: BTreeMap::new(),
        }
    }

    /// Balanced generation with enrichment and editing.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            name: "default".to_string(),
            description: "Balanced generation with standard outputs".to_string(),
            budget: SectionBudget::new(4000, 2000, 0.7),
            target_words_multiplier: 1.0,
            model: None,
            max_facts: 30,
            summary_bullets: (5, 8),
            toggles: StageToggles {
                enrichment: true,
                editing: true,
                literature: false,
            },
            overrides: BTreeMap::new(),
        }
    }

    /// Thorough generation with every optional stage.
    #[must_use]
    pub fn heavy() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert("implementation".to_string(), SectionBudget::new(8000, 4000, 0.8));
        overrides.insert("architecture".to_string(), SectionBudget::new(7000, 3500, 0.8));
        Self {
            name: "heavy".to_string(),
            description: "Thorough generation with larger outputs".to_string(),
            budget: SectionBudget::new(6000, 3000, 0.8),
            target_words_multiplier: 1.5,
            model: None,
            max_facts: 50,
            summary_bullets: (7, 10),
            toggles: StageToggles {
                enrichment: true,
                editing: true,
                literature: true,
            },
            overrides,
        }
    }

    /// Names of the built-in profiles.
    #[must_use]
    pub fn names() -> [&'static str; 3] {
        ["fast", "default", "heavy"]
    }

    /// Looks a built-in profile up by name.
    pub fn by_name(name: &str) -> Result<Self, DraftflowError> {
        match name {
            "fast" => Ok(Self::fast()),
            "default" => Ok(Self::standard()),
            "heavy" => Ok(Self::heavy()),
            other => Err(DraftflowError::UnknownProfile(other.to_string())),
        }
    }

    /// Sets the toggles.
    #[must_use]
    pub fn with_toggles(mut self, toggles: StageToggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Sets the model override.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Budget for a section, honouring overrides.
    #[must_use]
    pub fn budget_for(&self, section_key: &str) -> SectionBudget {
        self.overrides
            .get(section_key)
            .copied()
            .unwrap_or(self.budget)
    }

    /// Request budget for a section; the character ceiling comes from the
    /// engine configuration.
    #[must_use]
    pub fn request_budget(&self, section_key: &str, config: &BudgetConfig) -> Budget {
        let section = self.budget_for(section_key);
        Budget::new(
            section.max_input_tokens,
            section.max_output_tokens,
            config.soft_char_limit,
        )
    }

    /// Word target scaled by the profile multiplier.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn target_words(&self, base: (usize, usize)) -> (usize, usize) {
        let scale = |n: usize| (n as f64 * self.target_words_multiplier) as usize;
        (scale(base.0), scale(base.1))
    }

    /// Clamps a bullet list to the profile's maximum.
    #[must_use]
    pub fn clamp_bullets(&self, mut bullets: Vec<String>) -> Vec<String> {
        bullets.truncate(self.summary_bullets.1);
        bullets
    }
}

impl Default for GenerationProfile {
    fn default() -> Self {
        Self::standard()
    }
}
