//! Per-model pricing and cost estimates.

use crate::config::DEFAULT_MODEL;

/// USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Prompt token price.
    pub input: f64,
    /// Completion token price.
    pub output: f64,
}

const PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o-mini", ModelPricing { input: 0.000_15, output: 0.000_6 }),
    ("gpt-4o", ModelPricing { input: 0.005, output: 0.015 }),
    ("gpt-4-turbo", ModelPricing { input: 0.01, output: 0.03 }),
    ("gpt-4", ModelPricing { input: 0.03, output: 0.06 }),
    ("gpt-3.5-turbo", ModelPricing { input: 0.000_5, output: 0.001_5 }),
];

/// Pricing for `model`, falling back to the default model's prices.
#[must_use]
pub fn pricing_for(model: &str) -> ModelPricing {
    let lookup = |name: &str| PRICING.iter().find(|(m, _)| *m == name).map(|(_, p)| *p);
    lookup(model)
        .or_else(|| lookup(DEFAULT_MODEL))
        .unwrap_or(ModelPricing { input: 0.0, output: 0.0 })
}

/// Estimated cost of a call in USD, rounded to 6 decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let pricing = pricing_for(model);
    let cost = (prompt_tokens as f64 / 1000.0) * pricing.input
        + (completion_tokens as f64 / 1000.0) * pricing.output;
    (cost * 1_000_000.0).round() / 1_000_000.0
}
