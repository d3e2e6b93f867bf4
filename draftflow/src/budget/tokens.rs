//! Heuristic token estimation.
//!
//! Not a tokenizer: the estimate divides the character count by a divisor
//! chosen from the share of Cyrillic characters in the text, since such
//! scripts tokenize more densely than Latin text.

use super::BudgetConfig;
use crate::utils::char_len;

/// Marker appended to text cut by [`TokenEstimator::trim_to_budget`].
pub const TRIM_MARKER: &str = "\n[...]";

/// Minimum position (as a share of the cut) at which a newline is preferred
/// as the cut point.
const NEWLINE_CUT_FLOOR: f64 = 0.7;

/// Character-ratio based token estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    cyrillic_divisor: f64,
    latin_divisor: f64,
    script_ratio_threshold: f64,
    messages_overhead: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}

impl TokenEstimator {
    /// Builds an estimator from budget settings.
    #[must_use]
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            cyrillic_divisor: config.cyrillic_divisor,
            latin_divisor: config.latin_divisor,
            script_ratio_threshold: config.script_ratio_threshold,
            messages_overhead: config.messages_overhead,
        }
    }

    /// Share of Cyrillic characters in `text`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cyrillic_ratio(text: &str) -> f64 {
        let mut total = 0usize;
        let mut cyrillic = 0usize;
        for c in text.chars() {
            total += 1;
            if matches!(c, '\u{0400}'..='\u{04FF}') {
                cyrillic += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        cyrillic as f64 / total as f64
    }

    /// Characters per token for `text`.
    #[must_use]
    pub fn divisor_for(&self, text: &str) -> f64 {
        if Self::cyrillic_ratio(text) > self.script_ratio_threshold {
            self.cyrillic_divisor
        } else {
            self.latin_divisor
        }
    }

    /// Estimated tokens of a single text.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn estimate_text(&self, text: &str) -> usize {
        let len = char_len(text);
        if len == 0 {
            return 0;
        }
        (len as f64 / self.divisor_for(text) + 0.5) as usize
    }

    /// Estimated tokens of a system/user message pair, including the
    /// per-request framing overhead.
    #[must_use]
    pub fn estimate_messages(&self, system: &str, user: &str) -> usize {
        self.estimate_text(system) + self.estimate_text(user) + self.messages_overhead
    }

    /// Cuts `text` to roughly `max_tokens`, preferring a newline boundary in
    /// the last 30% of the cut. Text already within budget is returned as is.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn trim_to_budget(&self, text: &str, max_tokens: usize) -> String {
        if self.estimate_text(text) <= max_tokens {
            return text.to_string();
        }
        let target_chars = (max_tokens as f64 * self.divisor_for(text)) as usize;
        let cut: String = text.chars().take(target_chars).collect();

        let floor = (char_len(&cut) as f64 * NEWLINE_CUT_FLOOR) as usize;
        let cut = match cut.rfind('\n') {
            Some(pos) if char_len(&cut[..pos]) > floor => cut[..pos].to_string(),
            _ => cut,
        };
        format!("{cut}{TRIM_MARKER}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_estimate() {
        let estimator = TokenEstimator::default();
        assert_eq!(estimator.estimate_text(""), 0);
        assert_eq!(estimator.estimate_text("abcd"), 1);
        assert_eq!(estimator.estimate_text("abcdef"), 2);
        assert_eq!(estimator.estimate_text(&"a".repeat(400)), 100);
    }

    #[test]
    fn test_cyrillic_text_uses_denser_divisor() {
        let estimator = TokenEstimator::default();
        let text = "п".repeat(350);
        assert!(TokenEstimator::cyrillic_ratio(&text) > 0.99);
        assert_eq!(estimator.estimate_text(&text), 100);

        let mixed = format!("{}{}", "a".repeat(80), "п".repeat(20));
        assert!((estimator.divisor_for(&mixed) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_messages_overhead() {
        let estimator = TokenEstimator::default();
        assert_eq!(estimator.estimate_messages("abcd", "abcd"), 12);
    }

    #[test]
    fn test_trim_within_budget_is_unchanged() {
        let estimator = TokenEstimator::default();
        assert_eq!(estimator.trim_to_budget("short text", 100), "short text");
    }

    #[test]
    fn test_trim_prefers_late_newline() {
        let estimator = TokenEstimator::default();
        let text = format!("{}\n{}", "a".repeat(90), "b".repeat(200));
        let trimmed = estimator.trim_to_budget(&text, 25);
        assert_eq!(trimmed, format!("{}{TRIM_MARKER}", "a".repeat(90)));
    }

    #[test]
    fn test_trim_ignores_early_newline() {
        let estimator = TokenEstimator::default();
        let text = format!("{}\n{}", "a".repeat(10), "b".repeat(200));
        let trimmed = estimator.trim_to_budget(&text, 25);
        assert_eq!(char_len(&trimmed), 100 + TRIM_MARKER.len());
        assert!(trimmed.ends_with(TRIM_MARKER));
    }
}
