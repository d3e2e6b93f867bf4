//! Text helpers shared by the budgeter and the step builders.

/// Truncates `text` to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Counts whitespace-separated words.
#[must_use]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of characters (not bytes).
#[must_use]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
