//! Token and duration estimates.

/// Estimated prompt tokens: one per four characters, at least one.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Number of whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated spoken duration of `text` at `words_per_second`.
pub fn estimate_duration_secs(text: &str, words_per_second: f64) -> f64 {
    if words_per_second <= 0.0 {
        return 0.0;
    }
    count_words(text) as f64 / words_per_second
}
