//! Token estimation for response accounting.

/// Estimates tokens with the 4-chars-per-token heuristic, rounding up.
///
/// Counts `char`s rather than bytes so non-ASCII text is not overcounted.
///
/// # Examples
///
/// ```
/// use editlens_extract::estimate_tokens;
///
/// assert_eq!(estimate_tokens("score"), 2);
/// assert_eq!(estimate_tokens("{\"score\": 1}"), 3);
/// ```
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
        assert_eq!(estimate_tokens("音量を上げる"), 2);
    }
}
