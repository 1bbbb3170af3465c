// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Word-count token estimation for callers without provider-reported usage.

/// Average tokens per whitespace-separated word for English prose.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Estimate the token count of `text` as `floor(words * 1.3)`.
///
/// This is a coarse heuristic. Prefer the usage block returned by the
/// provider whenever one is available.
pub fn estimate_tokens(text: &str) -> i64 {
    let words = text.split_whitespace().count();
    (words as f64 * TOKENS_PER_WORD) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   \n\t"), 0);
    }

    #[test]
    fn ten_words_estimate_thirteen_tokens() {
        let text = "one two three four five six seven eight nine ten";
        assert_eq!(estimate_tokens(text), 13);
    }

    #[test]
    fn estimate_truncates_fraction() {
        // 3 * 1.3 = 3.9
        assert_eq!(estimate_tokens("what is 2+2"), 3);
    }
}
