//! Token estimator (§4.A).
//!
//! A pure, deterministic, O(n) approximation of an LLM's token cost for a
//! string. CJK characters count as one token each; the remaining
//! characters contribute `length / 4`, rounded up.

/// Estimate the token cost of `text`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let mut cjk_count = 0usize;
    let mut other_chars = 0usize;
    for ch in text.chars() {
        if is_cjk(ch) {
            cjk_count += 1;
        } else {
            other_chars += 1;
        }
    }
    let other_tokens = other_chars.div_ceil(4);
    cjk_count + other_tokens
}

/// Whether `ch` falls in a CJK (Chinese/Japanese/Korean) block.
fn is_cjk(ch: char) -> bool {
    let c = ch as u32;
    matches!(c,
        0x4E00..=0x9FFF    // CJK Unified Ideographs
        | 0x3400..=0x4DBF  // CJK Extension A
        | 0x3040..=0x309F  // Hiragana
        | 0x30A0..=0x30FF  // Katakana
        | 0xAC00..=0xD7A3  // Hangul Syllables
        | 0xF900..=0xFAFF  // CJK Compatibility Ideographs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn latin_divides_by_four_rounding_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn cjk_counts_one_per_char() {
        assert_eq!(estimate_tokens("你好"), 2);
        assert_eq!(estimate_tokens("こんにちは"), 5);
    }

    #[test]
    fn mixed_content_sums_both_contributions() {
        // 2 CJK chars (+2) and 4 latin chars (+1) = 3
        assert_eq!(estimate_tokens("你好abcd"), 3);
    }

    #[test]
    fn deterministic_across_calls() {
        let text = "The quick brown fox jumps over 狐狸 the lazy dog.";
        let a = estimate_tokens(text);
        let b = estimate_tokens(text);
        assert_eq!(a, b);
    }

    #[test]
    fn monotonic_in_length() {
        assert!(estimate_tokens("a".repeat(100).as_str()) <= estimate_tokens("a".repeat(200).as_str()));
    }
}
