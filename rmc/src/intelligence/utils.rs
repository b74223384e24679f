use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Function words ignored when comparing statements.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "by", "for", "from", "has", "have",
    "in", "into", "is", "it", "its", "of", "on", "or", "our", "that", "the", "their", "this",
    "to", "was", "we", "were", "which", "with",
];

/// Lowercased words of `text` (Unicode word boundaries, contractions kept whole).
pub fn words(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Words that carry meaning: no stopwords, no single characters.
pub fn content_words(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Jaccard overlap of two word lists, in [0, 1]. Two empty lists are identical.
pub fn overlap_score(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Like [`overlap_score`] but words match when one is a prefix of the other
/// (at least 3 chars), so "like"/"likes" and "deploy"/"deployed" agree.
pub fn fuzzy_overlap_score(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let matched_a = a
        .iter()
        .filter(|wa| b.iter().any(|wb| fuzzy_word_match(wa, wb)))
        .count();
    let matched_b = b
        .iter()
        .filter(|wb| a.iter().any(|wa| fuzzy_word_match(wa, wb)))
        .count();

    let total_unique = a.len() + b.len() - matched_a.min(matched_b);
    matched_a.max(matched_b) as f64 / total_unique as f64
}

fn fuzzy_word_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.len().min(b.len()) < 3 {
        return false;
    }
    a.starts_with(b) || b.starts_with(a)
}

/// True when the lowercased word sequence contains `phrase` as consecutive words.
pub fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_words_keep_contractions() {
        assert_eq!(words("The cache doesn't WORK."), w(&["the", "cache", "doesn't", "work"]));
    }

    #[test]
    fn test_content_words_drop_stopwords() {
        assert_eq!(content_words("The API is slow at a peak"), w(&["api", "slow", "peak"]));
    }

    #[test]
    fn test_overlap_identical_and_disjoint() {
        let a = w(&["hello", "world"]);
        assert!((overlap_score(&a, &a) - 1.0).abs() < f64::EPSILON);
        assert_eq!(overlap_score(&a, &w(&["foo"])), 0.0);
    }

    #[test]
    fn test_fuzzy_overlap_prefix() {
        let score = fuzzy_overlap_score(&w(&["user", "likes", "python"]), &w(&["user", "like", "python"]));
        assert!(score > 0.9);
    }

    #[test]
    fn test_contains_phrase() {
        let text = words("Latency went up due to the new proxy");
        assert!(contains_phrase(&text, "due to"));
        assert!(!contains_phrase(&text, "leads to"));
        assert!(!contains_phrase(&text, ""));
    }
}
