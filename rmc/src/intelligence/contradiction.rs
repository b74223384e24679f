use serde::{Deserialize, Serialize};

use crate::intelligence::utils::{content_words, fuzzy_overlap_score, overlap_score, words};

/// Result of a heuristic contradiction check between two statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionCheckResult {
    /// No contradiction detected
    None,
    /// Weak signal; possible but uncertain contradiction
    Unlikely,
    /// Strong signal; pattern-matched contradiction
    Likely,
}

impl std::fmt::Display for ContradictionCheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Unlikely => write!(f, "unlikely"),
            Self::Likely => write!(f, "likely"),
        }
    }
}

impl ContradictionCheckResult {
    pub fn is_likely(&self) -> bool {
        matches!(self, Self::Likely)
    }
}

const NEGATORS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "isn't", "aren't", "wasn't", "weren't", "won't",
    "can't", "cannot", "didn't", "shouldn't", "longer", "without",
];

/// Opposite word pairs, including sentiment verbs in their common forms.
const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("love", "hate"),
    ("loves", "hates"),
    ("like", "dislike"),
    ("likes", "dislikes"),
    ("likes", "hates"),
    ("enjoys", "hates"),
    ("prefers", "avoids"),
    ("always", "never"),
    ("good", "bad"),
    ("fast", "slow"),
    ("faster", "slower"),
    ("hot", "cold"),
    ("high", "low"),
    ("higher", "lower"),
    ("up", "down"),
    ("increase", "decrease"),
    ("increased", "decreased"),
    ("improved", "degraded"),
    ("success", "failure"),
    ("succeeded", "failed"),
    ("passed", "failed"),
    ("online", "offline"),
    ("available", "unavailable"),
    ("stable", "unstable"),
    ("secure", "insecure"),
    ("safe", "unsafe"),
    ("valid", "invalid"),
    ("enable", "disable"),
    ("enabled", "disabled"),
    ("active", "inactive"),
    ("open", "closed"),
    ("true", "false"),
    ("start", "stop"),
    ("started", "stopped"),
    ("accept", "reject"),
    ("accepted", "rejected"),
    ("allow", "block"),
    ("allowed", "blocked"),
    ("light", "dark"),
];

const PIVOTS: &[&str] = &["is", "are", "was", "were"];

/// Lexical contradiction detector: negation, antonym swaps and value swaps.
///
/// Pure string heuristics with no model or I/O, so it is cheap enough to run
/// on every write and for every relation candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContradictionDetector;

impl ContradictionDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn check_contradiction(&self, existing: &str, new: &str) -> ContradictionCheckResult {
        let existing_words = words(&existing.replace('\u{2019}', "'"));
        let new_words = words(&new.replace('\u{2019}', "'"));

        if existing_words == new_words {
            return ContradictionCheckResult::None;
        }

        if let Some(result) = check_negation(&existing_words, &new_words) {
            return result;
        }
        if let Some(result) = check_antonyms(&existing_words, &new_words) {
            return result;
        }
        if let Some(result) = check_value_swap(&existing_words, &new_words) {
            return result;
        }

        ContradictionCheckResult::None
    }
}

fn has_negation(words: &[String]) -> bool {
    words.iter().any(|w| NEGATORS.contains(&w.as_str()))
}

fn without(words: &[String], drop: &[&str]) -> Vec<String> {
    content_words(&words.join(" "))
        .into_iter()
        .filter(|w| !drop.contains(&w.as_str()) && !NEGATORS.contains(&w.as_str()))
        .collect()
}

/// "The cache is enabled" vs "The cache is not enabled".
fn check_negation(existing: &[String], new: &[String]) -> Option<ContradictionCheckResult> {
    if has_negation(existing) == has_negation(new) {
        return None;
    }
    let existing_rest = without(existing, &[]);
    let new_rest = without(new, &[]);
    if existing_rest.is_empty() || new_rest.is_empty() {
        return None;
    }
    (fuzzy_overlap_score(&existing_rest, &new_rest) >= 0.6).then_some(ContradictionCheckResult::Likely)
}

/// "Latency increased" vs "Latency decreased".
fn check_antonyms(existing: &[String], new: &[String]) -> Option<ContradictionCheckResult> {
    let has = |words: &[String], w: &str| words.iter().any(|x| x == w);

    for &(a, b) in ANTONYM_PAIRS {
        let crossed = (has(existing, a) && has(new, b) && !has(existing, b) && !has(new, a))
            || (has(existing, b) && has(new, a) && !has(existing, a) && !has(new, b));
        if !crossed {
            continue;
        }

        let existing_rest = without(existing, &[a, b]);
        let new_rest = without(new, &[a, b]);
        let overlap = fuzzy_overlap_score(&existing_rest, &new_rest);
        if existing_rest.is_empty() && new_rest.is_empty() {
            continue;
        }
        if overlap > 0.5 {
            return Some(ContradictionCheckResult::Likely);
        }
        if overlap > 0.3 {
            return Some(ContradictionCheckResult::Unlikely);
        }
    }
    None
}

/// "The auth method is JWT" vs "The auth method is OAuth".
fn check_value_swap(existing: &[String], new: &[String]) -> Option<ContradictionCheckResult> {
    let split = |words: &[String]| -> Option<(Vec<String>, Vec<String>)> {
        let pos = words.iter().position(|w| PIVOTS.contains(&w.as_str()))?;
        Some((without(&words[..pos], &[]), words[pos + 1..].to_vec()))
    };

    let (existing_subject, existing_value) = split(existing)?;
    let (new_subject, new_value) = split(new)?;

    if existing_subject.is_empty()
        || existing_value.is_empty()
        || new_value.is_empty()
        || overlap_score(&existing_subject, &new_subject) <= 0.7
        || existing_value == new_value
        || is_subset(&existing_value, &new_value)
        || is_subset(&new_value, &existing_value)
    {
        return None;
    }

    Some(ContradictionCheckResult::Unlikely)
}

/// Every word of `subset` appears in `superset`; an extension, not a contradiction.
fn is_subset(subset: &[String], superset: &[String]) -> bool {
    subset.iter().all(|w| superset.contains(w))
}
