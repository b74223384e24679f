//! Prompt templates for the model-backed extraction and relation strategies.
//!
//! Templates use plain `format!()` interpolation so a missing variable is a
//! compile error.

/// Prompt asking the model to extract entities, concepts, topics and
/// candidate claims from one memory entry.
///
/// # Example
/// ```
/// use rmc::llm::prompts::entity_extraction_prompt;
///
/// let prompt = entity_extraction_prompt("Redis latency doubled after the 7.2 upgrade");
/// assert!(prompt.contains("Redis latency"));
/// assert!(prompt.contains("\"entities\""));
/// ```
pub fn entity_extraction_prompt(content: &str) -> String {
    format!(
        r#"Extract structured information from the memory entry below.

Return a JSON object with these fields:
- "entities": array of {{"name": string, "type": string}} where type is one of
  person, organization, technology, product, metric, currency, percentage,
  number, date, version, proper_noun
- "concepts": array of short lowercase noun phrases the entry is about
- "topics": array of broad subject areas (e.g. "performance", "finance", "security")
- "claims": array of {{"key": string, "value": string}} for facts stated as
  "<subject attribute> is <value>"; keys are lowercase snake_case

Only include what the text states. Use empty arrays when nothing applies.

Memory entry:
{content}

Respond with valid JSON only. Example format:
{{
  "entities": [{{"name": "Redis", "type": "technology"}}, {{"name": "7.2", "type": "version"}}],
  "concepts": ["latency", "upgrade"],
  "topics": ["performance"],
  "claims": []
}}"#
    )
}

/// Prompt asking the model to classify how a new entry relates to each
/// candidate. `flagged` names a candidate the lexical contradiction check
/// already considers contradictory, so the model must confirm or override it.
///
/// # Example
/// ```
/// use rmc::llm::prompts::relation_classification_prompt;
///
/// let candidates = vec![("e1", "The API p99 latency is 120ms")];
/// let prompt = relation_classification_prompt("Latency dropped after caching", &candidates, None);
/// assert!(prompt.contains("[ID: e1]"));
/// ```
pub fn relation_classification_prompt(
    new_content: &str,
    candidates: &[(&str, &str)],
    flagged: Option<&str>,
) -> String {
    let candidate_list = candidates
        .iter()
        .map(|(id, content)| format!("[ID: {id}] {content}"))
        .collect::<Vec<_>>()
        .join("\n");

    let flag_section = match flagged {
        Some(id) => format!(
            "\nA lexical check flagged a likely contradiction between the new entry and [ID: {id}].\n\
             Confirm it with relation_type \"CONTRADICTS\" or override it with another type.\n"
        ),
        None => String::new(),
    };

    format!(
        r#"Classify the relationship between a new memory entry and each candidate entry.

Relation types (direction is always from "source" to "target"):
- CAUSES: one entry describes the cause of the other
- IMPACTS: one entry describes something that affects the other
- CONTRADICTS: the entries cannot both be true
- SUPPORTS: one entry provides evidence for the other
- RELATES_TO: same subject, no stronger relation
- NONE: unrelated
{flag_section}
Candidate entries:
{candidate_list}

New entry [ID: new]:
{new_content}

Respond with valid JSON only: an array with one object per related candidate.
Each object has "candidate_id", "relation_type", "direction" ("new_to_candidate"
or "candidate_to_new"), "strength" (0.0-1.0) and "reason".

Example format:
[
  {{"candidate_id": "e1", "relation_type": "CAUSES", "direction": "candidate_to_new", "strength": 0.8, "reason": "The cache change explains the latency drop"}}
]"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_prompt_lists_entity_types() {
        let prompt = entity_extraction_prompt("Alice moved the billing service to Postgres");
        assert!(prompt.contains("Alice moved the billing service"));
        assert!(prompt.contains("proper_noun"));
        assert!(prompt.contains("\"claims\""));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn test_relation_prompt_with_flag() {
        let candidates = vec![("e1", "The cache is enabled"), ("e2", "Deploys happen on Fridays")];
        let prompt = relation_classification_prompt("The cache is disabled", &candidates, Some("e1"));

        assert!(prompt.contains("[ID: e1] The cache is enabled"));
        assert!(prompt.contains("[ID: e2]"));
        assert!(prompt.contains("flagged a likely contradiction between the new entry and [ID: e1]"));
        assert!(prompt.contains("candidate_to_new"));
    }

    #[test]
    fn test_relation_prompt_without_flag() {
        let prompt = relation_classification_prompt("x", &[("e1", "y")], None);
        assert!(!prompt.contains("flagged"));
        assert!(prompt.contains("RELATES_TO"));
    }
}
