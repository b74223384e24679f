use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{ExtractionConfig, StrategyKind};
use crate::error::RmcError;
use crate::llm::{prompts, LlmProvider};
use crate::models::EntityType::{Metric, Organization, Technology};
use crate::models::{CandidateClaim, Entity, EntityType, ExtractionResult};

/// Derives entities, concepts, topics and candidate claims from raw text.
///
/// Extraction never fails: empty or unparseable input yields an empty result.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, content: &str) -> ExtractionResult;

    /// Results are in input order.
    async fn extract_batch(&self, contents: &[String]) -> Vec<ExtractionResult> {
        futures::future::join_all(contents.iter().map(|content| self.extract(content))).await
    }
}

/// Picks the extraction strategy named by configuration. The model strategy
/// still degrades to rules when the LLM is unavailable.
pub fn build_extractor(config: &ExtractionConfig, llm: &LlmProvider) -> Arc<dyn EntityExtractor> {
    match config.strategy {
        StrategyKind::Model => Arc::new(ModelExtractor::new(llm.clone())),
        StrategyKind::Rule => Arc::new(RuleBasedExtractor::new()),
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static CURRENCY_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£¥]\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:[kKmMbB]n?|million|billion|thousand))?\b")
        .expect("Invalid regex")
});

static CURRENCY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:USD|EUR|GBP|JPY)\s?\d[\d,]*(?:\.\d+)?\b|\b\d[\d,]*(?:\.\d+)?\s?(?:USD|EUR|GBP|JPY|dollars|euros|pounds)\b",
    )
    .expect("Invalid regex")
});

static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\s?(?:%|(?i:percent)\b)").expect("Invalid regex"));

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d{4}-\d{2}-\d{2}\b|\bQ[1-4]\s?\d{4}\b|\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2}(?:,\s*\d{4})?\b",
    )
    .expect("Invalid regex")
});

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bv\d+(?:\.\d+)*\b|\b\d+\.\d+\.\d+(?:\.\d+)*\b").expect("Invalid regex")
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d[\d,]*(?:\.\d+)?(?:\s?(?i:ms|sec|secs|seconds|minutes|mins|hours|hrs|days|weeks|gb|mb|kb|tb|rps|qps|s|x|k))?\b",
    )
    .expect("Invalid regex")
});

static ACRONYM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9]{1,}\b").expect("Invalid regex"));

static CAPITALIZED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][A-Za-z0-9]*(?:['\-][A-Za-z0-9]+)*(?:[ \t]+[A-Z][A-Za-z0-9]*(?:['\-][A-Za-z0-9]+)*)*")
        .expect("Invalid regex")
});

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?;](?:\s+|$)|\n+").expect("Invalid regex"));

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

struct Term {
    term: &'static str,
    canonical: &'static str,
    entity_type: Option<EntityType>,
    topic: &'static str,
}

const fn term(
    term: &'static str,
    canonical: &'static str,
    entity_type: Option<EntityType>,
    topic: &'static str,
) -> Term {
    Term {
        term,
        canonical,
        entity_type,
        topic,
    }
}

const VOCABULARY: &[Term] = &[
    // security
    term("auth", "auth", None, "security"),
    term("authentication", "authentication", None, "security"),
    term("authorization", "authorization", None, "security"),
    term("jwt", "jwt", Some(Technology), "security"),
    term("oauth", "oauth", Some(Technology), "security"),
    term("sso", "sso", Some(Technology), "security"),
    term("tls", "tls", Some(Technology), "security"),
    term("token", "token", None, "security"),
    term("tokens", "token", None, "security"),
    term("encryption", "encryption", None, "security"),
    term("vulnerability", "vulnerability", None, "security"),
    term("password", "password", None, "security"),
    term("passwords", "password", None, "security"),
    term("credentials", "credentials", None, "security"),
    term("firewall", "firewall", None, "security"),
    term("permissions", "permissions", None, "security"),
    // infrastructure
    term("kubernetes", "kubernetes", Some(Technology), "infrastructure"),
    term("docker", "docker", Some(Technology), "infrastructure"),
    term("redis", "redis", Some(Technology), "infrastructure"),
    term("nginx", "nginx", Some(Technology), "infrastructure"),
    term("terraform", "terraform", Some(Technology), "infrastructure"),
    term("aws", "aws", Some(Organization), "infrastructure"),
    term("gcp", "gcp", Some(Organization), "infrastructure"),
    term("azure", "azure", Some(Organization), "infrastructure"),
    term("cache", "cache", None, "infrastructure"),
    term("caching", "cache", None, "infrastructure"),
    term("proxy", "proxy", None, "infrastructure"),
    term("load balancer", "load balancer", None, "infrastructure"),
    term("deploy", "deploy", None, "infrastructure"),
    term("deploys", "deploy", None, "infrastructure"),
    term("deployment", "deploy", None, "infrastructure"),
    term("cluster", "cluster", None, "infrastructure"),
    term("server", "server", None, "infrastructure"),
    term("servers", "server", None, "infrastructure"),
    term("network", "network", None, "infrastructure"),
    term("cdn", "cdn", Some(Technology), "infrastructure"),
    term("dns", "dns", Some(Technology), "infrastructure"),
    // data
    term("postgres", "postgres", Some(Technology), "data"),
    term("postgresql", "postgres", Some(Technology), "data"),
    term("mysql", "mysql", Some(Technology), "data"),
    term("sqlite", "sqlite", Some(Technology), "data"),
    term("mongodb", "mongodb", Some(Technology), "data"),
    term("kafka", "kafka", Some(Technology), "data"),
    term("database", "database", None, "data"),
    term("databases", "database", None, "data"),
    term("schema", "schema", None, "data"),
    term("migration", "migration", None, "data"),
    term("query", "query", None, "data"),
    term("queries", "query", None, "data"),
    term("index", "index", None, "data"),
    term("replication", "replication", None, "data"),
    term("backup", "backup", None, "data"),
    term("pipeline", "pipeline", None, "data"),
    // performance
    term("latency", "latency", Some(Metric), "performance"),
    term("throughput", "throughput", Some(Metric), "performance"),
    term("p50", "p50", Some(Metric), "performance"),
    term("p95", "p95", Some(Metric), "performance"),
    term("p99", "p99", Some(Metric), "performance"),
    term("error rate", "error rate", Some(Metric), "performance"),
    term("response time", "response time", Some(Metric), "performance"),
    term("uptime", "uptime", Some(Metric), "performance"),
    term("cpu", "cpu", Some(Metric), "performance"),
    term("memory usage", "memory usage", Some(Metric), "performance"),
    term("timeout", "timeout", None, "performance"),
    term("timeouts", "timeout", None, "performance"),
    term("outage", "outage", None, "performance"),
    term("incident", "incident", None, "performance"),
    term("bottleneck", "bottleneck", None, "performance"),
    term("performance", "performance", None, "performance"),
    // finance
    term("revenue", "revenue", Some(Metric), "finance"),
    term("arr", "arr", Some(Metric), "finance"),
    term("mrr", "mrr", Some(Metric), "finance"),
    term("churn", "churn", Some(Metric), "finance"),
    term("budget", "budget", None, "finance"),
    term("cost", "cost", None, "finance"),
    term("costs", "cost", None, "finance"),
    term("pricing", "pricing", None, "finance"),
    term("price", "pricing", None, "finance"),
    term("billing", "billing", None, "finance"),
    term("invoice", "invoice", None, "finance"),
    term("margin", "margin", None, "finance"),
    term("spend", "spend", None, "finance"),
    // product
    term("api", "api", Some(Technology), "product"),
    term("sdk", "sdk", Some(Technology), "product"),
    term("feature", "feature", None, "product"),
    term("release", "release", None, "product"),
    term("roadmap", "roadmap", None, "product"),
    term("customer", "customer", None, "product"),
    term("customers", "customer", None, "product"),
    term("onboarding", "onboarding", None, "product"),
    term("dashboard", "dashboard", None, "product"),
    term("checkout", "checkout", None, "product"),
    // people
    term("team", "team", None, "people"),
    term("engineer", "engineer", None, "people"),
    term("engineers", "engineer", None, "people"),
    term("manager", "manager", None, "people"),
    term("hiring", "hiring", None, "people"),
    term("oncall", "oncall", None, "people"),
    term("owner", "owner", None, "people"),
];

/// Capitalized words that start a sequence without being part of a name.
const LEADING_FILLERS: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "our", "we", "i", "it", "its", "my",
    "after", "before", "when", "if", "but", "however", "because", "since", "during", "then",
    "also", "yesterday", "today", "tomorrow", "last", "next", "in", "on", "at", "for",
];

const ORG_SUFFIXES: &[&str] = &[
    "Inc", "Corp", "Corporation", "Ltd", "LLC", "Labs", "Technologies", "Systems", "Group", "GmbH",
];

const CLAIM_SUBJECT_BLOCKLIST: &[&str] = &[
    "it", "this", "that", "there", "he", "she", "they", "we", "i", "what", "which", "who", "here",
];

// ---------------------------------------------------------------------------
// Rule-based strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Span {
    start: usize,
    end: usize,
    name: String,
    entity_type: EntityType,
}

/// Deterministic extractor built from regular expressions, capitalization
/// heuristics and a domain vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_sync(&self, content: &str) -> ExtractionResult {
        if content.trim().is_empty() {
            return ExtractionResult::default();
        }

        let mut accepted: Vec<Span> = Vec::new();
        let mut covered: Vec<(usize, usize)> = Vec::new();

        let patterns: [(&Regex, EntityType); 6] = [
            (&CURRENCY_SYMBOL, EntityType::Currency),
            (&CURRENCY_CODE, EntityType::Currency),
            (&PERCENTAGE, EntityType::Percentage),
            (&DATE, EntityType::Date),
            (&VERSION, EntityType::Version),
            (&NUMBER, EntityType::Number),
        ];
        for (pattern, entity_type) in patterns {
            for m in pattern.find_iter(content) {
                accept(&mut accepted, &mut covered, m.start(), m.end(), m.as_str(), entity_type);
            }
        }

        let (concepts, topics) = self.match_vocabulary(content, &mut accepted, &mut covered);

        for m in ACRONYM.find_iter(content) {
            accept(
                &mut accepted,
                &mut covered,
                m.start(),
                m.end(),
                m.as_str(),
                EntityType::ProperNoun,
            );
        }

        for m in CAPITALIZED.find_iter(content) {
            for (start, end) in uncovered_runs(content, m.start(), m.end(), &covered) {
                if let Some((start, end)) = trim_fillers(content, start, end) {
                    let name = &content[start..end];
                    let single_word = !name.contains([' ', '\t']);
                    if single_word && is_sentence_initial(content, start) {
                        continue;
                    }
                    let entity_type = if ORG_SUFFIXES.iter().any(|s| name.ends_with(&format!(" {s}"))) {
                        EntityType::Organization
                    } else {
                        EntityType::ProperNoun
                    };
                    accept(&mut accepted, &mut covered, start, end, name, entity_type);
                }
            }
        }

        accepted.sort_by_key(|span| span.start);
        let entities = accepted
            .into_iter()
            .map(|span| Entity::new(span.name, span.entity_type))
            .collect();

        ExtractionResult {
            entities,
            concepts,
            topics,
            claims: extract_claims(content),
        }
        .normalized()
    }

    /// Finds vocabulary terms (two-word terms first). Typed terms become
    /// entities; every match contributes its concept and topic.
    fn match_vocabulary(
        &self,
        content: &str,
        accepted: &mut Vec<Span>,
        covered: &mut Vec<(usize, usize)>,
    ) -> (Vec<String>, Vec<String>) {
        let tokens: Vec<(usize, &str)> = content.unicode_word_indices().collect();
        let mut hits: Vec<(usize, &Term)> = Vec::new();
        let mut consumed = vec![false; tokens.len()];

        for i in 0..tokens.len().saturating_sub(1) {
            if consumed[i] {
                continue;
            }
            let (start, first) = tokens[i];
            let (second_start, second) = tokens[i + 1];
            let phrase = format!("{} {}", first.to_lowercase(), second.to_lowercase());
            if let Some(t) = VOCABULARY.iter().find(|t| t.term == phrase) {
                let end = second_start + second.len();
                hits.push((start, t));
                consumed[i] = true;
                consumed[i + 1] = true;
                self.record_term(content, t, start, end, accepted, covered);
            }
        }

        for (i, (start, word)) in tokens.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let lower = word.to_lowercase();
            if let Some(t) = VOCABULARY.iter().find(|t| t.term == lower) {
                hits.push((*start, t));
                self.record_term(content, t, *start, start + word.len(), accepted, covered);
            }
        }

        hits.sort_by_key(|(start, _)| *start);
        let mut seen_concepts = HashSet::new();
        let mut seen_topics = HashSet::new();
        let mut concepts = Vec::new();
        let mut topics = Vec::new();
        for (_, t) in hits {
            if seen_concepts.insert(t.canonical) {
                concepts.push(t.canonical.to_string());
            }
            if seen_topics.insert(t.topic) {
                topics.push(t.topic.to_string());
            }
        }
        (concepts, topics)
    }

    fn record_term(
        &self,
        content: &str,
        t: &Term,
        start: usize,
        end: usize,
        accepted: &mut Vec<Span>,
        covered: &mut Vec<(usize, usize)>,
    ) {
        match t.entity_type {
            Some(entity_type) => accept(accepted, covered, start, end, &content[start..end], entity_type),
            None => covered.push((start, end)),
        }
    }
}

#[async_trait]
impl EntityExtractor for RuleBasedExtractor {
    async fn extract(&self, content: &str) -> ExtractionResult {
        self.extract_sync(content)
    }
}

fn overlaps(covered: &[(usize, usize)], start: usize, end: usize) -> bool {
    covered.iter().any(|&(s, e)| start < e && s < end)
}

fn accept(
    accepted: &mut Vec<Span>,
    covered: &mut Vec<(usize, usize)>,
    start: usize,
    end: usize,
    name: &str,
    entity_type: EntityType,
) {
    if overlaps(covered, start, end) {
        return;
    }
    covered.push((start, end));
    accepted.push(Span {
        start,
        end,
        name: name.trim().to_string(),
        entity_type,
    });
}

/// Splits a capitalized match into runs of words not already claimed by a
/// higher-priority pattern.
fn uncovered_runs(content: &str, start: usize, end: usize, covered: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (offset, word) in content[start..end].split_word_bound_indices() {
        if word.trim().is_empty() {
            continue;
        }
        let (word_start, word_end) = (start + offset, start + offset + word.len());
        if overlaps(covered, word_start, word_end) {
            if let Some(run) = current.take() {
                runs.push(run);
            }
        } else {
            current = Some(match current {
                Some((run_start, _)) => (run_start, word_end),
                None => (word_start, word_end),
            });
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }
    runs
}

/// Drops leading filler words ("The", "After", ...). Returns `None` when nothing remains.
fn trim_fillers(content: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let mut cursor = start;
    for (offset, word) in content[start..end].split_word_bound_indices() {
        if word.trim().is_empty() {
            continue;
        }
        if LEADING_FILLERS.contains(&word.to_lowercase().as_str()) {
            cursor = start + offset + word.len();
        } else {
            break;
        }
    }
    let trimmed = content[cursor..end].trim_start();
    if trimmed.is_empty() {
        return None;
    }
    Some((end - trimmed.len(), end))
}

fn is_sentence_initial(content: &str, start: usize) -> bool {
    let before = &content[..start];
    let trimmed = before.trim_end();
    trimmed.is_empty()
        || trimmed.ends_with(['.', '!', '?', ':'])
        || before[trimmed.len()..].contains('\n')
}

/// "<subject> is|are|=|: <value>" statements, one per sentence.
fn extract_claims(content: &str) -> Vec<CandidateClaim> {
    SENTENCE_SPLIT
        .split(content)
        .filter_map(|sentence| parse_claim(sentence.trim()))
        .collect()
}

fn parse_claim(sentence: &str) -> Option<CandidateClaim> {
    let lower = sentence.to_ascii_lowercase();
    let candidates = [
        lower.find(" is ").map(|p| (p, p + 4)),
        lower.find(" are ").map(|p| (p, p + 5)),
        lower.find('=').map(|p| (p, p + 1)),
        lower.find(':').map(|p| (p, p + 1)),
    ];
    let (subject_end, value_start) = candidates.into_iter().flatten().min_by_key(|(p, _)| *p)?;

    let mut subject: Vec<String> = sentence[..subject_end]
        .unicode_words()
        .map(|w| w.to_lowercase())
        .collect();
    while subject
        .first()
        .is_some_and(|w| matches!(w.as_str(), "the" | "our" | "a" | "an" | "my" | "their"))
    {
        subject.remove(0);
    }
    if subject.is_empty()
        || subject.len() > 5
        || CLAIM_SUBJECT_BLOCKLIST.contains(&subject[0].as_str())
    {
        return None;
    }

    let value = sentence[value_start..]
        .trim()
        .trim_end_matches(['.', ',', '!', '?', ';'])
        .trim();
    if value.is_empty() || value.split_whitespace().count() > 10 {
        return None;
    }

    let key = subject
        .iter()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if key.is_empty() {
        return None;
    }

    Some(CandidateClaim {
        key,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Model-based strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: String,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    claims: Vec<CandidateClaim>,
}

impl From<RawExtraction> for ExtractionResult {
    fn from(raw: RawExtraction) -> Self {
        ExtractionResult {
            entities: raw
                .entities
                .into_iter()
                .map(|e| {
                    let entity_type = e.entity_type.parse().unwrap_or(EntityType::ProperNoun);
                    Entity::new(e.name, entity_type)
                })
                .collect(),
            concepts: raw.concepts.into_iter().map(|c| c.to_lowercase()).collect(),
            topics: raw.topics.into_iter().map(|t| t.to_lowercase()).collect(),
            claims: raw.claims,
        }
        .normalized()
    }
}

/// LLM-backed extractor. Falls back to [`RuleBasedExtractor`] whenever the
/// model is unavailable or returns something unusable.
#[derive(Debug, Clone)]
pub struct ModelExtractor {
    llm: LlmProvider,
    fallback: RuleBasedExtractor,
}

impl ModelExtractor {
    pub fn new(llm: LlmProvider) -> Self {
        Self {
            llm,
            fallback: RuleBasedExtractor::new(),
        }
    }
}

#[async_trait]
impl EntityExtractor for ModelExtractor {
    async fn extract(&self, content: &str) -> ExtractionResult {
        if content.trim().is_empty() {
            return ExtractionResult::default();
        }
        if !self.llm.is_available() {
            tracing::debug!("LLM unavailable, using rule-based extraction");
            return self.fallback.extract_sync(content);
        }

        let prompt = prompts::entity_extraction_prompt(content);
        match self.llm.complete_structured::<RawExtraction>(&prompt).await {
            Ok(raw) => raw.into(),
            Err(RmcError::LlmUnavailable(reason)) => {
                tracing::warn!(%reason, "LLM unavailable during extraction, using rules");
                self.fallback.extract_sync(content)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Model extraction failed, using rules");
                self.fallback.extract_sync(content)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(result: &ExtractionResult) -> Vec<&str> {
        result.entities.iter().map(|e| e.name.as_str()).collect()
    }

    fn type_of(result: &ExtractionResult, name: &str) -> Option<EntityType> {
        result
            .entities
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.entity_type)
    }

    #[test]
    fn test_empty_input() {
        assert!(RuleBasedExtractor::new().extract_sync("   ").is_empty());
    }

    #[test]
    fn test_numeric_patterns() {
        let result = RuleBasedExtractor::new().extract_sync(
            "Revenue hit $1,200 in Q3 2024, up 15% after v1.2.3 shipped on 2024-07-01.",
        );

        assert_eq!(
            names(&result),
            vec!["Revenue", "$1,200", "Q3 2024", "15%", "v1.2.3", "2024-07-01"]
        );
        assert_eq!(type_of(&result, "Revenue"), Some(EntityType::Metric));
        assert_eq!(type_of(&result, "$1,200"), Some(EntityType::Currency));
        assert_eq!(type_of(&result, "Q3 2024"), Some(EntityType::Date));
        assert_eq!(type_of(&result, "15%"), Some(EntityType::Percentage));
        assert_eq!(type_of(&result, "v1.2.3"), Some(EntityType::Version));
        assert_eq!(type_of(&result, "2024-07-01"), Some(EntityType::Date));
        assert_eq!(result.topics, vec!["finance"]);
    }

    #[test]
    fn test_numbers_with_units_and_currency_codes() {
        let result = RuleBasedExtractor::new().extract_sync("p99 rose to 120ms and the bill was USD 300");
        assert_eq!(type_of(&result, "120ms"), Some(EntityType::Number));
        assert_eq!(type_of(&result, "USD 300"), Some(EntityType::Currency));
        assert_eq!(type_of(&result, "p99"), Some(EntityType::Metric));
    }

    #[test]
    fn test_capitalized_sequences() {
        let result = RuleBasedExtractor::new()
            .extract_sync("We asked Alice Johnson to move the Ledger Service to Acme Corp.");

        assert_eq!(names(&result), vec!["Alice Johnson", "Ledger Service", "Acme Corp"]);
        assert_eq!(type_of(&result, "Acme Corp"), Some(EntityType::Organization));
        assert_eq!(type_of(&result, "Alice Johnson"), Some(EntityType::ProperNoun));
    }

    #[test]
    fn test_lone_sentence_initial_word_ignored() {
        let result = RuleBasedExtractor::new().extract_sync("Deploys failed twice. Nobody noticed");
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_vocabulary_and_acronyms() {
        let result = RuleBasedExtractor::new().extract_sync("Auth uses JWT tokens behind the API gateway");

        assert_eq!(names(&result), vec!["JWT", "API"]);
        assert_eq!(type_of(&result, "JWT"), Some(EntityType::Technology));
        assert_eq!(result.concepts, vec!["auth", "jwt", "token", "api"]);
        assert_eq!(result.topics, vec!["security", "product"]);
    }

    #[test]
    fn test_unknown_acronym_is_proper_noun() {
        let result = RuleBasedExtractor::new().extract_sync("the ZQX migration slipped");
        assert_eq!(type_of(&result, "ZQX"), Some(EntityType::ProperNoun));
    }

    #[test]
    fn test_two_word_terms() {
        let result = RuleBasedExtractor::new().extract_sync("the error rate spiked behind the load balancer");
        assert_eq!(result.concepts, vec!["error rate", "load balancer"]);
        assert_eq!(type_of(&result, "error rate"), Some(EntityType::Metric));
    }

    #[test]
    fn test_case_insensitive_dedup() {
        let result = RuleBasedExtractor::new().extract_sync("Redis and redis and REDIS");
        assert_eq!(names(&result), vec!["Redis"]);
        assert_eq!(result.concepts, vec!["redis"]);
    }

    #[test]
    fn test_candidate_claims() {
        let result = RuleBasedExtractor::new().extract_sync("The auth method is JWT. Timeout: 30s");
        assert_eq!(
            result.claims,
            vec![
                CandidateClaim {
                    key: "auth_method".into(),
                    value: "JWT".into()
                },
                CandidateClaim {
                    key: "timeout".into(),
                    value: "30s".into()
                },
            ]
        );
    }

    #[test]
    fn test_pronoun_subjects_are_not_claims() {
        let result = RuleBasedExtractor::new().extract_sync("It is broken. This is fine");
        assert!(result.claims.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = "Kafka lag at Acme Corp grew 40% after the v2.1.0 release on 2024-03-02";
        let extractor = RuleBasedExtractor::new();
        assert_eq!(extractor.extract_sync(text), extractor.extract_sync(text));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let extractor = RuleBasedExtractor::new();
        let results = extractor
            .extract_batch(&["Redis is down".to_string(), String::new(), "Kafka lag".to_string()])
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(names(&results[0]), vec!["Redis"]);
        assert!(results[1].is_empty());
        assert_eq!(names(&results[2]), vec!["Kafka"]);
    }

    #[tokio::test]
    async fn test_model_extractor_falls_back_without_llm() {
        let model = ModelExtractor::new(LlmProvider::unavailable("not configured"));
        let text = "Postgres latency doubled after the schema migration";
        assert_eq!(model.extract(text).await, RuleBasedExtractor::new().extract_sync(text));
    }

    #[test]
    fn test_raw_model_output_is_normalized() {
        let raw: RawExtraction = serde_json::from_value(serde_json::json!({
            "entities": [
                {"name": " Redis ", "type": "technology"},
                {"name": "redis", "type": "technology"},
                {"name": "Zed", "type": "spaceship"}
            ],
            "concepts": ["Latency", "latency"],
            "topics": ["Performance"]
        }))
        .unwrap();
        let result: ExtractionResult = raw.into();

        assert_eq!(names(&result), vec!["Redis", "Zed"]);
        assert_eq!(type_of(&result, "Zed"), Some(EntityType::ProperNoun));
        assert_eq!(result.concepts, vec!["latency"]);
        assert_eq!(result.topics, vec!["performance"]);
    }
}
