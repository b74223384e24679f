use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{RelationConfig, StrategyKind};
use crate::error::RmcError;
use crate::intelligence::contradiction::{ContradictionCheckResult, ContradictionDetector};
use crate::intelligence::utils::{contains_phrase, words};
use crate::llm::{prompts, LlmProvider};
use crate::models::{namespaces_compatible, InferredBy, MemoryEntry, MemoryRelation, RelationType};

const BACKWARD_CAUSAL: &[&str] = &[
    "because",
    "due to",
    "caused by",
    "as a result of",
    "owing to",
    "triggered by",
    "thanks to",
    "stems from",
];

const FORWARD_CAUSAL: &[&str] = &[
    "leads to",
    "led to",
    "results in",
    "resulted in",
    "causes",
    "caused",
    "triggers",
    "triggered",
    "therefore",
    "consequently",
];

const IMPACT: &[&str] = &[
    "impacts",
    "impacted",
    "affects",
    "affected",
    "degrades",
    "degraded",
    "slows down",
    "slowed down",
    "blocks",
    "blocked",
    "breaks",
    "broke",
];

const CONTRASTIVE: &[&str] = &[
    "however",
    "contrary to",
    "in contrast",
    "instead of",
    "no longer",
    "contradicts",
    "disagrees",
    "not true",
];

const AFFIRMING: &[&str] = &[
    "confirms",
    "confirmed",
    "supports",
    "consistent with",
    "agrees with",
    "corroborates",
    "reinforces",
    "validates",
    "validated",
    "verified",
    "as expected",
];

/// Confidence assigned to each cue class before weighting with overlap.
mod cue_confidence {
    pub const CONTRADICTION_LIKELY: f64 = 0.9;
    pub const BACKWARD_CAUSAL: f64 = 0.9;
    pub const FORWARD_CAUSAL: f64 = 0.85;
    pub const IMPACT: f64 = 0.8;
    pub const AFFIRMING: f64 = 0.7;
    pub const CONTRADICTION_WEAK: f64 = 0.6;
    pub const CONTRASTIVE: f64 = 0.5;
    pub const RELATES_TO: f64 = 0.3;
}

/// Weights and thresholds shared by both classifier strategies.
#[derive(Debug, Clone, Copy)]
pub struct RelationWeights {
    pub overlap_weight: f64,
    pub cue_weight: f64,
    pub relates_to_min_overlap: usize,
}

impl Default for RelationWeights {
    fn default() -> Self {
        Self {
            overlap_weight: 0.6,
            cue_weight: 0.4,
            relates_to_min_overlap: 2,
        }
    }
}

impl From<&RelationConfig> for RelationWeights {
    fn from(config: &RelationConfig) -> Self {
        Self {
            overlap_weight: f64::from(config.overlap_weight),
            cue_weight: f64::from(config.cue_weight),
            relates_to_min_overlap: config.relates_to_min_overlap,
        }
    }
}

/// Shared keys between two entries' extractions.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlap {
    pub shared: Vec<String>,
    pub normalized: f64,
}

impl Overlap {
    pub fn between(a: &MemoryEntry, b: &MemoryEntry) -> Self {
        let keys_a = a.extraction.overlap_keys();
        let keys_b = b.extraction.overlap_keys();
        let shared: Vec<String> = keys_a.intersection(&keys_b).cloned().collect();
        let denominator = keys_a.len().min(keys_b.len());
        let normalized = if denominator == 0 {
            0.0
        } else {
            shared.len() as f64 / denominator as f64
        };
        Self { shared, normalized }
    }

    pub fn count(&self) -> usize {
        self.shared.len()
    }
}

/// Decides the typed edges between a new entry and its in-scope candidates.
#[async_trait]
pub trait RelationClassifier: Send + Sync {
    async fn classify(&self, new_entry: &MemoryEntry, candidates: &[&MemoryEntry]) -> Vec<MemoryRelation>;
}

/// Infers typed, weighted relations between a new entry and existing ones.
#[derive(Clone)]
pub struct RelationBuilder {
    classifier: Arc<dyn RelationClassifier>,
    min_strength: f64,
}

impl RelationBuilder {
    pub fn new(classifier: Arc<dyn RelationClassifier>, min_strength: f64) -> Self {
        Self {
            classifier,
            min_strength,
        }
    }

    pub fn from_config(config: &RelationConfig, llm: &LlmProvider) -> Self {
        let lexical = LexicalClassifier::new(RelationWeights::from(config));
        let classifier: Arc<dyn RelationClassifier> = match config.strategy {
            StrategyKind::Model => Arc::new(ModelClassifier::new(llm.clone(), lexical)),
            StrategyKind::Rule => Arc::new(lexical),
        };
        Self::new(classifier, f64::from(config.min_strength))
    }

    /// Candidates outside the entry's org, namespace scope or version chain
    /// are ignored. Output is ordered by (source, target, type).
    pub async fn build_relations(&self, new_entry: &MemoryEntry, candidates: &[MemoryEntry]) -> Vec<MemoryRelation> {
        let scoped: Vec<&MemoryEntry> = candidates
            .iter()
            .filter(|c| {
                c.id != new_entry.id
                    && c.root_id != new_entry.root_id
                    && c.org_id == new_entry.org_id
                    && namespaces_compatible(&c.namespace, &new_entry.namespace)
            })
            .collect();
        if scoped.is_empty() {
            return Vec::new();
        }

        let mut relations = self.classifier.classify(new_entry, &scoped).await;
        relations.retain(|r| r.strength >= self.min_strength && r.source_id != r.target_id);
        relations.sort_by(|a, b| {
            (&a.source_id, &a.target_id, a.relation_type).cmp(&(&b.source_id, &b.target_id, b.relation_type))
        });
        relations.dedup_by(|a, b| {
            a.source_id == b.source_id && a.target_id == b.target_id && a.relation_type == b.relation_type
        });

        tracing::debug!(
            entry_id = %new_entry.id,
            candidates = scoped.len(),
            relations = relations.len(),
            "Built relations"
        );
        relations
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    NewToCandidate,
    CandidateToNew,
}

#[derive(Debug, Clone, PartialEq)]
struct Cue {
    relation_type: RelationType,
    direction: Direction,
    confidence: f64,
    label: String,
}

/// Entity overlap plus connective cues in the new entry's text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalClassifier {
    weights: RelationWeights,
    detector: ContradictionDetector,
}

impl LexicalClassifier {
    pub fn new(weights: RelationWeights) -> Self {
        Self {
            weights,
            detector: ContradictionDetector::new(),
        }
    }

    pub fn classify_pair(&self, new_entry: &MemoryEntry, candidate: &MemoryEntry) -> Option<MemoryRelation> {
        let overlap = Overlap::between(new_entry, candidate);
        if overlap.count() == 0 {
            return None;
        }

        let cue = self.detect_cue(new_entry, candidate, &overlap)?;
        let strength = (self.weights.overlap_weight * overlap.normalized + self.weights.cue_weight * cue.confidence)
            .clamp(0.0, 1.0);

        let (source, target) = match cue.direction {
            Direction::NewToCandidate => (&new_entry.id, &candidate.id),
            Direction::CandidateToNew => (&candidate.id, &new_entry.id),
        };

        let shared = overlap.shared.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
        let mut relation = MemoryRelation::new(
            source.clone(),
            target.clone(),
            cue.relation_type,
            strength,
            format!("{}; shared: {shared}", cue.label),
        );
        relation.entity_overlap = overlap.count() as u32;
        Some(relation)
    }

    fn detect_cue(&self, new_entry: &MemoryEntry, candidate: &MemoryEntry, overlap: &Overlap) -> Option<Cue> {
        let text = words(&new_entry.content.replace('\u{2019}', "'"));
        let found = |phrases: &[&'static str]| phrases.iter().find(|p| contains_phrase(&text, p)).copied();
        let cue = |relation_type, direction, confidence, label: String| Cue {
            relation_type,
            direction,
            confidence,
            label,
        };

        let contradiction = self.detector.check_contradiction(&candidate.content, &new_entry.content);
        if contradiction == ContradictionCheckResult::Likely {
            return Some(cue(
                RelationType::Contradicts,
                Direction::NewToCandidate,
                cue_confidence::CONTRADICTION_LIKELY,
                "contradiction cue (negation or antonym)".to_string(),
            ));
        }
        if let Some(phrase) = found(BACKWARD_CAUSAL) {
            return Some(cue(
                RelationType::Causes,
                Direction::CandidateToNew,
                cue_confidence::BACKWARD_CAUSAL,
                format!("causal cue \"{phrase}\""),
            ));
        }
        if let Some(phrase) = found(FORWARD_CAUSAL) {
            return Some(cue(
                RelationType::Causes,
                Direction::NewToCandidate,
                cue_confidence::FORWARD_CAUSAL,
                format!("causal cue \"{phrase}\""),
            ));
        }
        if let Some(phrase) = found(IMPACT) {
            return Some(cue(
                RelationType::Impacts,
                Direction::NewToCandidate,
                cue_confidence::IMPACT,
                format!("impact cue \"{phrase}\""),
            ));
        }
        if let Some(phrase) = found(CONTRASTIVE) {
            let confidence = if contradiction == ContradictionCheckResult::Unlikely {
                cue_confidence::CONTRADICTION_WEAK
            } else {
                cue_confidence::CONTRASTIVE
            };
            return Some(cue(
                RelationType::Contradicts,
                Direction::NewToCandidate,
                confidence,
                format!("contrastive cue \"{phrase}\""),
            ));
        }
        if let Some(phrase) = found(AFFIRMING) {
            return Some(cue(
                RelationType::Supports,
                Direction::NewToCandidate,
                cue_confidence::AFFIRMING,
                format!("affirming cue \"{phrase}\""),
            ));
        }
        if overlap.count() >= self.weights.relates_to_min_overlap {
            return Some(cue(
                RelationType::RelatesTo,
                Direction::NewToCandidate,
                cue_confidence::RELATES_TO,
                format!("{} shared entities or concepts", overlap.count()),
            ));
        }
        None
    }
}

#[async_trait]
impl RelationClassifier for LexicalClassifier {
    async fn classify(&self, new_entry: &MemoryEntry, candidates: &[&MemoryEntry]) -> Vec<MemoryRelation> {
        candidates
            .iter()
            .filter_map(|candidate| self.classify_pair(new_entry, candidate))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    candidate_id: String,
    relation_type: String,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    strength: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawClassifications {
    List(Vec<RawClassification>),
    Wrapped { relations: Vec<RawClassification> },
}

impl RawClassifications {
    fn into_vec(self) -> Vec<RawClassification> {
        match self {
            Self::List(items) | Self::Wrapped { relations: items } => items,
        }
    }
}

/// Asks the LLM to label each candidate pair. Any failure falls back to the
/// lexical classifier so the write path never depends on the model.
#[derive(Debug, Clone)]
pub struct ModelClassifier {
    llm: LlmProvider,
    fallback: LexicalClassifier,
}

impl ModelClassifier {
    pub fn new(llm: LlmProvider, fallback: LexicalClassifier) -> Self {
        Self { llm, fallback }
    }

    fn to_relations(
        &self,
        new_entry: &MemoryEntry,
        candidates: &[&MemoryEntry],
        overlaps: &HashMap<&str, Overlap>,
        raw: Vec<RawClassification>,
    ) -> Vec<MemoryRelation> {
        let known: BTreeSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        raw.into_iter()
            .filter_map(|item| {
                if !known.contains(item.candidate_id.as_str()) {
                    tracing::debug!(candidate_id = %item.candidate_id, "Model named unknown candidate");
                    return None;
                }
                let relation_type: RelationType = item.relation_type.parse().ok()?;
                let (source, target) = match item.direction.as_deref() {
                    Some("candidate_to_new") => (item.candidate_id.clone(), new_entry.id.clone()),
                    _ => (new_entry.id.clone(), item.candidate_id.clone()),
                };
                let overlap = overlaps.get(item.candidate_id.as_str());
                let mut relation = MemoryRelation::new(
                    source,
                    target,
                    relation_type,
                    item.strength.unwrap_or(0.5),
                    item.reason.unwrap_or_else(|| "model classification".to_string()),
                );
                relation.inferred_by = InferredBy::Model;
                relation.entity_overlap = overlap.map_or(0, |o| o.count() as u32);
                Some(relation)
            })
            .collect()
    }
}

#[async_trait]
impl RelationClassifier for ModelClassifier {
    async fn classify(&self, new_entry: &MemoryEntry, candidates: &[&MemoryEntry]) -> Vec<MemoryRelation> {
        if !self.llm.is_available() {
            return self.fallback.classify(new_entry, candidates).await;
        }

        let overlaps: HashMap<&str, Overlap> = candidates
            .iter()
            .map(|c| (c.id.as_str(), Overlap::between(new_entry, c)))
            .filter(|(_, overlap)| overlap.count() > 0)
            .collect();
        let related: Vec<&MemoryEntry> = candidates
            .iter()
            .copied()
            .filter(|c| overlaps.contains_key(c.id.as_str()))
            .collect();
        if related.is_empty() {
            return Vec::new();
        }

        let detector = ContradictionDetector::new();
        let flagged = related
            .iter()
            .find(|c| detector.check_contradiction(&c.content, &new_entry.content).is_likely())
            .map(|c| c.id.as_str());
        let prompt_candidates: Vec<(&str, &str)> =
            related.iter().map(|c| (c.id.as_str(), c.content.as_str())).collect();
        let prompt = prompts::relation_classification_prompt(&new_entry.content, &prompt_candidates, flagged);

        match self.llm.complete_structured::<RawClassifications>(&prompt).await {
            Ok(raw) => self.to_relations(new_entry, &related, &overlaps, raw.into_vec()),
            Err(RmcError::LlmUnavailable(reason)) => {
                tracing::warn!(%reason, "LLM unavailable during relation classification");
                self.fallback.classify(new_entry, candidates).await
            }
            Err(error) => {
                tracing::warn!(error = %error, "Model relation classification failed, using lexical cues");
                self.fallback.classify(new_entry, candidates).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, EntityType, ExtractionResult};
    use chrono::Utc;

    fn entry(id: &str, namespace: &str, content: &str, keys: &[&str]) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            org_id: "org".to_string(),
            namespace: namespace.to_string(),
            content_type: "fact".to_string(),
            content: content.to_string(),
            embedding: Vec::new(),
            confidence: 1.0,
            claim: None,
            extraction: ExtractionResult {
                entities: keys
                    .iter()
                    .map(|k| Entity::new(*k, EntityType::ProperNoun))
                    .collect(),
                ..Default::default()
            },
            root_id: id.to_string(),
            parent_id: None,
            created_by: "test".to_string(),
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    fn builder() -> RelationBuilder {
        RelationBuilder::new(Arc::new(LexicalClassifier::default()), 0.2)
    }

    #[test]
    fn test_overlap_normalized_by_smaller_set() {
        let a = entry("a", "acme", "", &["redis", "latency"]);
        let b = entry("b", "acme", "", &["Redis", "latency", "cache", "p99"]);
        let overlap = Overlap::between(&a, &b);
        assert_eq!(overlap.count(), 2);
        assert!((overlap.normalized - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_backward_causal_points_from_candidate() {
        let old = entry("old", "acme", "Redis eviction policy changed", &["redis", "eviction"]);
        let new = entry("new", "acme", "Latency spiked because of Redis eviction", &["redis", "eviction", "latency"]);

        let relations = builder().build_relations(&new, &[old]).await;
        assert_eq!(relations.len(), 1);
        let rel = &relations[0];
        assert_eq!(rel.relation_type, RelationType::Causes);
        assert_eq!(rel.source_id, "old");
        assert_eq!(rel.target_id, "new");
        // 0.6 * 1.0 + 0.4 * 0.9
        assert!((rel.strength - 0.96).abs() < 1e-9);
        assert_eq!(rel.entity_overlap, 2);
        assert_eq!(rel.inferred_by, InferredBy::Rule);
    }

    #[tokio::test]
    async fn test_forward_causal_and_impact() {
        let target = entry("t", "acme", "Checkout errors", &["checkout"]);
        let causal = entry("c", "acme", "The proxy bug leads to checkout errors", &["checkout", "proxy"]);
        let impact = entry("i", "acme", "The outage affects checkout", &["checkout", "outage"]);

        let b = builder();
        let rel = &b.build_relations(&causal, &[target.clone()]).await[0];
        assert_eq!((rel.relation_type, rel.source_id.as_str()), (RelationType::Causes, "c"));

        let rel = &b.build_relations(&impact, &[target]).await[0];
        assert_eq!((rel.relation_type, rel.target_id.as_str()), (RelationType::Impacts, "t"));
    }

    #[tokio::test]
    async fn test_negation_yields_contradiction() {
        let old = entry("old", "acme", "The cache is enabled in production", &["cache", "production"]);
        let new = entry("new", "acme", "The cache is not enabled in production", &["cache", "production"]);

        let relations = builder().build_relations(&new, &[old]).await;
        assert_eq!(relations[0].relation_type, RelationType::Contradicts);
        assert_eq!(relations[0].source_id, "new");
    }

    #[tokio::test]
    async fn test_affirming_cue_supports() {
        let old = entry("old", "acme", "Postgres handles the load", &["postgres", "load"]);
        let new = entry("new", "acme", "Benchmarks confirmed Postgres handles peak load", &["postgres", "load"]);

        let relations = builder().build_relations(&new, &[old]).await;
        assert_eq!(relations[0].relation_type, RelationType::Supports);
    }

    #[tokio::test]
    async fn test_relates_to_needs_two_shared_keys() {
        let old = entry("old", "acme", "Kafka consumers run on Kubernetes", &["kafka", "kubernetes"]);
        let one = entry("one", "acme", "Kafka retention is seven days", &["kafka", "retention"]);
        let two = entry("two", "acme", "Kafka brokers moved to Kubernetes", &["kafka", "kubernetes"]);

        let b = builder();
        assert!(b.build_relations(&one, &[old.clone()]).await.is_empty());
        let relations = b.build_relations(&two, &[old]).await;
        assert_eq!(relations[0].relation_type, RelationType::RelatesTo);
    }

    #[tokio::test]
    async fn test_scope_filtering() {
        let new = entry("new", "acme/eng", "Latency rose because of Redis", &["redis", "latency"]);
        let mut other_org = entry("o", "acme/eng", "Redis latency", &["redis", "latency"]);
        other_org.org_id = "other".to_string();
        let sibling = entry("s", "acme/sales", "Redis latency", &["redis", "latency"]);
        let parent = entry("p", "acme", "Redis latency", &["redis", "latency"]);
        let mut same_chain = entry("v", "acme/eng", "Redis latency", &["redis", "latency"]);
        same_chain.root_id = "new".to_string();

        let relations = builder()
            .build_relations(&new, &[other_org, sibling, parent, same_chain])
            .await;
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].source_id, "p");
    }

    #[tokio::test]
    async fn test_weak_edges_dropped() {
        let b = RelationBuilder::new(Arc::new(LexicalClassifier::default()), 0.99);
        let old = entry("old", "acme", "Kafka and Kubernetes", &["kafka", "kubernetes"]);
        let new = entry("new", "acme", "Kafka on Kubernetes", &["kafka", "kubernetes"]);
        assert!(b.build_relations(&new, &[old]).await.is_empty());
    }

    #[tokio::test]
    async fn test_model_classifier_falls_back_when_unavailable() {
        let lexical = LexicalClassifier::default();
        let model = ModelClassifier::new(LlmProvider::unavailable("off"), lexical);
        let old = entry("old", "acme", "Redis eviction policy changed", &["redis", "eviction"]);
        let new = entry("new", "acme", "Latency spiked due to Redis eviction", &["redis", "eviction"]);

        let from_model = model.classify(&new, &[&old]).await;
        let from_rules = lexical.classify(&new, &[&old]).await;
        assert_eq!(from_model.len(), from_rules.len());
        assert_eq!(from_model[0].relation_type, from_rules[0].relation_type);
    }

    #[test]
    fn test_model_output_mapping() {
        let model = ModelClassifier::new(LlmProvider::unavailable("off"), LexicalClassifier::default());
        let new = entry("new", "acme", "x", &["redis"]);
        let old = entry("old", "acme", "y", &["redis"]);
        let overlaps = HashMap::from([("old", Overlap::between(&new, &old))]);
        let raw: RawClassifications = serde_json::from_value(serde_json::json!([
            {"candidate_id": "old", "relation_type": "CAUSES", "direction": "candidate_to_new", "strength": 0.8},
            {"candidate_id": "old", "relation_type": "NONE"},
            {"candidate_id": "ghost", "relation_type": "SUPPORTS"}
        ]))
        .unwrap();

        let relations = model.to_relations(&new, &[&old], &overlaps, raw.into_vec());
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].source_id, "old");
        assert_eq!(relations[0].inferred_by, InferredBy::Model);
        assert_eq!(relations[0].entity_overlap, 1);
    }
}
