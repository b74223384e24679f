use serde::{Deserialize, Serialize};

use super::{MemoryEntry, RelationType};

/// Scope of a similarity query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryFilter {
    pub org_id: String,
    pub namespace: Option<String>,
    /// Match descendant namespaces (`acme/eng/auth` under `acme/eng`) too.
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    pub content_type: Option<String>,
    /// Include entries that have been superseded by a newer version.
    #[serde(default)]
    pub include_superseded: bool,
    pub limit: Option<usize>,
    pub min_similarity: Option<f32>,
}

fn default_true() -> bool {
    true
}

impl QueryFilter {
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            namespace: None,
            include_descendants: true,
            content_type: None,
            include_superseded: false,
            limit: None,
            min_similarity: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Increment usage counters of returned entries.
    pub record_usage: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { record_usage: true }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    pub quality: f64,
    pub normalized_usage: f64,
    pub recency: f64,
    pub base_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub score: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    pub max_depth: usize,
    pub relation_types: Vec<RelationType>,
    pub include_inference_paths: bool,
    /// Minimum similarity for a direct match.
    pub min_confidence: f32,
    pub node_budget: usize,
    pub time_budget_ms: u64,
    pub limit: Option<usize>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            relation_types: RelationType::ALL.to_vec(),
            include_inference_paths: true,
            min_confidence: 0.0,
            node_budget: 50,
            time_budget_ms: 250,
            limit: None,
        }
    }
}

/// An entry reached by graph expansion rather than by similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedEntry {
    pub entry: MemoryEntry,
    pub depth: usize,
    pub via: RelationType,
    pub from_id: String,
    /// Product of edge strengths along the discovery chain from a direct match.
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    CausalChain,
    Contradiction,
    SupportChain,
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CausalChain => write!(f, "causal chain"),
            Self::Contradiction => write!(f, "contradiction"),
            Self::SupportChain => write!(f, "support chain"),
        }
    }
}

/// How edge strengths combine into a path confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathConfidenceRule {
    #[default]
    Product,
    /// Weakest link.
    Minimum,
}

impl PathConfidenceRule {
    pub fn combine(&self, strengths: &[f64]) -> f64 {
        match self {
            Self::Product => strengths.iter().product(),
            Self::Minimum => strengths.iter().copied().fold(1.0, f64::min),
        }
    }
}

impl std::str::FromStr for PathConfidenceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "min" | "minimum" => Ok(Self::Minimum),
            other => Err(format!("unknown path confidence rule '{other}' (expected product or min)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferencePath {
    pub kind: PathKind,
    pub nodes: Vec<String>,
    pub edges: Vec<PathEdge>,
    pub confidence: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLimit {
    NodeBudget,
    TimeBudget,
}

/// Non-fatal: traversal stopped early and the result is partial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraversalBudgetExceeded {
    pub limit: BudgetLimit,
    pub nodes_visited: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub edges_considered: usize,
    pub max_depth_reached: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSummary {
    pub text: String,
    pub direct_match_count: usize,
    pub related_count: usize,
    pub causal_chains: usize,
    pub contradictions: usize,
    pub support_chains: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    pub direct_matches: Vec<ScoredEntry>,
    pub related_context: Vec<RelatedEntry>,
    pub inference_paths: Vec<InferencePath>,
    pub summary: RetrievalSummary,
    pub partial: bool,
    pub truncated: Option<TraversalBudgetExceeded>,
    pub stats: TraversalStats,
}
