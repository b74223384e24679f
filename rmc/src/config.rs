use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::models::PathConfidenceRule;

fn parse_env_or<T: FromStr>(var: &str, default: T) -> T
where
    T::Err: fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: FromStr>(var: &str) -> Option<T>
where
    T::Err: fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: Option<LlmConfig>,
    pub extraction: ExtractionConfig,
    pub relations: RelationConfig,
    pub scoring: ScoringConfig,
    pub query: QueryConfig,
    pub conflicts: ConflictConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Number of query embeddings kept in memory. Zero disables the cache.
    pub query_cache_size: usize,
}

/// LLM configuration for the optional model-based strategies.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Which implementation backs a swappable strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Rule,
    Model,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" | "rules" | "rule_based" | "rule-based" => Ok(Self::Rule),
            "model" | "llm" | "model_based" | "model-based" => Ok(Self::Model),
            other => Err(format!("unknown strategy '{other}' (expected rule or model)")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule => write!(f, "rule"),
            Self::Model => write!(f, "model"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub strategy: StrategyKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationConfig {
    pub strategy: StrategyKind,
    /// How many recent active entries in scope are compared against a new write.
    pub candidate_limit: usize,
    pub min_strength: f32,
    pub overlap_weight: f32,
    pub cue_weight: f32,
    pub relates_to_min_overlap: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub similarity_weight: f64,
    pub quality_weight: f64,
    pub confidence_weight: f64,
    pub usage_weight: f64,
    pub recency_weight: f64,
    pub half_life_days: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.4,
            quality_weight: 0.6,
            confidence_weight: 0.5,
            usage_weight: 0.3,
            recency_weight: 0.2,
            half_life_days: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub candidate_pool: usize,
    pub min_similarity: f32,
}

/// When post-write conflict detection runs relative to the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    #[default]
    Inline,
    Background,
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "background" | "async" => Ok(Self::Background),
            other => Err(format!(
                "unknown detection mode '{other}' (expected inline or background)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConflictConfig {
    pub mode: DetectionMode,
    pub semantic_pass: bool,
    pub semantic_threshold: f32,
    pub semantic_neighbors: usize,
    pub link_on_resolve: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub max_depth: usize,
    pub node_budget: usize,
    pub time_budget_ms: u64,
    pub max_edges_per_node: usize,
    pub max_paths: usize,
    pub path_confidence: PathConfidenceRule,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:rmc.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
                busy_timeout_ms: parse_env_or("DATABASE_BUSY_TIMEOUT_MS", 5000),
                journal_mode: env::var("DATABASE_JOURNAL_MODE")
                    .unwrap_or_else(|_| "WAL".to_string()),
                synchronous: env::var("DATABASE_SYNCHRONOUS")
                    .unwrap_or_else(|_| "NORMAL".to_string()),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 256),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT_SECS", 30),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
                query_cache_size: parse_env_or("QUERY_EMBEDDING_CACHE_SIZE", 1000),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
            }),
            extraction: ExtractionConfig {
                strategy: parse_env_or("EXTRACTION_STRATEGY", StrategyKind::Rule),
            },
            relations: RelationConfig {
                strategy: parse_env_or("RELATION_STRATEGY", StrategyKind::Rule),
                candidate_limit: parse_env_or("RELATION_CANDIDATE_LIMIT", 50),
                min_strength: parse_env_or("RELATION_MIN_STRENGTH", 0.2),
                overlap_weight: parse_env_or("RELATION_OVERLAP_WEIGHT", 0.6),
                cue_weight: parse_env_or("RELATION_CUE_WEIGHT", 0.4),
                relates_to_min_overlap: parse_env_or("RELATES_TO_MIN_OVERLAP", 2),
            },
            scoring: {
                let defaults = ScoringConfig::default();
                ScoringConfig {
                    similarity_weight: parse_env_or(
                        "SCORING_SIMILARITY_WEIGHT",
                        defaults.similarity_weight,
                    ),
                    quality_weight: parse_env_or("SCORING_QUALITY_WEIGHT", defaults.quality_weight),
                    confidence_weight: parse_env_or(
                        "SCORING_CONFIDENCE_WEIGHT",
                        defaults.confidence_weight,
                    ),
                    usage_weight: parse_env_or("SCORING_USAGE_WEIGHT", defaults.usage_weight),
                    recency_weight: parse_env_or("SCORING_RECENCY_WEIGHT", defaults.recency_weight),
                    half_life_days: parse_env_or("SCORING_HALF_LIFE_DAYS", defaults.half_life_days),
                }
            },
            query: QueryConfig {
                default_limit: parse_env_or("QUERY_DEFAULT_LIMIT", 10),
                candidate_pool: parse_env_or("QUERY_CANDIDATE_POOL", 100),
                min_similarity: parse_env_opt("QUERY_MIN_SIMILARITY").unwrap_or(0.0),
            },
            conflicts: ConflictConfig {
                mode: parse_env_or("CONFLICT_DETECTION_MODE", DetectionMode::Inline),
                semantic_pass: parse_env_or("CONFLICT_SEMANTIC_PASS", true),
                semantic_threshold: parse_env_or("CONFLICT_SEMANTIC_THRESHOLD", 0.9),
                semantic_neighbors: parse_env_or("CONFLICT_SEMANTIC_NEIGHBORS", 20),
                link_on_resolve: parse_env_or("CONFLICT_LINK_ON_RESOLVE", true),
            },
            retrieval: RetrievalConfig {
                max_depth: parse_env_or("RETRIEVAL_MAX_DEPTH", 3),
                node_budget: parse_env_or("RETRIEVAL_NODE_BUDGET", 50),
                time_budget_ms: parse_env_or("RETRIEVAL_TIME_BUDGET_MS", 250),
                max_edges_per_node: parse_env_or("RETRIEVAL_MAX_EDGES_PER_NODE", 64),
                max_paths: parse_env_or("RETRIEVAL_MAX_PATHS", 20),
                path_confidence: parse_env_or("RETRIEVAL_PATH_CONFIDENCE", PathConfidenceRule::Product),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known embedding providers that use OpenAI-compatible APIs
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "local"];

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Default endpoint for an OpenAI-compatible provider prefix.
pub fn provider_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "lmstudio" => "http://localhost:1234/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Parse an embedding model name into (provider, model) tuple.
///
/// `hash` (optionally `hash/<anything>`) selects the offline hashing embedder.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if model.eq_ignore_ascii_case("hash") {
        return ("hash", "");
    }
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if prefix_lower == "hash" || KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_scoring_defaults() {
        for var in [
            "SCORING_SIMILARITY_WEIGHT",
            "SCORING_QUALITY_WEIGHT",
            "SCORING_HALF_LIFE_DAYS",
        ] {
            std::env::remove_var(var);
        }

        let config = Config::default();
        assert_eq!(config.scoring.similarity_weight, 0.4);
        assert_eq!(config.scoring.quality_weight, 0.6);
        assert_eq!(config.scoring.confidence_weight, 0.5);
        assert_eq!(config.scoring.usage_weight, 0.3);
        assert_eq!(config.scoring.recency_weight, 0.2);
        assert_eq!(config.scoring.half_life_days, 30.0);
    }

    #[test]
    #[serial]
    fn test_scoring_from_env() {
        std::env::set_var("SCORING_HALF_LIFE_DAYS", "7");
        let config = Config::default();
        assert_eq!(config.scoring.half_life_days, 7.0);
        std::env::remove_var("SCORING_HALF_LIFE_DAYS");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_falls_back() {
        std::env::set_var("RETRIEVAL_NODE_BUDGET", "lots");
        let config = Config::default();
        assert_eq!(config.retrieval.node_budget, 50);
        std::env::remove_var("RETRIEVAL_NODE_BUDGET");
    }

    #[test]
    #[serial]
    fn test_llm_config_absent_without_model() {
        std::env::remove_var("LLM_MODEL");
        let config = Config::default();
        assert!(config.llm.is_none());

        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        let config = Config::default();
        let llm = config.llm.expect("llm config should be present");
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 30);
        std::env::remove_var("LLM_MODEL");
    }

    #[test]
    #[serial]
    fn test_conflict_mode_from_env() {
        std::env::set_var("CONFLICT_DETECTION_MODE", "background");
        let config = Config::default();
        assert_eq!(config.conflicts.mode, DetectionMode::Background);

        std::env::remove_var("CONFLICT_DETECTION_MODE");
        let config = Config::default();
        assert_eq!(config.conflicts.mode, DetectionMode::Inline);
    }

    #[test]
    #[serial]
    fn test_strategy_from_env() {
        std::env::set_var("EXTRACTION_STRATEGY", "model");
        std::env::set_var("RELATION_STRATEGY", "bogus");
        let config = Config::default();
        assert_eq!(config.extraction.strategy, StrategyKind::Model);
        assert_eq!(config.relations.strategy, StrategyKind::Rule);
        std::env::remove_var("EXTRACTION_STRATEGY");
        std::env::remove_var("RELATION_STRATEGY");
    }

    #[test]
    fn test_parse_provider_model() {
        assert_eq!(
            parse_provider_model("openai/text-embedding-3-small"),
            ("openai", "text-embedding-3-small")
        );
        assert_eq!(
            parse_provider_model("BAAI/bge-small-en-v1.5"),
            ("local", "BAAI/bge-small-en-v1.5")
        );
        assert_eq!(parse_provider_model("hash"), ("hash", ""));
        assert_eq!(parse_provider_model("hash/v1"), ("hash", "v1"));
    }

    #[test]
    fn test_parse_llm_provider_model() {
        assert_eq!(
            parse_llm_provider_model("ollama/llama3"),
            ("ollama", "llama3")
        );
        assert_eq!(parse_llm_provider_model("gpt-4o"), ("local", "gpt-4o"));
    }

    #[test]
    fn test_provider_base_url() {
        assert_eq!(provider_base_url("Ollama"), "http://localhost:11434/v1");
        assert_eq!(provider_base_url("openai"), "https://api.openai.com/v1");
        assert_eq!(provider_base_url("unknown"), "https://api.openai.com/v1");
    }
}
