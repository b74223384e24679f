#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmc::config::{Config, DetectionMode, StrategyKind};
use rmc::db::{Database, DatabaseBackend, LibSqlBackend};
use rmc::embeddings::Embedder;
use rmc::llm::LlmProvider;
use rmc::models::{CreateEntryRequest, MemoryEntry};
use rmc::services::ConflictDetector;
use rmc::Rmc;
use tempfile::TempDir;

pub const DIMS: usize = 8;
pub const ORG: &str = "org-test";
pub const NAMESPACE: &str = "acme/eng";

/// Embedder with hand-picked vectors. Unregistered text maps to the first
/// basis vector, so unrelated entries are all perfectly similar to each
/// other and to unregistered queries.
#[derive(Default)]
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), DIMS, "test vectors must have {DIMS} dimensions");
        self.vectors.insert(text.to_string(), vector);
        self
    }

    fn lookup(&self, text: &str) -> Vec<f32> {
        self.vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| basis(0))
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_passage(&self, passage: &str) -> rmc::Result<Vec<f32>> {
        Ok(self.lookup(passage))
    }

    async fn embed_query(&self, query: &str) -> rmc::Result<Vec<f32>> {
        Ok(self.lookup(query))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Unit vector along axis `i`.
pub fn basis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[i] = 1.0;
    v
}

/// Unit vector in the plane of axes 0 and 1 at cosine `cos` from axis 0.
pub fn at_cosine(cos: f32) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

pub struct TestRmc {
    pub rmc: Rmc,
    pub db: Arc<dyn DatabaseBackend>,
    _dir: TempDir,
}

impl std::ops::Deref for TestRmc {
    type Target = Rmc;

    fn deref(&self) -> &Rmc {
        &self.rmc
    }
}

/// Configuration with rule-based strategies, inline detection and no LLM,
/// regardless of the environment.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.url = format!("file:{}", dir.path().join("rmc_test.db").display());
    config.database.auth_token = None;
    config.database.local_path = None;
    config.embeddings.model = "hash".to_string();
    config.embeddings.dimensions = DIMS;
    config.llm = None;
    config.extraction.strategy = StrategyKind::Rule;
    config.relations.strategy = StrategyKind::Rule;
    config.conflicts.mode = DetectionMode::Inline;
    config.conflicts.semantic_pass = true;
    config.conflicts.link_on_resolve = true;
    config.query.default_limit = 10;
    config.query.candidate_pool = 100;
    config.query.min_similarity = 0.0;
    config
}

pub async fn open_with(embedder: FixedEmbedder, tweak: impl FnOnce(&mut Config)) -> TestRmc {
    open_custom(Arc::new(embedder), tweak, None).await
}

/// Opens a store over any embedder, optionally replacing the conflict
/// detector the store reports writes to.
pub async fn open_custom(
    embedder: Arc<dyn Embedder>,
    tweak: impl FnOnce(&mut Config),
    detector: Option<Arc<dyn ConflictDetector>>,
) -> TestRmc {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(&dir);
    tweak(&mut config);

    let database = Database::new(&config.database, DIMS)
        .await
        .expect("Failed to open test database");
    let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(database));
    let llm = LlmProvider::unavailable("tests run without a model");
    let rmc = match detector {
        Some(detector) => Rmc::with_detector(config, db.clone(), embedder, llm, detector),
        None => Rmc::with_components(config, db.clone(), embedder, llm),
    };
    TestRmc { rmc, db, _dir: dir }
}

pub async fn open() -> TestRmc {
    open_with(FixedEmbedder::new(), |_| {}).await
}

/// Relation inference off, so tests control the graph exactly.
pub fn no_auto_relations(config: &mut Config) {
    config.relations.min_strength = 2.0;
}

pub fn request(content: &str) -> CreateEntryRequest {
    CreateEntryRequest::new(ORG, NAMESPACE, "fact", content)
}

pub async fn create(rmc: &Rmc, content: &str) -> MemoryEntry {
    rmc.create(request(content)).await.expect("create failed")
}
