use std::sync::Arc;

use crate::config::Config;
use crate::db::{Database, DatabaseBackend, LibSqlBackend};
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::error::Result;
use crate::intelligence::{build_extractor, RelationBuilder};
use crate::llm::LlmProvider;
use crate::models::{
    ConflictFilter, CreateEntryRequest, MemoryConflict, MemoryEntry, QueryFilter, QueryOptions,
    ResolutionStrategy, RetrievalResult, RetrieveOptions, RootViolation, ScoredEntry, UpdatePatch,
};
use crate::services::{
    ConflictDetector, MemoryStore, RmcRetriever, StoreConflictDetector, VersionTreeManager,
};

/// The relational memory cache with all collaborators wired from one
/// [`Config`].
#[derive(Clone)]
pub struct Rmc {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseBackend>,
    pub store: Arc<MemoryStore>,
    pub conflicts: Arc<dyn ConflictDetector>,
    pub versions: VersionTreeManager,
    pub retriever: RmcRetriever,
}

impl Rmc {
    /// Opens the configured store and embedding model. Fails with a
    /// configuration error when the store was created with a different
    /// embedding width.
    pub async fn open(config: Config) -> Result<Self> {
        tracing::info!(model = %config.embeddings.model, "Loading embedding provider");
        let embeddings = EmbeddingProvider::new(&config.embeddings)?;

        tracing::info!(url = %config.database.url, "Initializing database");
        let database = Database::new(&config.database, embeddings.dimensions()).await?;
        let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(database));

        let llm = LlmProvider::new(config.llm.as_ref());
        if !llm.is_available() {
            tracing::debug!("LLM unavailable, rule-based strategies only");
        }

        Ok(Self::with_components(config, db, Arc::new(embeddings), llm))
    }

    /// Wires the services over caller-supplied collaborators.
    pub fn with_components(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        llm: LlmProvider,
    ) -> Self {
        let conflicts: Arc<dyn ConflictDetector> =
            Arc::new(StoreConflictDetector::new(db.clone(), config.conflicts.clone()));
        Self::with_detector(config, db, embedder, llm, conflicts)
    }

    /// Same as [`Rmc::with_components`], with `conflicts` receiving every
    /// committed write and serving the conflict lifecycle calls.
    pub fn with_detector(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        llm: LlmProvider,
        conflicts: Arc<dyn ConflictDetector>,
    ) -> Self {
        let config = Arc::new(config);
        let extractor = build_extractor(&config.extraction, &llm);
        let relations = RelationBuilder::from_config(&config.relations, &llm);

        let store = Arc::new(MemoryStore::new(
            db.clone(),
            embedder,
            extractor,
            relations,
            conflicts.clone(),
            &config,
        ));
        let versions = VersionTreeManager::new(db.clone());
        let retriever = RmcRetriever::new(store.clone(), db.clone(), config.retrieval.clone());

        Self {
            config,
            db,
            store,
            conflicts,
            versions,
            retriever,
        }
    }

    pub async fn create(&self, request: CreateEntryRequest) -> Result<MemoryEntry> {
        self.store.create(request).await
    }

    pub async fn update(&self, id: &str, patch: UpdatePatch, actor: &str) -> Result<MemoryEntry> {
        self.store.update(id, patch, actor).await
    }

    pub async fn get(&self, id: &str) -> Result<MemoryEntry> {
        self.store.get(id).await
    }

    pub async fn query(&self, filter: &QueryFilter, text: &str) -> Result<Vec<ScoredEntry>> {
        self.store.query(filter, text, QueryOptions::default()).await
    }

    pub async fn retrieve(
        &self,
        filter: &QueryFilter,
        text: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrievalResult> {
        self.retriever.retrieve(filter, text, options).await
    }

    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        actor: &str,
    ) -> Result<MemoryConflict> {
        self.conflicts.resolve(conflict_id, strategy, actor).await
    }

    pub async fn dismiss_conflict(
        &self,
        conflict_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<MemoryConflict> {
        self.conflicts.dismiss(conflict_id, actor, reason).await
    }

    pub async fn get_conflict(&self, conflict_id: &str) -> Result<MemoryConflict> {
        self.conflicts.get_conflict(conflict_id).await
    }

    pub async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>> {
        self.conflicts.list_conflicts(filter).await
    }

    pub async fn get_version_chain(&self, id: &str) -> Result<Vec<MemoryEntry>> {
        self.versions.get_version_chain(id).await
    }

    pub async fn get_latest_version(&self, id: &str) -> Result<MemoryEntry> {
        self.versions.get_latest_version(id).await
    }

    pub async fn check_invariants(&self) -> Result<Vec<RootViolation>> {
        self.versions.check_invariants().await
    }

    /// Waits for background post-write work, then syncs remote replicas.
    pub async fn drain(&self) -> Result<()> {
        self.store.drain().await;
        self.db.sync().await
    }
}
