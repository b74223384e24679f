use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::task::TaskTracker;

use crate::config::{Config, DetectionMode, QueryConfig};
use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::error::{Result, RmcError};
use crate::intelligence::{EntityExtractor, RelationBuilder};
use crate::models::{
    timestamp_now, validate_namespace, Claim, ClaimPatch, CreateEntryRequest, MemoryEntry, QueryFilter,
    QueryOptions, ScoredEntry, UpdatePatch, DEFAULT_ACTOR, DEFAULT_CONFIDENCE,
};

use super::conflicts::ConflictDetector;
use super::scoring::ScoringEngine;
use super::versions::successor_links;

/// Work that follows every committed write: relation inference and conflict
/// detection. Neither step can fail the write that triggered it.
#[derive(Clone)]
struct PostWrite {
    db: Arc<dyn DatabaseBackend>,
    relations: RelationBuilder,
    conflicts: Arc<dyn ConflictDetector>,
    candidate_limit: usize,
}

impl PostWrite {
    async fn run(&self, entry: &MemoryEntry) {
        self.link(entry).await;

        match self.conflicts.detect_on_write(entry).await {
            Ok(found) if !found.is_empty() => {
                tracing::info!(entry_id = %entry.id, conflicts = found.len(), "Write produced conflicts");
            }
            Ok(_) => {}
            Err(error) => {
                tracing::error!(entry_id = %entry.id, error = %error, "Conflict detection failed");
            }
        }
    }

    async fn link(&self, entry: &MemoryEntry) {
        let candidates = match self.db.relation_candidates(entry, self.candidate_limit).await {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::warn!(entry_id = %entry.id, error = %error, "Failed to load relation candidates");
                return;
            }
        };

        let relations = self.relations.build_relations(entry, &candidates).await;
        if relations.is_empty() {
            return;
        }
        match self.db.upsert_relations(&relations).await {
            Ok(inserted) => {
                tracing::debug!(entry_id = %entry.id, inserted, "Stored relations");
            }
            Err(error) => {
                tracing::warn!(entry_id = %entry.id, error = %error, "Failed to store relations");
            }
        }
    }
}

/// Append-only entry store: writes, similarity queries and usage tracking.
pub struct MemoryStore {
    db: Arc<dyn DatabaseBackend>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    scoring: ScoringEngine,
    query: QueryConfig,
    post_write: PostWrite,
    mode: DetectionMode,
    embed_timeout: Duration,
    tasks: TaskTracker,
}

impl MemoryStore {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        relations: RelationBuilder,
        conflicts: Arc<dyn ConflictDetector>,
        config: &Config,
    ) -> Self {
        let post_write = PostWrite {
            db: db.clone(),
            relations,
            conflicts,
            candidate_limit: config.relations.candidate_limit,
        };
        Self {
            db,
            embedder,
            extractor,
            scoring: ScoringEngine::new(config.scoring.clone()),
            query: config.query.clone(),
            post_write,
            mode: config.conflicts.mode,
            embed_timeout: Duration::from_secs(config.embeddings.timeout_secs.max(1)),
            tasks: TaskTracker::new(),
        }
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    pub async fn create(&self, request: CreateEntryRequest) -> Result<MemoryEntry> {
        request.check()?;
        let claim = Claim::from_parts(request.claim_key, request.claim_value)?;

        let extraction = self.extractor.extract(&request.content).await;
        let embedding = self.embed_passage(&request.content).await?;

        let id = nanoid::nanoid!();
        let entry = MemoryEntry {
            root_id: id.clone(),
            id,
            org_id: request.org_id,
            namespace: request.namespace,
            content_type: request.content_type,
            content: request.content,
            embedding,
            confidence: request.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            claim,
            extraction,
            parent_id: None,
            created_by: request
                .created_by
                .unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
            usage_count: 0,
            created_at: timestamp_now(),
        };

        self.db.create_entry(&entry).await?;
        tracing::info!(
            entry_id = %entry.id,
            org_id = %entry.org_id,
            namespace = %entry.namespace,
            entities = entry.extraction.entities.len(),
            "Created entry"
        );

        self.after_write(&entry).await;
        Ok(entry)
    }

    /// Writes a new version of `id`. The referenced row is never modified.
    pub async fn update(&self, id: &str, patch: UpdatePatch, actor: &str) -> Result<MemoryEntry> {
        patch.check()?;
        let previous = self.get(id).await?;

        let content = patch.content.unwrap_or_else(|| previous.content.clone());
        let (extraction, embedding) = if content == previous.content {
            (previous.extraction.clone(), previous.embedding.clone())
        } else {
            let extraction = self.extractor.extract(&content).await;
            (extraction, self.embed_passage(&content).await?)
        };

        let claim = match patch.claim {
            None => previous.claim.clone(),
            Some(ClaimPatch::Clear) => None,
            Some(ClaimPatch::Set { key, value }) => Claim::from_parts(Some(key), Some(value))?,
        };

        let (root_id, parent_id) = successor_links(&previous);
        let actor = if actor.trim().is_empty() {
            DEFAULT_ACTOR
        } else {
            actor
        };
        let entry = MemoryEntry {
            id: nanoid::nanoid!(),
            org_id: previous.org_id.clone(),
            namespace: previous.namespace.clone(),
            content_type: patch.content_type.unwrap_or_else(|| previous.content_type.clone()),
            content,
            embedding,
            confidence: patch.confidence.unwrap_or(previous.confidence),
            claim,
            extraction,
            root_id,
            parent_id: Some(parent_id),
            created_by: actor.to_string(),
            usage_count: 0,
            created_at: timestamp_now(),
        };

        self.db.create_entry(&entry).await?;
        tracing::info!(
            entry_id = %entry.id,
            parent_id = %previous.id,
            root_id = %entry.root_id,
            "Created entry version"
        );

        self.after_write(&entry).await;
        Ok(entry)
    }

    pub async fn get(&self, id: &str) -> Result<MemoryEntry> {
        self.db
            .get_entry(id)
            .await?
            .ok_or_else(|| RmcError::NotFound(format!("Entry {id} not found")))
    }

    /// Ranks entries in the filter's scope against `text`. Ordered by base
    /// score descending, then id ascending.
    pub async fn query(
        &self,
        filter: &QueryFilter,
        text: &str,
        options: QueryOptions,
    ) -> Result<Vec<ScoredEntry>> {
        if filter.org_id.trim().is_empty() {
            return Err(RmcError::Validation("org_id is required".to_string()));
        }
        if let Some(namespace) = &filter.namespace {
            validate_namespace(namespace).map_err(RmcError::Validation)?;
        }
        if text.trim().is_empty() {
            return Err(RmcError::Validation("query text must not be blank".to_string()));
        }

        let limit = filter.limit.unwrap_or(self.query.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let min_similarity = filter.min_similarity.unwrap_or(self.query.min_similarity);
        let pool = self.query.candidate_pool.max(limit);

        let embedding = self.embed_query(text).await?;
        let hits = self
            .db
            .search_entries(&embedding, filter, min_similarity, pool)
            .await?;
        let candidates = hits.len();

        let mut ranked = self.scoring.rank(hits, Utc::now());
        ranked.truncate(limit);

        if options.record_usage && !ranked.is_empty() {
            let ids: Vec<String> = ranked.iter().map(|s| s.entry.id.clone()).collect();
            let counts = self.db.increment_usage(&ids).await?;
            for scored in &mut ranked {
                if let Some(&count) = counts.get(&scored.entry.id) {
                    scored.entry.usage_count = count;
                }
            }
        }

        tracing::debug!(
            org_id = %filter.org_id,
            candidates,
            returned = ranked.len(),
            "Query ranked"
        );
        Ok(ranked)
    }

    /// Waits for background post-write work spawned so far.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    async fn after_write(&self, entry: &MemoryEntry) {
        match self.mode {
            DetectionMode::Inline => self.post_write.run(entry).await,
            DetectionMode::Background => {
                let post_write = self.post_write.clone();
                let entry = entry.clone();
                self.tasks.spawn(async move {
                    post_write.run(&entry).await;
                });
            }
        }
    }

    async fn embed_passage(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.embed_timeout, self.embedder.embed_passage(text))
            .await
            .map_err(|_| self.timed_out())?
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.embed_timeout, self.embedder.embed_query(text))
            .await
            .map_err(|_| self.timed_out())?
    }

    fn timed_out(&self) -> RmcError {
        RmcError::EmbeddingProvider(format!(
            "embedding timed out after {}s",
            self.embed_timeout.as_secs()
        ))
    }
}
