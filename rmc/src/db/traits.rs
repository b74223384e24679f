use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::EntrySearchHit;
use crate::error::Result;
use crate::models::{
    ConflictFilter, ConflictResolution, ConflictStatus, ConflictType, MemoryConflict, MemoryEntry,
    MemoryRelation, QueryFilter, RelationType, RootViolation,
};

// ---------------------------------------------------------------------------
// Individual store traits
// ---------------------------------------------------------------------------

/// Append-only storage and vector search for memory entries.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn create_entry(&self, entry: &MemoryEntry) -> Result<()>;
    async fn get_entry(&self, id: &str) -> Result<Option<MemoryEntry>>;
    async fn get_entries(&self, ids: &[String]) -> Result<Vec<MemoryEntry>>;
    async fn search_entries(
        &self,
        embedding: &[f32],
        filter: &QueryFilter,
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<EntrySearchHit>>;

    /// Increment usage counters and return the post-increment values.
    async fn increment_usage(&self, ids: &[String]) -> Result<HashMap<String, u64>>;

    async fn find_claim_rivals(&self, entry: &MemoryEntry) -> Result<Vec<MemoryEntry>>;
    async fn find_semantic_neighbors(
        &self,
        entry: &MemoryEntry,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<EntrySearchHit>>;
    async fn relation_candidates(
        &self,
        entry: &MemoryEntry,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>>;

    async fn get_version_chain(&self, root_id: &str) -> Result<Vec<MemoryEntry>>;
    /// `ids` oldest first, ties broken by insertion sequence.
    async fn creation_order(&self, ids: &[String]) -> Result<Vec<String>>;
    async fn find_root_violations(&self) -> Result<Vec<RootViolation>>;
}

/// Typed edges between entries.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Insert edges not yet present. Returns how many were new.
    async fn upsert_relations(&self, relations: &[MemoryRelation]) -> Result<u64>;
    async fn relations_for(
        &self,
        id: &str,
        types: &[RelationType],
        limit: usize,
    ) -> Result<Vec<MemoryRelation>>;
    async fn get_relation(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
    ) -> Result<Option<MemoryRelation>>;
}

/// Conflict records and their status transitions.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Returns false when the canonical pair already has a conflict of this type.
    async fn insert_conflict(&self, conflict: &MemoryConflict) -> Result<bool>;
    async fn get_conflict(&self, id: &str) -> Result<Option<MemoryConflict>>;
    async fn get_conflict_for_pair(
        &self,
        memory_id_1: &str,
        memory_id_2: &str,
        conflict_type: ConflictType,
    ) -> Result<Option<MemoryConflict>>;
    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>>;

    /// Returns false when the conflict was no longer pending.
    async fn close_conflict(
        &self,
        id: &str,
        status: ConflictStatus,
        resolution: &ConflictResolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// A complete database backend that combines all store traits plus lifecycle
/// operations.
#[async_trait]
pub trait DatabaseBackend: EntryStore + RelationStore + ConflictStore {
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;
}
