use crate::db::connection::Database;
use crate::db::repository::{ConflictRepository, EntryRepository, RelationRepository};
use crate::db::traits::{ConflictStore, DatabaseBackend, EntryStore, RelationStore};
use crate::db::EntrySearchHit;
use crate::error::Result;
use crate::models::{
    ConflictFilter, ConflictResolution, ConflictStatus, ConflictType, MemoryConflict, MemoryEntry,
    MemoryRelation, QueryFilter, RelationType, RootViolation,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntryStore for LibSqlBackend {
    async fn create_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let conn = self.db.connect()?;
        EntryRepository::create(&conn, entry).await
    }
    async fn get_entry(&self, id: &str) -> Result<Option<MemoryEntry>> {
        let conn = self.db.connect()?;
        EntryRepository::get_by_id(&conn, id).await
    }
    async fn get_entries(&self, ids: &[String]) -> Result<Vec<MemoryEntry>> {
        let conn = self.db.connect()?;
        EntryRepository::get_by_ids(&conn, ids).await
    }
    async fn search_entries(
        &self,
        embedding: &[f32],
        filter: &QueryFilter,
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<EntrySearchHit>> {
        let conn = self.db.connect()?;
        EntryRepository::search_similar(&conn, embedding, filter, min_similarity, limit).await
    }
    async fn increment_usage(&self, ids: &[String]) -> Result<HashMap<String, u64>> {
        let conn = self.db.connect()?;
        EntryRepository::increment_usage(&conn, ids).await
    }
    async fn find_claim_rivals(&self, entry: &MemoryEntry) -> Result<Vec<MemoryEntry>> {
        let conn = self.db.connect()?;
        EntryRepository::find_claim_rivals(&conn, entry).await
    }
    async fn find_semantic_neighbors(
        &self,
        entry: &MemoryEntry,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<EntrySearchHit>> {
        let conn = self.db.connect()?;
        EntryRepository::find_semantic_neighbors(&conn, entry, threshold, limit).await
    }
    async fn relation_candidates(
        &self,
        entry: &MemoryEntry,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let conn = self.db.connect()?;
        EntryRepository::relation_candidates(&conn, entry, limit).await
    }
    async fn get_version_chain(&self, root_id: &str) -> Result<Vec<MemoryEntry>> {
        let conn = self.db.connect()?;
        EntryRepository::get_version_chain(&conn, root_id).await
    }
    async fn creation_order(&self, ids: &[String]) -> Result<Vec<String>> {
        let conn = self.db.connect()?;
        EntryRepository::creation_order(&conn, ids).await
    }
    async fn find_root_violations(&self) -> Result<Vec<RootViolation>> {
        let conn = self.db.connect()?;
        EntryRepository::find_root_violations(&conn).await
    }
}

#[async_trait]
impl RelationStore for LibSqlBackend {
    async fn upsert_relations(&self, relations: &[MemoryRelation]) -> Result<u64> {
        let conn = self.db.connect()?;
        RelationRepository::upsert_batch(&conn, relations).await
    }
    async fn relations_for(
        &self,
        id: &str,
        types: &[RelationType],
        limit: usize,
    ) -> Result<Vec<MemoryRelation>> {
        let conn = self.db.connect()?;
        RelationRepository::list_for_entry(&conn, id, types, limit).await
    }
    async fn get_relation(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
    ) -> Result<Option<MemoryRelation>> {
        let conn = self.db.connect()?;
        RelationRepository::get(&conn, source_id, target_id, relation_type).await
    }
}

#[async_trait]
impl ConflictStore for LibSqlBackend {
    async fn insert_conflict(&self, conflict: &MemoryConflict) -> Result<bool> {
        let conn = self.db.connect()?;
        ConflictRepository::insert_if_absent(&conn, conflict).await
    }
    async fn get_conflict(&self, id: &str) -> Result<Option<MemoryConflict>> {
        let conn = self.db.connect()?;
        ConflictRepository::get_by_id(&conn, id).await
    }
    async fn get_conflict_for_pair(
        &self,
        memory_id_1: &str,
        memory_id_2: &str,
        conflict_type: ConflictType,
    ) -> Result<Option<MemoryConflict>> {
        let conn = self.db.connect()?;
        ConflictRepository::get_for_pair(&conn, memory_id_1, memory_id_2, conflict_type).await
    }
    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>> {
        let conn = self.db.connect()?;
        ConflictRepository::list(&conn, filter).await
    }
    async fn close_conflict(
        &self,
        id: &str,
        status: ConflictStatus,
        resolution: &ConflictResolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.db.connect()?;
        ConflictRepository::close(&conn, id, status, resolution, resolved_at).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }
}
