use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConflictConfig;
use crate::db::DatabaseBackend;
use crate::error::{Result, RmcError};
use crate::intelligence::ContradictionDetector;
use crate::models::{
    timestamp_now, ConflictFilter, ConflictResolution, ConflictStatus, ConflictType, MemoryConflict, MemoryEntry,
    MemoryRelation, RelationType, ResolutionKind, ResolutionStrategy,
};

/// Post-write contradiction detection and the conflict lifecycle
/// (`pending` to `resolved` or `dismissed`).
#[async_trait]
pub trait ConflictDetector: Send + Sync {
    /// Records pending conflicts for `entry`. Returns only conflicts created
    /// by this call; pairs that already have a conflict are skipped.
    async fn detect_on_write(&self, entry: &MemoryEntry) -> Result<Vec<MemoryConflict>>;

    async fn resolve(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        actor: &str,
    ) -> Result<MemoryConflict>;

    async fn dismiss(&self, conflict_id: &str, actor: &str, reason: Option<&str>) -> Result<MemoryConflict>;

    async fn get_conflict(&self, conflict_id: &str) -> Result<MemoryConflict>;

    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>>;
}

/// [`ConflictDetector`] over any [`DatabaseBackend`].
#[derive(Clone)]
pub struct StoreConflictDetector {
    db: Arc<dyn DatabaseBackend>,
    config: ConflictConfig,
    heuristics: ContradictionDetector,
}

impl StoreConflictDetector {
    pub fn new(db: Arc<dyn DatabaseBackend>, config: ConflictConfig) -> Self {
        Self {
            db,
            config,
            heuristics: ContradictionDetector::new(),
        }
    }

    async fn record(&self, entry: &MemoryEntry, other: &MemoryEntry, conflict_type: ConflictType) -> Result<Option<MemoryConflict>> {
        let conflict = MemoryConflict::pending(&entry.org_id, &entry.namespace, &entry.id, &other.id, conflict_type);
        if !self.db.insert_conflict(&conflict).await? {
            tracing::debug!(
                memory_id_1 = %conflict.memory_id_1,
                memory_id_2 = %conflict.memory_id_2,
                %conflict_type,
                "Conflict already recorded"
            );
            return Ok(None);
        }
        tracing::info!(
            conflict_id = %conflict.id,
            memory_id_1 = %conflict.memory_id_1,
            memory_id_2 = %conflict.memory_id_2,
            %conflict_type,
            "Conflict detected"
        );
        Ok(Some(conflict))
    }

    async fn claim_pass(&self, entry: &MemoryEntry) -> Result<Vec<MemoryConflict>> {
        if entry.claim.is_none() {
            return Ok(Vec::new());
        }
        let mut created = Vec::new();
        for rival in self.db.find_claim_rivals(entry).await? {
            if let Some(conflict) = self.record(entry, &rival, ConflictType::ClaimValueMismatch).await? {
                created.push(conflict);
            }
        }
        Ok(created)
    }

    async fn semantic_pass(&self, entry: &MemoryEntry) -> Result<Vec<MemoryConflict>> {
        if !self.config.semantic_pass || entry.claim.is_some() || entry.embedding.is_empty() {
            return Ok(Vec::new());
        }
        let neighbors = self
            .db
            .find_semantic_neighbors(entry, self.config.semantic_threshold, self.config.semantic_neighbors)
            .await?;

        let mut created = Vec::new();
        for hit in neighbors {
            let check = self.heuristics.check_contradiction(&hit.entry.content, &entry.content);
            if !check.is_likely() {
                continue;
            }
            tracing::debug!(
                entry_id = %entry.id,
                neighbor_id = %hit.entry.id,
                similarity = hit.similarity,
                "Contradiction cue between near-duplicates"
            );
            if let Some(conflict) = self.record(entry, &hit.entry, ConflictType::SemanticContradiction).await? {
                created.push(conflict);
            }
        }
        Ok(created)
    }

    async fn load_pending(&self, conflict_id: &str) -> Result<MemoryConflict> {
        let conflict = self.get_conflict(conflict_id).await?;
        if !conflict.is_pending() {
            return Err(RmcError::Validation(format!(
                "Conflict {conflict_id} is already {}",
                conflict.status
            )));
        }
        Ok(conflict)
    }

    /// Picks the winner of the pair. Returns (winner, loser).
    async fn pick_winner(
        &self,
        conflict: &MemoryConflict,
        strategy: &ResolutionStrategy,
    ) -> Result<(String, String)> {
        let pair = [conflict.memory_id_1.clone(), conflict.memory_id_2.clone()];
        let other = |winner: &str| {
            if winner == pair[0] {
                pair[1].clone()
            } else {
                pair[0].clone()
            }
        };

        match strategy {
            ResolutionStrategy::Manual { winner_id } => {
                if !conflict.involves(winner_id) {
                    return Err(RmcError::Validation(format!(
                        "Winner {winner_id} is not part of conflict {}",
                        conflict.id
                    )));
                }
                Ok((winner_id.clone(), other(winner_id)))
            }
            ResolutionStrategy::HighestConfidence => {
                let entries = self.db.get_entries(&pair).await?;
                let [a, b] = entries.as_slice() else {
                    return Err(RmcError::NotFound(format!(
                        "Entries of conflict {} no longer exist",
                        conflict.id
                    )));
                };
                match a.confidence.total_cmp(&b.confidence) {
                    std::cmp::Ordering::Greater => Ok((a.id.clone(), b.id.clone())),
                    std::cmp::Ordering::Less => Ok((b.id.clone(), a.id.clone())),
                    std::cmp::Ordering::Equal => self.most_recent(&pair, &conflict.id).await,
                }
            }
            ResolutionStrategy::MostRecent => self.most_recent(&pair, &conflict.id).await,
        }
    }

    async fn most_recent(&self, pair: &[String; 2], conflict_id: &str) -> Result<(String, String)> {
        let ordered = self.db.creation_order(pair).await?;
        match ordered.as_slice() {
            [older, newer] => Ok((newer.clone(), older.clone())),
            _ => Err(RmcError::NotFound(format!(
                "Entries of conflict {conflict_id} no longer exist"
            ))),
        }
    }

    async fn close(&self, conflict: MemoryConflict, status: ConflictStatus, resolution: ConflictResolution) -> Result<MemoryConflict> {
        let resolved_at = timestamp_now();
        if !self
            .db
            .close_conflict(&conflict.id, status, &resolution, resolved_at)
            .await?
        {
            return Err(RmcError::Validation(format!(
                "Conflict {} was closed concurrently",
                conflict.id
            )));
        }
        Ok(MemoryConflict {
            status,
            resolved_at: Some(resolved_at),
            resolution: Some(resolution),
            ..conflict
        })
    }
}

#[async_trait]
impl ConflictDetector for StoreConflictDetector {
    async fn detect_on_write(&self, entry: &MemoryEntry) -> Result<Vec<MemoryConflict>> {
        let mut created = self
            .claim_pass(entry)
            .await
            .map_err(|e| RmcError::ConflictDetection(format!("claim check for {}: {e}", entry.id)))?;

        match self.semantic_pass(entry).await {
            Ok(found) => created.extend(found),
            Err(error) => {
                tracing::warn!(entry_id = %entry.id, error = %error, "Semantic contradiction pass failed");
            }
        }
        Ok(created)
    }

    async fn resolve(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        actor: &str,
    ) -> Result<MemoryConflict> {
        let conflict = self.load_pending(conflict_id).await?;
        let (winner, loser) = self.pick_winner(&conflict, &strategy).await?;

        let resolution = ConflictResolution {
            kind: strategy.kind(),
            winner_id: Some(winner.clone()),
            loser_id: Some(loser.clone()),
            resolved_by: actor.to_string(),
            note: None,
        };
        let resolved = self.close(conflict, ConflictStatus::Resolved, resolution).await?;
        tracing::info!(conflict_id = %resolved.id, winner = %winner, strategy = ?strategy.kind(), "Conflict resolved");

        if self.config.link_on_resolve {
            let edge = MemoryRelation::new(
                winner,
                loser,
                RelationType::Contradicts,
                1.0,
                format!("conflict {} resolved", resolved.id),
            );
            if let Err(error) = self.db.upsert_relations(&[edge]).await {
                tracing::warn!(conflict_id = %resolved.id, error = %error, "Failed to link resolved conflict");
            }
        }
        Ok(resolved)
    }

    async fn dismiss(&self, conflict_id: &str, actor: &str, reason: Option<&str>) -> Result<MemoryConflict> {
        let conflict = self.load_pending(conflict_id).await?;
        let resolution = ConflictResolution {
            kind: ResolutionKind::Dismissed,
            winner_id: None,
            loser_id: None,
            resolved_by: actor.to_string(),
            note: reason.map(str::to_string),
        };
        let dismissed = self.close(conflict, ConflictStatus::Dismissed, resolution).await?;
        tracing::info!(conflict_id = %dismissed.id, "Conflict dismissed");
        Ok(dismissed)
    }

    async fn get_conflict(&self, conflict_id: &str) -> Result<MemoryConflict> {
        self.db
            .get_conflict(conflict_id)
            .await?
            .ok_or_else(|| RmcError::NotFound(format!("Conflict {conflict_id} not found")))
    }

    async fn list_conflicts(&self, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>> {
        self.db.list_conflicts(filter).await
    }
}
