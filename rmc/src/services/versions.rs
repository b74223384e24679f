use std::sync::Arc;

use crate::db::DatabaseBackend;
use crate::error::{Result, RmcError};
use crate::models::{MemoryEntry, RootViolation};

/// Root and parent links for the row that supersedes `previous`.
pub fn successor_links(previous: &MemoryEntry) -> (String, String) {
    let root_id = if previous.is_root() {
        previous.id.clone()
    } else {
        previous.root_id.clone()
    };
    (root_id, previous.id.clone())
}

/// Read side of the version trees: chains, latest versions and the
/// root-linkage invariant.
#[derive(Clone)]
pub struct VersionTreeManager {
    db: Arc<dyn DatabaseBackend>,
}

impl VersionTreeManager {
    pub fn new(db: Arc<dyn DatabaseBackend>) -> Self {
        Self { db }
    }

    /// All versions sharing `id`'s root, oldest to newest. Any member of the
    /// chain may be passed.
    pub async fn get_version_chain(&self, id: &str) -> Result<Vec<MemoryEntry>> {
        let entry = self
            .db
            .get_entry(id)
            .await?
            .ok_or_else(|| RmcError::NotFound(format!("Entry {id} not found")))?;

        let chain = self.db.get_version_chain(&entry.root_id).await?;
        if chain.is_empty() {
            return Err(RmcError::NotFound(format!(
                "Version chain rooted at {} not found",
                entry.root_id
            )));
        }
        Ok(chain)
    }

    pub async fn get_latest_version(&self, id: &str) -> Result<MemoryEntry> {
        self.get_version_chain(id)
            .await?
            .pop()
            .ok_or_else(|| RmcError::NotFound(format!("Entry {id} not found")))
    }

    /// Entries whose root or parent linkage is broken. Empty when the store is
    /// consistent.
    pub async fn check_invariants(&self) -> Result<Vec<RootViolation>> {
        let violations = self.db.find_root_violations().await?;
        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "Version tree invariant violations found");
        }
        Ok(violations)
    }
}
