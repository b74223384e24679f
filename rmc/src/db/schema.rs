use libsql::Connection;

use crate::error::Result;

/// Creates tables and indexes. The embedding column width is fixed at creation
/// time; `MetadataRepository` records it so later runs can detect a mismatch.
pub async fn init_schema(conn: &Connection, dimensions: usize) -> Result<()> {
    let ddl = format!(
        r#"
        -- Memory entries; rows are append-only apart from usage_count
        CREATE TABLE IF NOT EXISTS memory_entries (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            namespace TEXT NOT NULL,
            content_type TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding F32_BLOB({dimensions}),
            confidence REAL NOT NULL DEFAULT 1.0,
            claim_key TEXT,
            claim_value TEXT,
            entities TEXT NOT NULL DEFAULT '[]',
            concepts TEXT NOT NULL DEFAULT '[]',
            topics TEXT NOT NULL DEFAULT '[]',
            claims TEXT NOT NULL DEFAULT '[]',
            root_id TEXT NOT NULL,
            parent_id TEXT,
            created_by TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            CHECK ((claim_key IS NULL) = (claim_value IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_entries_scope ON memory_entries(org_id, namespace);
        CREATE INDEX IF NOT EXISTS idx_entries_root ON memory_entries(root_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_entries_parent ON memory_entries(parent_id);
        CREATE INDEX IF NOT EXISTS idx_entries_claim ON memory_entries(org_id, namespace, claim_key);

        -- Typed edges between entries
        CREATE TABLE IF NOT EXISTS memory_relations (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            relation_type TEXT NOT NULL,
            strength REAL NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            inferred_by TEXT NOT NULL DEFAULT 'rule',
            entity_overlap INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            PRIMARY KEY (source_id, target_id, relation_type)
        );

        CREATE INDEX IF NOT EXISTS idx_relations_target ON memory_relations(target_id);

        -- Competing claims; one row per canonical pair and type
        CREATE TABLE IF NOT EXISTS memory_conflicts (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            namespace TEXT NOT NULL,
            memory_id_1 TEXT NOT NULL,
            memory_id_2 TEXT NOT NULL,
            conflict_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            detected_at TEXT NOT NULL,
            resolved_at TEXT,
            resolution TEXT,
            UNIQUE (memory_id_1, memory_id_2, conflict_type),
            CHECK (memory_id_1 < memory_id_2)
        );

        CREATE INDEX IF NOT EXISTS idx_conflicts_scope ON memory_conflicts(org_id, namespace, status);

        -- Store-level metadata (embedding dimensions etc.)
        CREATE TABLE IF NOT EXISTS rmc_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#
    );

    conn.execute_batch(&ddl).await?;
    create_vector_indexes(conn).await?;

    Ok(())
}

async fn create_vector_indexes(conn: &Connection) -> Result<()> {
    let index_exists: bool = conn
        .query(
            "SELECT 1 FROM sqlite_master WHERE type='index' AND name='memory_entries_embedding_idx'",
            (),
        )
        .await?
        .next()
        .await?
        .is_some();

    if !index_exists {
        if let Err(e) = conn
            .execute(
                "CREATE INDEX IF NOT EXISTS memory_entries_embedding_idx ON memory_entries(libsql_vector_idx(embedding))",
                (),
            )
            .await
        {
            tracing::warn!(
                error = %e,
                "Failed to create vector index on memory_entries; similarity search falls back to a scan"
            );
        }
    }

    Ok(())
}
