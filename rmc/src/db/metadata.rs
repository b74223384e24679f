use libsql::Connection;

use crate::error::{Result, RmcError};
use crate::models::{format_timestamp, timestamp_now};

const EMBEDDING_DIMENSIONS_KEY: &str = "embedding_dimensions";

/// Key/value settings stored next to the data in `rmc_meta`.
pub struct MetadataRepository;

impl MetadataRepository {
    pub async fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let mut rows = conn
            .query("SELECT value FROM rmc_meta WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get::<String>(0)?))
        } else {
            Ok(None)
        }
    }

    pub async fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = format_timestamp(&timestamp_now());
        conn.execute(
            "INSERT INTO rmc_meta (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value, &now],
        )
        .await?;
        Ok(())
    }

    /// Records the vector width on first open; afterwards a different width
    /// is a configuration error because stored vectors cannot be compared
    /// against it.
    pub async fn ensure_embedding_dimensions(conn: &Connection, dims: usize) -> Result<()> {
        let stored = Self::get(conn, EMBEDDING_DIMENSIONS_KEY).await?;
        match stored.as_deref().map(str::parse::<usize>) {
            None => {
                tracing::info!(dimensions = dims, "Recording embedding dimensions");
                Self::set(conn, EMBEDDING_DIMENSIONS_KEY, &dims.to_string()).await
            }
            Some(Ok(stored)) if stored == dims => Ok(()),
            Some(Ok(stored)) => Err(RmcError::Config(format!(
                "Embedding dimension mismatch: store was created with {stored}, configuration requests {dims}"
            ))),
            Some(Err(_)) => Err(RmcError::Config(format!(
                "Stored embedding dimensions are unreadable: {:?}",
                stored.unwrap_or_default()
            ))),
        }
    }
}
