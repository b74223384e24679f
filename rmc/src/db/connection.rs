use std::sync::Arc;
use std::time::Duration;

use libsql::{Builder, Connection};

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::{schema, MetadataRepository};

/// Where the store lives, derived from `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    File(String),
    Remote { url: String, token: String },
    Replica { path: String, url: String, token: String },
}

impl Location {
    fn from_config(config: &DatabaseConfig) -> Self {
        let url = config.url.trim();
        if url.starts_with("libsql://") || url.starts_with("https://") {
            let token = config.auth_token.clone().unwrap_or_default();
            return match &config.local_path {
                Some(path) => Self::Replica {
                    path: path.clone(),
                    url: url.to_string(),
                    token,
                },
                None => Self::Remote {
                    url: url.to_string(),
                    token,
                },
            };
        }
        if url == ":memory:" {
            return Self::Memory;
        }
        Self::File(url.strip_prefix("file:").unwrap_or(url).to_string())
    }

    async fn open(self) -> Result<libsql::Database> {
        let db = match self {
            Self::Memory => Builder::new_local(":memory:").build().await?,
            Self::File(path) => Builder::new_local(path).build().await?,
            Self::Remote { url, token } => Builder::new_remote(url, token).build().await?,
            Self::Replica { path, url, token } => {
                Builder::new_remote_replica(path, url, token).build().await?
            }
        };
        Ok(db)
    }
}

/// SQLite pragmas applied once at startup, validated against the values
/// SQLite accepts so a typo cannot be interpolated into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pragmas {
    journal_mode: &'static str,
    synchronous: &'static str,
}

impl Pragmas {
    fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            journal_mode: pick(
                &config.journal_mode,
                &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"],
                "WAL",
            ),
            synchronous: pick(&config.synchronous, &["OFF", "NORMAL", "FULL", "EXTRA"], "NORMAL"),
        }
    }

    async fn apply(&self, conn: &Connection) {
        for (name, value) in [("journal_mode", self.journal_mode), ("synchronous", self.synchronous)] {
            if let Err(error) = conn.execute_batch(&format!("PRAGMA {name} = {value}")).await {
                tracing::warn!(pragma = name, value, error = %error, "Failed to apply SQLite pragma");
            }
        }
    }
}

fn pick(value: &str, allowed: &[&'static str], default: &'static str) -> &'static str {
    let wanted = value.trim().to_uppercase();
    allowed
        .iter()
        .copied()
        .find(|candidate| *candidate == wanted)
        .unwrap_or(default)
}

/// Shared handle to the libSQL database. Connections are cheap and opened
/// per operation.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    busy_timeout: Duration,
}

impl Database {
    /// Opens (or creates) the store and prepares the schema for vectors of
    /// `dimensions` floats. Fails when the store was created with another
    /// dimension.
    pub async fn new(config: &DatabaseConfig, dimensions: usize) -> Result<Self> {
        let location = Location::from_config(config);
        tracing::debug!(?location, "Opening database");

        let database = Self {
            db: Arc::new(location.open().await?),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };

        let conn = database.connect()?;
        Pragmas::from_config(config).apply(&conn).await;
        schema::init_schema(&conn, dimensions).await?;
        MetadataRepository::ensure_embedding_dimensions(&conn, dimensions).await?;

        Ok(database)
    }

    /// Every connection gets the busy timeout so concurrent writers wait
    /// for the lock instead of failing with SQLITE_BUSY.
    pub fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect()?;
        if let Err(error) = conn.busy_timeout(self.busy_timeout) {
            tracing::warn!(
                busy_timeout_ms = self.busy_timeout.as_millis() as u64,
                error = %error,
                "Failed to set connection busy timeout"
            );
        }
        Ok(conn)
    }

    /// Pushes local writes of an embedded replica. A no-op for other locations.
    pub async fn sync(&self) -> Result<()> {
        match self.db.sync().await {
            Ok(replicated) => tracing::debug!(?replicated, "Database synced"),
            Err(error) => tracing::trace!(error = %error, "Database sync skipped"),
        }
        Ok(())
    }
}
