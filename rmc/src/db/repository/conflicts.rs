use chrono::{DateTime, Utc};
use libsql::{params, params_from_iter, Connection, Value};

use crate::error::Result;
use crate::models::{
    canonical_pair, format_timestamp, parse_timestamp, ConflictFilter, ConflictResolution, ConflictStatus,
    ConflictType, MemoryConflict,
};

const CONFLICT_COLUMNS: &str = "id, org_id, namespace, memory_id_1, memory_id_2, conflict_type,
     status, detected_at, resolved_at, resolution";

pub struct ConflictRepository;

impl ConflictRepository {
    /// Inserts the conflict unless a row for the same canonical pair and type
    /// already exists. Returns whether a new row was written.
    pub async fn insert_if_absent(conn: &Connection, conflict: &MemoryConflict) -> Result<bool> {
        let resolution = conflict
            .resolution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = conn
            .execute(
                r#"
                INSERT INTO memory_conflicts (
                    id, org_id, namespace, memory_id_1, memory_id_2, conflict_type,
                    status, detected_at, resolved_at, resolution
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(memory_id_1, memory_id_2, conflict_type) DO NOTHING
                "#,
                params![
                    conflict.id.clone(),
                    conflict.org_id.clone(),
                    conflict.namespace.clone(),
                    conflict.memory_id_1.clone(),
                    conflict.memory_id_2.clone(),
                    conflict.conflict_type.to_string(),
                    conflict.status.to_string(),
                    format_timestamp(&conflict.detected_at),
                    conflict.resolved_at.as_ref().map(format_timestamp),
                    resolution,
                ],
            )
            .await;

        match result {
            Ok(affected) => Ok(affected > 0),
            // A concurrent writer won the race for this pair; that is the outcome we wanted.
            Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                tracing::debug!(
                    memory_id_1 = %conflict.memory_id_1,
                    memory_id_2 = %conflict.memory_id_2,
                    "Conflict already recorded by a concurrent detector"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<MemoryConflict>> {
        let sql = format!("SELECT {CONFLICT_COLUMNS} FROM memory_conflicts WHERE id = ?1");
        let mut rows = conn.query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_conflict(&row)?)),
            None => Ok(None),
        }
    }

    /// Looks up the conflict for a pair given in either order.
    pub async fn get_for_pair(
        conn: &Connection,
        memory_id_1: &str,
        memory_id_2: &str,
        conflict_type: ConflictType,
    ) -> Result<Option<MemoryConflict>> {
        let (memory_id_1, memory_id_2) = canonical_pair(memory_id_1, memory_id_2);
        let sql = format!(
            "SELECT {CONFLICT_COLUMNS} FROM memory_conflicts
             WHERE memory_id_1 = ?1 AND memory_id_2 = ?2 AND conflict_type = ?3"
        );
        let mut rows = conn
            .query(
                &sql,
                params![memory_id_1, memory_id_2, conflict_type.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_conflict(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(conn: &Connection, filter: &ConflictFilter) -> Result<Vec<MemoryConflict>> {
        let mut args: Vec<Value> = vec![Value::Text(filter.org_id.clone())];
        let mut clauses = String::new();
        if let Some(namespace) = &filter.namespace {
            args.push(Value::Text(namespace.clone()));
            clauses.push_str(&format!(" AND namespace = ?{}", args.len()));
        }
        if let Some(status) = filter.status {
            args.push(Value::Text(status.to_string()));
            clauses.push_str(&format!(" AND status = ?{}", args.len()));
        }

        let sql = format!(
            "SELECT {CONFLICT_COLUMNS} FROM memory_conflicts
             WHERE org_id = ?1{clauses}
             ORDER BY detected_at ASC, id ASC"
        );
        let mut rows = conn.query(&sql, params_from_iter(args)).await?;
        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(Self::row_to_conflict(&row)?);
        }
        Ok(conflicts)
    }

    /// Moves a pending conflict to a terminal status. The `status = 'pending'`
    /// guard makes the transition single-winner; returns false when the
    /// conflict was not pending.
    pub async fn close(
        conn: &Connection,
        id: &str,
        status: ConflictStatus,
        resolution: &ConflictResolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let resolution_json = serde_json::to_string(resolution)?;
        let affected = conn
            .execute(
                "UPDATE memory_conflicts
                 SET status = ?2, resolution = ?3, resolved_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
                params![
                    id,
                    status.to_string(),
                    resolution_json,
                    format_timestamp(&resolved_at),
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    fn row_to_conflict(row: &libsql::Row) -> Result<MemoryConflict> {
        Ok(MemoryConflict {
            id: row.get(0)?,
            org_id: row.get(1)?,
            namespace: row.get(2)?,
            memory_id_1: row.get(3)?,
            memory_id_2: row.get(4)?,
            conflict_type: row
                .get::<String>(5)?
                .parse()
                .unwrap_or(ConflictType::ClaimValueMismatch),
            status: row.get::<String>(6)?.parse().unwrap_or_default(),
            detected_at: parse_timestamp(&row.get::<String>(7)?)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            resolved_at: row
                .get::<Option<String>>(8)?
                .and_then(|s| parse_timestamp(&s)),
            resolution: row
                .get::<Option<String>>(9)?
                .and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}
