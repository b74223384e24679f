use libsql::{params, params_from_iter, Connection, Value};

use crate::error::Result;
use crate::models::{format_timestamp, parse_timestamp, MemoryRelation, RelationType};

const RELATION_COLUMNS: &str =
    "source_id, target_id, relation_type, strength, reason, inferred_by, entity_overlap, created_at";

pub struct RelationRepository;

impl RelationRepository {
    /// Inserts edges that do not exist yet; an existing
    /// (source, target, relation_type) triple is left untouched. Returns the
    /// number of new rows.
    pub async fn upsert_batch(conn: &Connection, relations: &[MemoryRelation]) -> Result<u64> {
        let mut inserted = 0;
        for relation in relations {
            inserted += conn
                .execute(
                    r#"
                    INSERT INTO memory_relations (
                        source_id, target_id, relation_type, strength, reason,
                        inferred_by, entity_overlap, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(source_id, target_id, relation_type) DO NOTHING
                    "#,
                    params![
                        relation.source_id.clone(),
                        relation.target_id.clone(),
                        relation.relation_type.as_str(),
                        relation.strength,
                        relation.reason.clone(),
                        relation.inferred_by.to_string(),
                        relation.entity_overlap as i64,
                        format_timestamp(&relation.created_at),
                    ],
                )
                .await?;
        }
        Ok(inserted)
    }

    /// Incoming and outgoing edges of `id` restricted to `types`, strongest
    /// first with a deterministic tie order.
    pub async fn list_for_entry(
        conn: &Connection,
        id: &str,
        types: &[RelationType],
        limit: usize,
    ) -> Result<Vec<MemoryRelation>> {
        if types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut args: Vec<Value> = vec![Value::Text(id.to_string()), Value::Integer(limit as i64)];
        let type_placeholders: Vec<String> = types
            .iter()
            .map(|t| {
                args.push(Value::Text(t.as_str().to_string()));
                format!("?{}", args.len())
            })
            .collect();

        let sql = format!(
            r#"
            SELECT {RELATION_COLUMNS}
            FROM memory_relations
            WHERE (source_id = ?1 OR target_id = ?1)
              AND source_id != target_id
              AND relation_type IN ({})
            ORDER BY strength DESC, source_id ASC, target_id ASC, relation_type ASC
            LIMIT ?2
            "#,
            type_placeholders.join(", ")
        );

        let mut rows = conn.query(&sql, params_from_iter(args)).await?;
        let mut relations = Vec::new();
        while let Some(row) = rows.next().await? {
            relations.push(Self::row_to_relation(&row)?);
        }
        Ok(relations)
    }

    pub async fn get(
        conn: &Connection,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
    ) -> Result<Option<MemoryRelation>> {
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM memory_relations
             WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3"
        );
        let mut rows = conn
            .query(&sql, params![source_id, target_id, relation_type.as_str()])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_relation(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_relation(row: &libsql::Row) -> Result<MemoryRelation> {
        let relation_type_raw: String = row.get(2)?;
        let relation_type = relation_type_raw.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unknown relation type in store, treating as RELATES_TO");
            RelationType::RelatesTo
        });

        Ok(MemoryRelation {
            source_id: row.get(0)?,
            target_id: row.get(1)?,
            relation_type,
            strength: row.get(3)?,
            reason: row.get(4)?,
            inferred_by: row.get::<String>(5)?.parse().unwrap_or_default(),
            entity_overlap: row.get::<i64>(6)?.max(0) as u32,
            created_at: parse_timestamp(&row.get::<String>(7)?)
                .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC),
        })
    }
}
