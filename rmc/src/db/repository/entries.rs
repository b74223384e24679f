use libsql::{params, params_from_iter, Connection, Value};
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{
    format_timestamp, parse_timestamp, Claim, ExtractionResult, MemoryEntry, QueryFilter,
    RootViolation, ViolationKind,
};

const ENTRY_COLUMNS: &str = "e.id, e.org_id, e.namespace, e.content_type, e.content, e.embedding,
     e.confidence, e.claim_key, e.claim_value, e.entities, e.concepts, e.topics, e.claims,
     e.root_id, e.parent_id, e.created_by, e.usage_count, e.created_at";

/// Number of columns in `ENTRY_COLUMNS`; computed columns follow at this index.
const ENTRY_COLUMN_COUNT: i32 = 18;

/// An entry is active until another entry names it as parent.
const ACTIVE_CLAUSE: &str =
    "NOT EXISTS (SELECT 1 FROM memory_entries c WHERE c.parent_id = e.id)";

#[derive(Debug, Clone)]
pub struct EntrySearchHit {
    pub entry: MemoryEntry,
    pub similarity: f32,
}

pub struct EntryRepository;

impl EntryRepository {
    pub async fn create(conn: &Connection, entry: &MemoryEntry) -> Result<()> {
        let embedding_json = serde_json::to_string(&entry.embedding)?;
        let entities = serde_json::to_string(&entry.extraction.entities)?;
        let concepts = serde_json::to_string(&entry.extraction.concepts)?;
        let topics = serde_json::to_string(&entry.extraction.topics)?;
        let claims = serde_json::to_string(&entry.extraction.claims)?;

        conn.execute(
            r#"
            INSERT INTO memory_entries (
                id, org_id, namespace, content_type, content, embedding, confidence,
                claim_key, claim_value, entities, concepts, topics, claims,
                root_id, parent_id, created_by, usage_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, vector32(?6), ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                entry.id.clone(),
                entry.org_id.clone(),
                entry.namespace.clone(),
                entry.content_type.clone(),
                entry.content.clone(),
                embedding_json,
                entry.confidence,
                entry.claim_key().map(str::to_string),
                entry.claim_value().map(str::to_string),
                entities,
                concepts,
                topics,
                claims,
                entry.root_id.clone(),
                entry.parent_id.clone(),
                entry.created_by.clone(),
                entry.usage_count as i64,
                format_timestamp(&entry.created_at),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<MemoryEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM memory_entries e WHERE e.id = ?1");
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// Returns entries in the order of `ids`, skipping unknown ids.
    pub async fn get_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<MemoryEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = placeholders(1, ids.len());
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM memory_entries e WHERE e.id IN ({placeholders})"
        );
        let mut rows = conn
            .query(&sql, params_from_iter(ids.iter().cloned()))
            .await?;

        let mut by_id = HashMap::with_capacity(ids.len());
        while let Some(row) = rows.next().await? {
            let entry = Self::row_to_entry(&row)?;
            by_id.insert(entry.id.clone(), entry);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Vector search within the filter's scope, best match first.
    pub async fn search_similar(
        conn: &Connection,
        embedding: &[f32],
        filter: &QueryFilter,
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<EntrySearchHit>> {
        let embedding_json = serde_json::to_string(embedding)?;
        let mut args: Vec<Value> = vec![
            Value::Text(embedding_json),
            Value::Text(filter.org_id.clone()),
            Value::Real(min_similarity as f64),
            Value::Integer(limit as i64),
        ];

        let mut clauses = Vec::new();
        if let Some(namespace) = &filter.namespace {
            args.push(Value::Text(namespace.clone()));
            let idx = args.len();
            if filter.include_descendants {
                clauses.push(format!(
                    "AND (e.namespace = ?{idx} OR substr(e.namespace, 1, length(?{idx}) + 1) = ?{idx} || '/')"
                ));
            } else {
                clauses.push(format!("AND e.namespace = ?{idx}"));
            }
        }
        if let Some(content_type) = &filter.content_type {
            args.push(Value::Text(content_type.clone()));
            clauses.push(format!("AND e.content_type = ?{}", args.len()));
        }
        if !filter.include_superseded {
            clauses.push(format!("AND {ACTIVE_CLAUSE}"));
        }
        let scope = clauses.join("\n                  ");

        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS},
                   1 - vector_distance_cos(e.embedding, vector32(?1)) AS similarity
            FROM memory_entries e
            WHERE e.org_id = ?2
              AND e.embedding IS NOT NULL
              {scope}
              AND (1 - vector_distance_cos(e.embedding, vector32(?1))) >= ?3
            ORDER BY similarity DESC, e.id ASC
            LIMIT ?4
            "#
        );

        let mut rows = conn.query(&sql, params_from_iter(args)).await?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next().await? {
            let entry = Self::row_to_entry(&row)?;
            let similarity = row.get::<f64>(ENTRY_COLUMN_COUNT)? as f32;
            hits.push(EntrySearchHit { entry, similarity });
        }

        Ok(hits)
    }

    /// Atomically bumps usage counters and returns the post-increment values.
    pub async fn increment_usage(conn: &Connection, ids: &[String]) -> Result<HashMap<String, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = placeholders(1, ids.len());
        let sql = format!(
            "UPDATE memory_entries SET usage_count = usage_count + 1
             WHERE id IN ({placeholders})
             RETURNING id, usage_count"
        );

        let mut rows = conn
            .query(&sql, params_from_iter(ids.iter().cloned()))
            .await?;
        let mut counts = HashMap::with_capacity(ids.len());
        while let Some(row) = rows.next().await? {
            counts.insert(row.get::<String>(0)?, row.get::<i64>(1)?.max(0) as u64);
        }

        Ok(counts)
    }

    /// Active entries in the same org and namespace holding the same claim key
    /// with a different value, excluding the entry's own version chain.
    pub async fn find_claim_rivals(conn: &Connection, entry: &MemoryEntry) -> Result<Vec<MemoryEntry>> {
        let Some(claim) = &entry.claim else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM memory_entries e
            WHERE e.org_id = ?1
              AND e.namespace = ?2
              AND e.claim_key = ?3
              AND e.claim_value != ?4
              AND e.id != ?5
              AND e.root_id != ?6
              AND {ACTIVE_CLAUSE}
            ORDER BY e.id ASC
            "#
        );

        let mut rows = conn
            .query(
                &sql,
                params![
                    entry.org_id.clone(),
                    entry.namespace.clone(),
                    claim.key.clone(),
                    claim.value.clone(),
                    entry.id.clone(),
                    entry.root_id.clone(),
                ],
            )
            .await?;

        let mut rivals = Vec::new();
        while let Some(row) = rows.next().await? {
            rivals.push(Self::row_to_entry(&row)?);
        }
        Ok(rivals)
    }

    /// Active claim-less entries in the same org and namespace whose embedding
    /// is at least `threshold` similar to `entry`.
    pub async fn find_semantic_neighbors(
        conn: &Connection,
        entry: &MemoryEntry,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<EntrySearchHit>> {
        let embedding_json = serde_json::to_string(&entry.embedding)?;
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS},
                   1 - vector_distance_cos(e.embedding, vector32(?1)) AS similarity
            FROM memory_entries e
            WHERE e.org_id = ?2
              AND e.namespace = ?3
              AND e.claim_key IS NULL
              AND e.id != ?4
              AND e.root_id != ?5
              AND e.embedding IS NOT NULL
              AND {ACTIVE_CLAUSE}
              AND (1 - vector_distance_cos(e.embedding, vector32(?1))) >= ?6
            ORDER BY similarity DESC, e.id ASC
            LIMIT ?7
            "#
        );

        let mut rows = conn
            .query(
                &sql,
                params![
                    embedding_json,
                    entry.org_id.clone(),
                    entry.namespace.clone(),
                    entry.id.clone(),
                    entry.root_id.clone(),
                    threshold as f64,
                    limit as i64,
                ],
            )
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().await? {
            let neighbor = Self::row_to_entry(&row)?;
            let similarity = row.get::<f64>(ENTRY_COLUMN_COUNT)? as f32;
            hits.push(EntrySearchHit {
                entry: neighbor,
                similarity,
            });
        }
        Ok(hits)
    }

    /// Most recent active entries in the same org whose namespace is an
    /// ancestor, descendant or equal of the entry's namespace.
    pub async fn relation_candidates(
        conn: &Connection,
        entry: &MemoryEntry,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM memory_entries e
            WHERE e.org_id = ?1
              AND (
                    e.namespace = ?2
                 OR substr(e.namespace, 1, length(?2) + 1) = ?2 || '/'
                 OR substr(?2, 1, length(e.namespace) + 1) = e.namespace || '/'
              )
              AND e.id != ?3
              AND e.root_id != ?4
              AND {ACTIVE_CLAUSE}
            ORDER BY e.created_at DESC, e.id ASC
            LIMIT ?5
            "#
        );

        let mut rows = conn
            .query(
                &sql,
                params![
                    entry.org_id.clone(),
                    entry.namespace.clone(),
                    entry.id.clone(),
                    entry.root_id.clone(),
                    limit as i64,
                ],
            )
            .await?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next().await? {
            candidates.push(Self::row_to_entry(&row)?);
        }
        Ok(candidates)
    }

    /// All versions sharing `root_id`, oldest first. Insertion order breaks
    /// timestamp ties.
    pub async fn get_version_chain(conn: &Connection, root_id: &str) -> Result<Vec<MemoryEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM memory_entries e
             WHERE e.root_id = ?1
             ORDER BY e.created_at ASC, e.rowid ASC"
        );
        let mut rows = conn.query(&sql, params![root_id]).await?;

        let mut chain = Vec::new();
        while let Some(row) = rows.next().await? {
            chain.push(Self::row_to_entry(&row)?);
        }
        Ok(chain)
    }

    /// `ids` oldest first: creation time, then insertion sequence.
    pub async fn creation_order(conn: &Connection, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = placeholders(1, ids.len());
        let sql = format!(
            "SELECT e.id FROM memory_entries e
             WHERE e.id IN ({placeholders})
             ORDER BY e.created_at ASC, e.rowid ASC"
        );
        let mut rows = conn
            .query(&sql, params_from_iter(ids.iter().cloned()))
            .await?;

        let mut ordered = Vec::with_capacity(ids.len());
        while let Some(row) = rows.next().await? {
            ordered.push(row.get::<String>(0)?);
        }
        Ok(ordered)
    }

    pub async fn find_root_violations(conn: &Connection) -> Result<Vec<RootViolation>> {
        let mut rows = conn
            .query(
                r#"
                SELECT e.id, e.root_id,
                       CASE WHEN r.id IS NULL THEN 'missing_root' ELSE 'root_has_parent' END
                FROM memory_entries e
                LEFT JOIN memory_entries r ON r.id = e.root_id
                WHERE r.id IS NULL OR r.parent_id IS NOT NULL

                UNION ALL

                SELECT e.id, e.root_id,
                       CASE WHEN p.id IS NULL THEN 'missing_parent' ELSE 'root_mismatch' END
                FROM memory_entries e
                LEFT JOIN memory_entries p ON p.id = e.parent_id
                WHERE e.parent_id IS NOT NULL AND (p.id IS NULL OR p.root_id != e.root_id)

                UNION ALL

                SELECT e.id, e.root_id, 'root_mismatch'
                FROM memory_entries e
                WHERE e.parent_id IS NULL AND e.root_id != e.id

                ORDER BY 1, 3
                "#,
                (),
            )
            .await?;

        let mut violations = Vec::new();
        while let Some(row) = rows.next().await? {
            let kind = match row.get::<String>(2)?.as_str() {
                "missing_root" => ViolationKind::MissingRoot,
                "root_has_parent" => ViolationKind::RootHasParent,
                "missing_parent" => ViolationKind::MissingParent,
                _ => ViolationKind::RootMismatch,
            };
            violations.push(RootViolation {
                entry_id: row.get(0)?,
                root_id: row.get(1)?,
                kind,
            });
        }
        Ok(violations)
    }

    pub fn row_to_entry(row: &libsql::Row) -> Result<MemoryEntry> {
        let claim = match (row.get::<Option<String>>(7)?, row.get::<Option<String>>(8)?) {
            (Some(key), Some(value)) => Some(Claim { key, value }),
            _ => None,
        };

        let extraction = ExtractionResult {
            entities: serde_json::from_str(&row.get::<String>(9)?).unwrap_or_default(),
            concepts: serde_json::from_str(&row.get::<String>(10)?).unwrap_or_default(),
            topics: serde_json::from_str(&row.get::<String>(11)?).unwrap_or_default(),
            claims: serde_json::from_str(&row.get::<String>(12)?).unwrap_or_default(),
        };

        let created_at_raw: String = row.get(17)?;

        Ok(MemoryEntry {
            id: row.get(0)?,
            org_id: row.get(1)?,
            namespace: row.get(2)?,
            content_type: row.get(3)?,
            content: row.get(4)?,
            embedding: row
                .get::<Option<Vec<u8>>>(5)?
                .map(|bytes| decode_f32_blob(&bytes))
                .unwrap_or_default(),
            confidence: row.get(6)?,
            claim,
            extraction,
            root_id: row.get(13)?,
            parent_id: row.get(14)?,
            created_by: row.get(15)?,
            usage_count: row.get::<i64>(16)?.max(0) as u64,
            created_at: parse_timestamp(&created_at_raw).unwrap_or_else(|| {
                tracing::warn!(value = %created_at_raw, "Unparseable created_at on memory entry");
                chrono::DateTime::<chrono::Utc>::MIN_UTC
            }),
        })
    }
}

/// `?start, ?start+1, ...` for `count` positional parameters.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// F32_BLOB columns hold little-endian IEEE-754 floats back to back.
fn decode_f32_blob(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;
    use chrono::{Duration, Utc};

    async fn setup_test_db() -> (Connection, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.db");
        let db = libsql::Builder::new_local(path.display().to_string())
            .build()
            .await
            .unwrap();
        let conn = db.connect().unwrap();
        init_schema(&conn, 4).await.unwrap();
        (conn, dir)
    }

    fn entry(id: &str, namespace: &str, embedding: Vec<f32>) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            org_id: "org".to_string(),
            namespace: namespace.to_string(),
            content_type: "fact".to_string(),
            content: format!("content of {id}"),
            embedding,
            confidence: 0.8,
            claim: None,
            extraction: ExtractionResult::default(),
            root_id: id.to_string(),
            parent_id: None,
            created_by: "tester".to_string(),
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(4, 1), "?4");
    }

    #[test]
    fn test_decode_f32_blob() {
        let values = [1.0f32, -0.5, 0.25];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(decode_f32_blob(&bytes), values.to_vec());
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (conn, _dir) = setup_test_db().await;
        let mut e = entry("a1", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        e.claim = Some(Claim::new("auth_method", "JWT"));
        EntryRepository::create(&conn, &e).await.unwrap();

        let loaded = EntryRepository::get_by_id(&conn, "a1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "a1");
        assert_eq!(loaded.claim, Some(Claim::new("auth_method", "JWT")));
        assert_eq!(loaded.embedding, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(loaded.is_root());

        assert!(EntryRepository::get_by_id(&conn, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_ids_preserves_order() {
        let (conn, _dir) = setup_test_db().await;
        for id in ["x", "y", "z"] {
            EntryRepository::create(&conn, &entry(id, "acme", vec![1.0, 0.0, 0.0, 0.0]))
                .await
                .unwrap();
        }
        let ids = vec!["z".to_string(), "missing".to_string(), "x".to_string()];
        let loaded = EntryRepository::get_by_ids(&conn, &ids).await.unwrap();
        let loaded_ids: Vec<&str> = loaded.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(loaded_ids, vec!["z", "x"]);
    }

    #[tokio::test]
    async fn test_search_similar_respects_scope_and_threshold() {
        let (conn, _dir) = setup_test_db().await;
        EntryRepository::create(&conn, &entry("near", "acme/eng", vec![1.0, 0.1, 0.0, 0.0]))
            .await
            .unwrap();
        EntryRepository::create(&conn, &entry("child", "acme/eng/auth", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        EntryRepository::create(&conn, &entry("far", "acme/eng", vec![0.0, 0.0, 1.0, 0.0]))
            .await
            .unwrap();
        EntryRepository::create(&conn, &entry("other", "acme/engine", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        let filter = QueryFilter::new("org").with_namespace("acme/eng");
        let hits = EntryRepository::search_similar(&conn, &[1.0, 0.0, 0.0, 0.0], &filter, 0.5, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["child", "near"]);
        assert!(hits[0].similarity > 0.99);

        let mut exact = QueryFilter::new("org").with_namespace("acme/eng");
        exact.include_descendants = false;
        let hits = EntryRepository::search_similar(&conn, &[1.0, 0.0, 0.0, 0.0], &exact, 0.5, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["near"]);
    }

    #[tokio::test]
    async fn test_search_excludes_superseded_by_default() {
        let (conn, _dir) = setup_test_db().await;
        let root = entry("v1", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        EntryRepository::create(&conn, &root).await.unwrap();
        let mut child = entry("v2", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        child.parent_id = Some("v1".to_string());
        child.root_id = "v1".to_string();
        EntryRepository::create(&conn, &child).await.unwrap();

        let filter = QueryFilter::new("org");
        let hits = EntryRepository::search_similar(&conn, &[1.0, 0.0, 0.0, 0.0], &filter, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, "v2");

        let mut all = QueryFilter::new("org");
        all.include_superseded = true;
        let hits = EntryRepository::search_similar(&conn, &[1.0, 0.0, 0.0, 0.0], &all, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_increment_usage_returns_new_counts() {
        let (conn, _dir) = setup_test_db().await;
        EntryRepository::create(&conn, &entry("a", "acme", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        let ids = vec!["a".to_string()];
        EntryRepository::increment_usage(&conn, &ids).await.unwrap();
        let counts = EntryRepository::increment_usage(&conn, &ids).await.unwrap();
        assert_eq!(counts.get("a"), Some(&2));
    }

    #[tokio::test]
    async fn test_find_claim_rivals() {
        let (conn, _dir) = setup_test_db().await;
        let mut a = entry("a", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        a.claim = Some(Claim::new("auth_method", "JWT"));
        let mut b = entry("b", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        b.claim = Some(Claim::new("auth_method", "OAuth"));
        let mut c = entry("c", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        c.claim = Some(Claim::new("auth_method", "JWT"));
        let mut d = entry("d", "acme/other", vec![1.0, 0.0, 0.0, 0.0]);
        d.claim = Some(Claim::new("auth_method", "SAML"));
        for e in [&a, &b, &c, &d] {
            EntryRepository::create(&conn, e).await.unwrap();
        }

        let rivals = EntryRepository::find_claim_rivals(&conn, &b).await.unwrap();
        let ids: Vec<&str> = rivals.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let rivals = EntryRepository::find_claim_rivals(&conn, &a).await.unwrap();
        let ids: Vec<&str> = rivals.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_relation_candidates_use_compatible_namespaces() {
        let (conn, _dir) = setup_test_db().await;
        let base = Utc::now();
        let specs = [
            ("parent", "acme"),
            ("same", "acme/eng"),
            ("child", "acme/eng/auth"),
            ("sibling", "acme/sales"),
            ("lookalike", "acme/engine"),
        ];
        for (i, (id, ns)) in specs.iter().enumerate() {
            let mut e = entry(id, ns, vec![1.0, 0.0, 0.0, 0.0]);
            e.created_at = base + Duration::milliseconds(i as i64);
            EntryRepository::create(&conn, &e).await.unwrap();
        }

        let incoming = entry("incoming", "acme/eng", vec![1.0, 0.0, 0.0, 0.0]);
        let candidates = EntryRepository::relation_candidates(&conn, &incoming, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["child", "same", "parent"]);
    }

    #[tokio::test]
    async fn test_version_chain_orders_by_creation() {
        let (conn, _dir) = setup_test_db().await;
        let created = Utc::now();
        let mut root = entry("zzz", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        root.created_at = created;
        let mut v2 = entry("aaa", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        v2.parent_id = Some("zzz".into());
        v2.root_id = "zzz".into();
        v2.created_at = created + Duration::seconds(1);
        EntryRepository::create(&conn, &root).await.unwrap();
        EntryRepository::create(&conn, &v2).await.unwrap();

        let chain = EntryRepository::get_version_chain(&conn, "zzz").await.unwrap();
        let ids: Vec<&str> = chain.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["zzz", "aaa"]);
    }

    #[tokio::test]
    async fn test_root_violations() {
        let (conn, _dir) = setup_test_db().await;
        EntryRepository::create(&conn, &entry("ok", "acme", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        let mut orphan = entry("orphan", "acme", vec![1.0, 0.0, 0.0, 0.0]);
        orphan.parent_id = Some("ghost".into());
        orphan.root_id = "ghost".into();
        EntryRepository::create(&conn, &orphan).await.unwrap();

        let violations = EntryRepository::find_root_violations(&conn).await.unwrap();
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .all(|v| v.entry_id == "orphan" && v.root_id == "ghost"));
        let kinds: Vec<ViolationKind> = violations.iter().map(|v| v.kind).collect();
        assert!(kinds.contains(&ViolationKind::MissingRoot));
        assert!(kinds.contains(&ViolationKind::MissingParent));
    }

    #[tokio::test]
    async fn test_creation_order_breaks_ties_by_insertion() {
        let (conn, _dir) = setup_test_db().await;
        let at = Utc::now();
        for id in ["zeta", "alpha", "mid"] {
            let mut e = entry(id, "acme", vec![1.0, 0.0, 0.0, 0.0]);
            e.created_at = at;
            EntryRepository::create(&conn, &e).await.unwrap();
        }

        let ordered = EntryRepository::creation_order(&conn, &["alpha".into(), "mid".into(), "zeta".into()])
            .await
            .unwrap();
        assert_eq!(ordered, vec!["zeta", "alpha", "mid"]);
    }
}
