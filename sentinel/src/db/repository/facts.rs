use chrono::Utc;
use libsql::{params, Connection};
use nanoid::nanoid;

use crate::error::Result;
use crate::models::{Fact, FactKey, FactStatus, StoredFact};

const FACT_COLUMNS: &str = "subject_id, relation, object_id, timestamp, status";

pub struct FactRepository;

impl FactRepository {
    pub async fn create(conn: &Connection, fact: &Fact) -> Result<String> {
        let id = nanoid!();
        let created_at = Utc::now().to_rfc3339();

        for node in [fact.subject(), fact.object()] {
            conn.execute(
                "INSERT OR IGNORE INTO nodes (id, created_at) VALUES (?1, ?2)",
                params![node, created_at.clone()],
            )
            .await?;
        }

        conn.execute(
            r#"
            INSERT INTO facts (
                id, subject_id, relation, object_id, timestamp, status, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, NULL, ?6
            )
            "#,
            params![
                id.clone(),
                fact.subject(),
                fact.relation(),
                fact.object(),
                fact.timestamp(),
                created_at,
            ],
        )
        .await?;

        Ok(id)
    }

    pub async fn list_all(conn: &Connection) -> Result<Vec<StoredFact>> {
        let sql = format!("SELECT {FACT_COLUMNS} FROM facts ORDER BY timestamp ASC, rowid ASC");
        let mut rows = conn.query(&sql, ()).await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::row_to_fact(&row)?);
        }

        Ok(results)
    }

    pub async fn list_by_subject(conn: &Connection, subject: &str) -> Result<Vec<StoredFact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE subject_id = ?1 ORDER BY timestamp ASC, rowid ASC"
        );
        let mut rows = conn.query(&sql, params![subject]).await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::row_to_fact(&row)?);
        }

        Ok(results)
    }

    pub async fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<StoredFact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM facts ORDER BY timestamp DESC, rowid DESC LIMIT ?1"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = conn.query(&sql, params![limit]).await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(Self::row_to_fact(&row)?);
        }

        Ok(results)
    }

    /// Existence of an edge regardless of when it was written.
    pub async fn exists(
        conn: &Connection,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Result<bool> {
        let mut rows = conn
            .query(
                "SELECT 1 FROM facts WHERE subject_id = ?1 AND relation = ?2 AND object_id = ?3 LIMIT 1",
                params![subject, relation, object],
            )
            .await?;

        Ok(rows.next().await?.is_some())
    }

    pub async fn update_status(
        conn: &Connection,
        key: &FactKey,
        status: FactStatus,
    ) -> Result<u64> {
        let affected = conn
            .execute(
                r#"
                UPDATE facts SET status = ?1
                WHERE subject_id = ?2 AND relation = ?3 AND object_id = ?4 AND timestamp = ?5
                "#,
                params![
                    status.as_str(),
                    key.subject.as_str(),
                    key.relation.as_str(),
                    key.object.as_str(),
                    key.timestamp.as_str(),
                ],
            )
            .await?;

        Ok(affected)
    }

    pub async fn delete(conn: &Connection, key: &FactKey) -> Result<u64> {
        let affected = conn
            .execute(
                r#"
                DELETE FROM facts
                WHERE subject_id = ?1 AND relation = ?2 AND object_id = ?3 AND timestamp = ?4
                "#,
                params![
                    key.subject.as_str(),
                    key.relation.as_str(),
                    key.object.as_str(),
                    key.timestamp.as_str(),
                ],
            )
            .await?;

        Self::prune_orphan_nodes(conn).await?;
        Ok(affected)
    }

    /// Delete every fact whose subject, relation or object contains `pattern`,
    /// ignoring ASCII case.
    pub async fn delete_matching(conn: &Connection, pattern: &str) -> Result<u64> {
        let affected = conn
            .execute(
                r#"
                DELETE FROM facts
                WHERE instr(lower(subject_id), lower(?1)) > 0
                   OR instr(lower(relation), lower(?1)) > 0
                   OR instr(lower(object_id), lower(?1)) > 0
                "#,
                params![pattern],
            )
            .await?;

        Self::prune_orphan_nodes(conn).await?;
        Ok(affected)
    }

    pub async fn delete_all(conn: &Connection) -> Result<u64> {
        let affected = conn.execute("DELETE FROM facts", ()).await?;
        conn.execute("DELETE FROM nodes", ()).await?;
        Ok(affected)
    }

    async fn prune_orphan_nodes(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            DELETE FROM nodes
            WHERE id NOT IN (SELECT subject_id FROM facts UNION SELECT object_id FROM facts)
            "#,
            (),
        )
        .await?;
        Ok(())
    }

    fn row_to_fact(row: &libsql::Row) -> Result<StoredFact> {
        Ok(StoredFact {
            subject: row.get(0)?,
            relation: row.get(1)?,
            object: row.get(2)?,
            timestamp: row.get(3)?,
            status: row
                .get::<Option<String>>(4)?
                .and_then(|status| status.parse().ok()),
        })
    }
}
