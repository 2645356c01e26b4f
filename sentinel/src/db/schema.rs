use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Graph nodes, keyed by canonical identifier
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        -- Directed, timestamped edges between nodes
        CREATE TABLE IF NOT EXISTS facts (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            object_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            status TEXT CHECK (status IS NULL OR status IN ('current', 'past')),
            created_at TEXT NOT NULL,
            FOREIGN KEY (subject_id) REFERENCES nodes(id),
            FOREIGN KEY (object_id) REFERENCES nodes(id)
        );

        CREATE INDEX IF NOT EXISTS idx_facts_subject_relation ON facts(subject_id, relation);
        CREATE INDEX IF NOT EXISTS idx_facts_timestamp ON facts(timestamp);
        "#,
    )
    .await?;

    Ok(())
}
