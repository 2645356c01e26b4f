use crate::db::connection::Database;
use crate::db::repository::FactRepository;
use crate::db::traits::FactStore;
use crate::error::Result;
use crate::models::{Fact, FactKey, FactStatus, StoredFact};
use async_trait::async_trait;

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl FactStore for LibSqlBackend {
    async fn insert_fact(&self, fact: &Fact) -> Result<()> {
        let conn = self.db.connect()?;
        let id = FactRepository::create(&conn, fact).await?;
        tracing::debug!(fact_id = %id, fact = %fact.triplet(), "Fact stored");
        Ok(())
    }
    async fn all_facts(&self) -> Result<Vec<StoredFact>> {
        let conn = self.db.connect()?;
        FactRepository::list_all(&conn).await
    }
    async fn facts_for_subject(&self, subject: &str) -> Result<Vec<StoredFact>> {
        let conn = self.db.connect()?;
        FactRepository::list_by_subject(&conn, subject).await
    }
    async fn fact_exists(&self, subject: &str, relation: &str, object: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        FactRepository::exists(&conn, subject, relation, object).await
    }
    async fn update_status(&self, key: &FactKey, status: FactStatus) -> Result<u64> {
        let conn = self.db.connect()?;
        FactRepository::update_status(&conn, key, status).await
    }
    async fn delete_fact(&self, key: &FactKey) -> Result<u64> {
        let conn = self.db.connect()?;
        FactRepository::delete(&conn, key).await
    }
    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let conn = self.db.connect()?;
        FactRepository::delete_matching(&conn, pattern).await
    }
    async fn recent_facts(&self, limit: usize) -> Result<Vec<StoredFact>> {
        let conn = self.db.connect()?;
        FactRepository::list_recent(&conn, limit).await
    }
    async fn clear(&self) -> Result<u64> {
        let conn = self.db.connect()?;
        let removed = FactRepository::delete_all(&conn).await?;
        tracing::info!(removed, "Fact store cleared");
        Ok(removed)
    }
}
