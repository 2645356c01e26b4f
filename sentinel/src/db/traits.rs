use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Fact, FactKey, FactStatus, StoredFact};

/// Graph-store capabilities the memory pipeline relies on.
///
/// Every call is parameterized; relation labels and node ids are never
/// spliced into query text.
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn insert_fact(&self, fact: &Fact) -> Result<()>;

    /// All facts, oldest first.
    async fn all_facts(&self) -> Result<Vec<StoredFact>>;
    async fn facts_for_subject(&self, subject: &str) -> Result<Vec<StoredFact>>;

    /// Whether `(subject, relation, object)` is stored at any timestamp.
    async fn fact_exists(&self, subject: &str, relation: &str, object: &str) -> Result<bool>;

    async fn update_status(&self, key: &FactKey, status: FactStatus) -> Result<u64>;
    async fn delete_fact(&self, key: &FactKey) -> Result<u64>;

    /// Remove facts whose subject, relation or object contains `pattern`
    /// case-insensitively.
    async fn delete_matching(&self, pattern: &str) -> Result<u64>;

    /// The `limit` most recent facts, newest first.
    async fn recent_facts(&self, limit: usize) -> Result<Vec<StoredFact>>;

    /// Wipe the whole graph.
    async fn clear(&self) -> Result<u64>;
}
