use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

const MEMORY_URL: &str = ":memory:";

/// Where the fact store lives, decided from `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreLocation {
    Memory,
    File(String),
    Remote { url: String, token: String },
    Replica { path: String, url: String, token: String },
}

impl StoreLocation {
    fn from_config(config: &DatabaseConfig) -> Self {
        let url = config.url.trim();
        if url == MEMORY_URL {
            return Self::Memory;
        }
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
        Self::File(url.strip_prefix("file:").unwrap_or(url).to_string())
    }

    async fn open(&self) -> Result<libsql::Database> {
        let db = match self {
            Self::Memory => Builder::new_local(MEMORY_URL).build().await?,
            Self::File(path) => Builder::new_local(path).build().await?,
            Self::Remote { url, token } => {
                Builder::new_remote(url.clone(), token.clone()).build().await?
            }
            Self::Replica { path, url, token } => {
                Builder::new_remote_replica(path, url.clone(), token.clone())
                    .build()
                    .await?
            }
        };
        Ok(db)
    }

    /// Pragmas only make sense for SQLite files this process owns.
    fn takes_pragmas(&self) -> bool {
        matches!(self, Self::File(_) | Self::Replica { .. })
    }
}

#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    // In-memory databases are per connection, so one is kept and shared.
    shared: Option<Connection>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let location = StoreLocation::from_config(config);
        let db = location.open().await?;
        let shared = match location {
            StoreLocation::Memory => Some(db.connect()?),
            _ => None,
        };

        let database = Self {
            db: Arc::new(db),
            shared,
        };
        if location.takes_pragmas() {
            database.apply_pragmas(&Pragmas::from_env()).await?;
        }
        schema::init_schema(&database.connect()?).await?;

        tracing::debug!(url = %config.url, "Fact store ready");
        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        match &self.shared {
            Some(conn) => Ok(conn.clone()),
            None => Ok(self.db.connect()?),
        }
    }

    async fn apply_pragmas(&self, pragmas: &Pragmas) -> Result<()> {
        let conn = self.connect()?;
        for (name, value) in pragmas.statements() {
            if let Err(error) = conn.execute_batch(&format!("PRAGMA {name} = {value}")).await {
                tracing::warn!(pragma = name, value = %value, error = %error, "Failed to set SQLite pragma");
            }
        }
        Ok(())
    }

    /// Push local writes of an embedded replica; a no-op for plain local files.
    pub async fn sync(&self) -> Result<()> {
        if let Ok(sync) = self.db.sync().await {
            tracing::info!("Database synced: {:?}", sync);
        }
        Ok(())
    }
}

/// Connection tuning read from `DATABASE_BUSY_TIMEOUT_MS` and
/// `DATABASE_JOURNAL_MODE`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pragmas {
    busy_timeout_ms: u64,
    journal_mode: &'static str,
}

impl Pragmas {
    fn from_env() -> Self {
        Self::parse(
            std::env::var("DATABASE_BUSY_TIMEOUT_MS").ok().as_deref(),
            std::env::var("DATABASE_JOURNAL_MODE").ok().as_deref(),
        )
    }

    fn parse(busy_timeout: Option<&str>, journal_mode: Option<&str>) -> Self {
        Self {
            busy_timeout_ms: busy_timeout
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(5000),
            journal_mode: normalize_journal_mode(journal_mode.unwrap_or("WAL")),
        }
    }

    fn statements(&self) -> [(&'static str, String); 2] {
        [
            ("busy_timeout", self.busy_timeout_ms.to_string()),
            ("journal_mode", self.journal_mode.to_string()),
        ]
    }
}

fn normalize_journal_mode(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "DELETE" => "DELETE",
        "TRUNCATE" => "TRUNCATE",
        "PERSIST" => "PERSIST",
        "MEMORY" => "MEMORY",
        "OFF" => "OFF",
        _ => "WAL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, local_path: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            auth_token: Some("token".to_string()),
            local_path: local_path.map(str::to_string),
        }
    }

    #[test]
    fn test_location_from_url() {
        assert_eq!(StoreLocation::from_config(&config(":memory:", None)), StoreLocation::Memory);
        assert_eq!(
            StoreLocation::from_config(&config("file:facts.db", None)),
            StoreLocation::File("facts.db".to_string())
        );
        assert_eq!(
            StoreLocation::from_config(&config("data/facts.db", None)),
            StoreLocation::File("data/facts.db".to_string())
        );
        assert!(matches!(
            StoreLocation::from_config(&config("libsql://kg.turso.io", None)),
            StoreLocation::Remote { .. }
        ));
        assert!(matches!(
            StoreLocation::from_config(&config("https://kg.turso.io", Some("replica.db"))),
            StoreLocation::Replica { .. }
        ));
    }

    #[test]
    fn test_pragmas_parse() {
        let pragmas = Pragmas::parse(Some(" 250 "), Some("delete"));
        assert_eq!(pragmas.busy_timeout_ms, 250);
        assert_eq!(pragmas.journal_mode, "DELETE");

        let defaults = Pragmas::parse(Some("soon"), Some("bogus"));
        assert_eq!(defaults.busy_timeout_ms, 5000);
        assert_eq!(defaults.journal_mode, "WAL");
    }

    #[tokio::test]
    async fn test_memory_database_shares_one_connection() {
        let db = Database::new(&config(MEMORY_URL, None)).await.unwrap();

        let first = db.connect().unwrap();
        first
            .execute("INSERT INTO nodes (id, created_at) VALUES ('a', 't')", ())
            .await
            .unwrap();

        let second = db.connect().unwrap();
        let mut rows = second.query("SELECT COUNT(*) FROM nodes", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }
}
