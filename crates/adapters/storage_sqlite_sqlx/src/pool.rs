//! Opening the greenhub database and bringing its schema up to date.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::StorageError;

const MEMORY_URL: &str = "sqlite::memory:";
const FILE_MAX_CONNECTIONS: u32 = 4;

/// Where the logic history and audit trail live.
pub struct Config {
    /// `sqlite:greenhub.db`, or `sqlite::memory:` for a throwaway store.
    pub database_url: String,
}

impl Config {
    /// A private in-memory store, used by tests and dry runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database_url: MEMORY_URL.to_string(),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Open the store and apply the embedded migrations.
    ///
    /// A file store is created on first use and runs in WAL mode so audit
    /// appends from channel tasks do not block version reads. An in-memory
    /// store is pinned to a single connection that is never recycled, so its
    /// contents live exactly as long as the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the URL is malformed, the file cannot be
    /// opened or a migration fails.
    pub async fn build(self) -> Result<Database, StorageError> {
        let mut options = SqliteConnectOptions::from_str(&self.database_url)?;
        let pool_options = if self.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(FILE_MAX_CONNECTIONS)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Database { pool })
    }
}

/// An open, migrated store. Repositories clone the pool out of it.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight writes and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn names(db: &Database, kind: &str) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = ? AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' \
             ORDER BY name",
        )
        .bind(kind)
        .fetch_all(db.pool())
        .await
        .unwrap();
        rows.into_iter().map(|(name,)| name).collect()
    }

    #[tokio::test]
    async fn should_create_history_and_audit_schema() {
        let db = Config::in_memory().build().await.unwrap();
        assert_eq!(names(&db, "table").await, vec!["audit_log", "logic_versions"]);
        assert_eq!(
            names(&db, "index").await,
            vec!["idx_audit_log_channel", "idx_logic_versions_channel"]
        );
    }

    #[tokio::test]
    async fn should_share_one_memory_database_across_queries() {
        let db = Config::in_memory().build().await.unwrap();
        let pool = db.pool().clone();
        sqlx::query("CREATE TABLE scratch (value INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO scratch (value) VALUES (7)")
            .execute(&pool)
            .await
            .unwrap();

        let (value,): (i64,) = sqlx::query_as("SELECT value FROM scratch")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
