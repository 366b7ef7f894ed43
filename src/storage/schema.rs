use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use super::queue::WriteQueue;
use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the article store.
///
/// Construct once per process with [`Database::open`] and pass clones to
/// whatever needs the store; clones share the pool and the write queue.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    pub(crate) writes: Arc<WriteQueue>,
    /// Set once the legacy import has been resolved in this process.
    pub(crate) legacy_checked: Arc<AtomicBool>,
}

impl Database {
    /// Open a database connection and create the schema if needed.
    ///
    /// `":memory:"` opens a private in-memory database. Opening an existing
    /// database is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock, `DatabaseError::Migration` if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file owner-only so it never exists with umask permissions
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                // If creation fails, SQLite will report the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks held by
        // another process before returning SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self {
            pool,
            writes: Arc::new(WriteQueue::default()),
            legacy_checked: Arc::new(AtomicBool::new(false)),
        };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Other(e) => DatabaseError::Migration(e.to_string()),
            locked => locked,
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Create tables and indexes atomically within one transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                url TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                added_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                feed_url TEXT NOT NULL REFERENCES feeds(url) ON DELETE CASCADE,
                feed_name TEXT,
                title TEXT NOT NULL,
                link TEXT,
                published TEXT,
                published_ts INTEGER,
                content TEXT,
                author TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_starred INTEGER NOT NULL DEFAULT 0,
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_feed_url ON articles(feed_url)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published_ts ON articles(published_ts)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_starred ON articles(is_starred)")
            .execute(&mut *tx)
            .await?;

        // Singleton key/value rows, e.g. the legacy-import marker
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Read a `meta` value.
    pub(crate) async fn get_meta(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(value,)| value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_creates_schema() {
        let db = Database::open(":memory:").await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["articles", "feeds", "meta"]);
    }

    #[tokio::test]
    async fn test_memory_databases_are_isolated() {
        let a = Database::open(":memory:").await.unwrap();
        let b = Database::open(":memory:").await.unwrap();

        sqlx::query("INSERT INTO meta (key, value) VALUES ('k', 'v')")
            .execute(&a.pool)
            .await
            .unwrap();

        assert_eq!(a.get_meta("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(b.get_meta("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reopen_file_is_idempotent() {
        let dir = std::env::temp_dir().join("lector_schema_test_reopen");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("lector.db");
        let _ = std::fs::remove_file(&path);
        let path_str = path.to_str().unwrap();

        let db = Database::open(path_str).await.unwrap();
        sqlx::query("INSERT INTO meta (key, value) VALUES ('k', 'v')")
            .execute(&db.pool)
            .await
            .unwrap();
        db.pool.close().await;

        let db = Database::open(path_str).await.unwrap();
        assert_eq!(db.get_meta("k").await.unwrap().as_deref(), Some("v"));
        db.pool.close().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}
