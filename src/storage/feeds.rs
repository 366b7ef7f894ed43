use super::schema::Database;
use super::types::{DatabaseError, Feed};

impl Database {
    // ========================================================================
    // Feed Queries
    // ========================================================================

    /// All feeds, oldest subscription first.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(
            "SELECT url, name, added_at FROM feeds ORDER BY added_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Look up one feed by URL.
    pub async fn get_feed(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>("SELECT url, name, added_at FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    // ========================================================================
    // Feed Mutations
    // ========================================================================

    /// Insert a feed unless its URL is already present.
    ///
    /// Returns `true` if the feed was inserted. An existing row is left
    /// untouched (name and `added_at` are not overwritten).
    pub async fn add_feed(&self, feed: &Feed) -> Result<bool, DatabaseError> {
        self.writes
            .run("add_feed", async {
                let result = sqlx::query(
                    "INSERT INTO feeds (url, name, added_at) VALUES (?, ?, ?) ON CONFLICT(url) DO NOTHING",
                )
                .bind(&feed.url)
                .bind(&feed.name)
                .bind(feed.added_at)
                .execute(&self.pool)
                .await?;
                Ok(result.rows_affected() > 0)
            })
            .await
    }

    /// Delete a feed and every article that belongs to it.
    ///
    /// Returns `true` if a feed was removed. Articles of other feeds are
    /// untouched. Callers that track a selected feed must clear it themselves.
    pub async fn remove_feed(&self, url: &str) -> Result<bool, DatabaseError> {
        self.writes
            .run("remove_feed", async {
                let mut tx = self.pool.begin().await?;

                // Does not rely on ON DELETE CASCADE
                let articles = sqlx::query("DELETE FROM articles WHERE feed_url = ?")
                    .bind(url)
                    .execute(&mut *tx)
                    .await?;
                let feeds = sqlx::query("DELETE FROM feeds WHERE url = ?")
                    .bind(url)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                tracing::info!(
                    feed = %url,
                    articles = articles.rows_affected(),
                    "Feed removed"
                );
                Ok(feeds.rows_affected() > 0)
            })
            .await
    }
}
