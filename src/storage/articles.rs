use std::collections::HashMap;

use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{Article, ArticleDbRow, ArticleFilter, DatabaseError, UpsertSummary};
use crate::feed::Entry;
use crate::util::published_timestamp;

// ============================================================================
// Constants
// ============================================================================

/// Non-starred articles kept per feed; starred articles are never pruned.
pub const MAX_ARTICLES_PER_FEED: i64 = 500;

/// Rows per multi-row statement (12 columns * 50 = 600 bound parameters).
const BATCH_SIZE: usize = 50;

/// Ids per `IN (...)` list in bulk flag updates.
const ID_BATCH_SIZE: usize = 500;

const ARTICLE_COLUMNS: &str = "id, feed_url, feed_name, title, link, published, published_ts, \
     content, author, is_read, is_starred, fetched_at";

/// Newest first; unparseable dates (0) sort last, most recently fetched breaks ties.
const ARTICLE_ORDER: &str =
    " ORDER BY COALESCE(published_ts, 0) DESC, fetched_at DESC, id ASC";

/// Derive the stable article id used as the merge key.
///
/// Two fetches that surface the same link for the same feed map to the
/// same id. Entries without a link fall back to their title.
pub fn article_id(feed_url: &str, link: &str, title: &str) -> String {
    let key = if link.is_empty() { title } else { link };
    let mut hasher = Sha256::new();
    hasher.update(feed_url.as_bytes());
    hasher.update([0x1f]);
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// An entry resolved into column values for one feed.
struct ArticleValues<'a> {
    id: String,
    entry: &'a Entry,
    published_ts: i64,
}

impl Database {
    // ========================================================================
    // Upsert & Retention
    // ========================================================================

    /// Insert or update `entries` for one feed, then enforce the retention cap.
    ///
    /// Existing rows get fresh descriptive fields (title, link, content,
    /// author, published, `published_ts`, `feed_name`, `fetched_at`) while
    /// `is_read`/`is_starred` are kept. Afterwards only the newest
    /// [`MAX_ARTICLES_PER_FEED`] non-starred articles of this feed survive;
    /// other feeds are never touched.
    ///
    /// Runs as one queued transaction. If the feed is no longer subscribed
    /// (removed while its fetch was in flight) nothing is written.
    pub async fn upsert_articles(
        &self,
        feed_url: &str,
        feed_name: &str,
        entries: &[Entry],
    ) -> Result<UpsertSummary, DatabaseError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.upsert_articles_at(feed_url, feed_name, entries, now)
            .await
    }

    pub(crate) async fn upsert_articles_at(
        &self,
        feed_url: &str,
        feed_name: &str,
        entries: &[Entry],
        now: i64,
    ) -> Result<UpsertSummary, DatabaseError> {
        // Last occurrence wins when a document repeats an entry.
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut rows: Vec<ArticleValues<'_>> = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = article_id(feed_url, &entry.link, &entry.title);
            let values = ArticleValues {
                published_ts: published_timestamp(&entry.published),
                id: id.clone(),
                entry,
            };
            match positions.get(&id) {
                Some(&i) => rows[i] = values,
                None => {
                    positions.insert(id, rows.len());
                    rows.push(values);
                }
            }
        }

        self.writes
            .run("upsert_articles", async {
                let mut tx = self.pool.begin().await?;

                let subscribed: Option<(i64,)> =
                    sqlx::query_as("SELECT 1 FROM feeds WHERE url = ?")
                        .bind(feed_url)
                        .fetch_optional(&mut *tx)
                        .await?;
                if subscribed.is_none() {
                    tracing::debug!(feed = %feed_url, "Skipping upsert for unsubscribed feed");
                    return Ok(UpsertSummary::default());
                }

                let mut summary = UpsertSummary::default();
                for chunk in rows.chunks(BATCH_SIZE) {
                    let existing =
                        count_existing(&mut tx, chunk.iter().map(|r| r.id.as_str())).await?;
                    summary.updated += existing;
                    summary.inserted += chunk.len() - existing;

                    let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                        "INSERT INTO articles (id, feed_url, feed_name, title, link, published, \
                         published_ts, content, author, is_read, is_starred, fetched_at) ",
                    );
                    builder.push_values(chunk, |mut b, row| {
                        b.push_bind(&row.id)
                            .push_bind(feed_url)
                            .push_bind(feed_name)
                            .push_bind(&row.entry.title)
                            .push_bind(&row.entry.link)
                            .push_bind(&row.entry.published)
                            .push_bind(row.published_ts)
                            .push_bind(&row.entry.content)
                            .push_bind(&row.entry.author)
                            .push_bind(false)
                            .push_bind(false)
                            .push_bind(now);
                    });
                    // is_read / is_starred keep their stored values
                    builder.push(
                        " ON CONFLICT(id) DO UPDATE SET \
                         feed_name = excluded.feed_name, \
                         title = excluded.title, \
                         link = excluded.link, \
                         published = excluded.published, \
                         published_ts = excluded.published_ts, \
                         content = excluded.content, \
                         author = excluded.author, \
                         fetched_at = excluded.fetched_at",
                    );
                    builder.build().execute(&mut *tx).await?;
                }

                summary.pruned =
                    prune_feed(&mut tx, feed_url, MAX_ARTICLES_PER_FEED).await? as usize;

                tx.commit().await?;
                tracing::debug!(
                    feed = %feed_url,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    pruned = summary.pruned,
                    "Articles upserted"
                );
                Ok(summary)
            })
            .await
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Articles matching `filter`, newest first.
    ///
    /// Ordered by `published_ts` descending, ties broken by `fetched_at`
    /// descending.
    pub async fn list_articles(
        &self,
        filter: &ArticleFilter,
    ) -> Result<Vec<Article>, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));

        match filter {
            ArticleFilter::All => {}
            ArticleFilter::Feed(url) => {
                builder.push(" WHERE feed_url = ");
                builder.push_bind(url);
            }
            ArticleFilter::Unread => {
                builder.push(" WHERE is_read = 0");
            }
            ArticleFilter::Starred => {
                builder.push(" WHERE is_starred = 1");
            }
        }
        builder.push(ARTICLE_ORDER);

        let rows: Vec<ArticleDbRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Get a single article by its id.
    pub async fn get_article(&self, id: &str) -> Result<Option<Article>, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Mark an article as read, returns whether it was changed.
    ///
    /// Idempotent: an already-read or unknown article is a no-op.
    pub async fn mark_read(&self, id: &str) -> Result<bool, DatabaseError> {
        self.writes
            .run("mark_read", async {
                let result =
                    sqlx::query("UPDATE articles SET is_read = 1 WHERE id = ? AND is_read = 0")
                        .bind(id)
                        .execute(&self.pool)
                        .await?;
                Ok(result.rows_affected() > 0)
            })
            .await
    }

    /// Flip the read flag, returning the new value (`None` for an unknown id).
    pub async fn toggle_read(&self, id: &str) -> Result<Option<bool>, DatabaseError> {
        self.writes
            .run("toggle_read", async {
                let row: Option<(bool,)> = sqlx::query_as(
                    "UPDATE articles SET is_read = NOT is_read WHERE id = ? RETURNING is_read",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.map(|(read,)| read))
            })
            .await
    }

    /// Flip the starred flag, returning the new value (`None` for an unknown id).
    pub async fn toggle_star(&self, id: &str) -> Result<Option<bool>, DatabaseError> {
        self.writes
            .run("toggle_star", async {
                let row: Option<(bool,)> = sqlx::query_as(
                    "UPDATE articles SET is_starred = NOT is_starred WHERE id = ? RETURNING is_starred",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.map(|(starred,)| starred))
            })
            .await
    }

    /// Mark exactly the given articles as read, returns how many changed.
    ///
    /// Typically called with the ids currently visible under a filter.
    /// Rows not in `ids` are untouched.
    pub async fn mark_all_read(&self, ids: &[String]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.writes
            .run("mark_all_read", async {
                let mut tx = self.pool.begin().await?;
                let mut changed = 0;

                for chunk in ids.chunks(ID_BATCH_SIZE) {
                    let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                        "UPDATE articles SET is_read = 1 WHERE is_read = 0 AND id IN (",
                    );
                    let mut separated = builder.separated(", ");
                    for id in chunk {
                        separated.push_bind(id);
                    }
                    separated.push_unseparated(")");
                    changed += builder.build().execute(&mut *tx).await?.rows_affected();
                }

                tx.commit().await?;
                Ok(changed)
            })
            .await
    }
}

/// Number of `ids` already stored.
async fn count_existing<'a>(
    conn: &mut SqliteConnection,
    ids: impl Iterator<Item = &'a str>,
) -> Result<usize, sqlx::Error> {
    let mut builder: QueryBuilder<sqlx::Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM articles WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let (count,): (i64,) = builder.build_query_as().fetch_one(&mut *conn).await?;
    Ok(count as usize)
}

/// Delete the non-starred articles of `feed_url` beyond the newest `keep`.
///
/// Newness is `(published_ts, fetched_at)` descending, the same order the
/// article list uses. Returns the number of rows deleted.
pub(crate) async fn prune_feed(
    conn: &mut SqliteConnection,
    feed_url: &str,
    keep: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM articles
        WHERE feed_url = ? AND is_starred = 0 AND id NOT IN (
            SELECT id FROM articles
            WHERE feed_url = ? AND is_starred = 0
            ORDER BY COALESCE(published_ts, 0) DESC, fetched_at DESC, id ASC
            LIMIT ?
        )
    "#,
    )
    .bind(feed_url)
    .bind(feed_url)
    .bind(keep)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        tracing::info!(
            feed = %feed_url,
            pruned = result.rows_affected(),
            keep,
            "Pruned feed backlog"
        );
    }
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Feed;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_feed(id: i64) -> Feed {
        Feed {
            url: format!("https://feed{}.example.com/rss", id),
            name: format!("Test Feed {}", id),
            added_at: 1_700_000_000_000 + id,
        }
    }

    async fn seeded(ids: &[i64]) -> (Database, Vec<Feed>) {
        let db = test_db().await;
        let feeds: Vec<Feed> = ids.iter().map(|&i| test_feed(i)).collect();
        for feed in &feeds {
            db.add_feed(feed).await.unwrap();
        }
        (db, feeds)
    }

    /// Entry whose `published` is `day` days after 2024-01-01.
    fn dated_entry(link: &str, day: i64) -> Entry {
        let ts = chrono::DateTime::from_timestamp(1_704_067_200 + day * 86_400, 0).unwrap();
        Entry {
            title: format!("Title {link}"),
            link: format!("https://example.com/{link}"),
            published: ts.to_rfc3339(),
            content: format!("<p>{link}</p>"),
            author: "Author".to_string(),
        }
    }

    #[test]
    fn test_article_id_is_deterministic() {
        let a = article_id("https://f.example.com", "https://f.example.com/1", "T");
        let b = article_id("https://f.example.com", "https://f.example.com/1", "Other title");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_article_id_falls_back_to_title() {
        let a = article_id("https://f.example.com", "", "Title A");
        let b = article_id("https://f.example.com", "", "Title B");
        assert_ne!(a, b);
        assert_eq!(a, article_id("https://f.example.com", "", "Title A"));
    }

    #[test]
    fn test_article_id_scoped_to_feed() {
        let a = article_id("https://a.example.com", "https://x.example.com/1", "T");
        let b = article_id("https://b.example.com", "https://x.example.com/1", "T");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_upsert_inserts_articles() {
        let (db, feeds) = seeded(&[1]).await;
        let entries = [dated_entry("a", 0), dated_entry("b", 1)];
        let summary = db
            .upsert_articles(&feeds[0].url, &feeds[0].name, &entries)
            .await
            .unwrap();
        assert_eq!(
            summary,
            UpsertSummary {
                inserted: 2,
                updated: 0,
                pruned: 0
            }
        );

        let articles = db.list_articles(&ArticleFilter::All).await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].link, "https://example.com/b");
        assert_eq!(articles[0].feed_name, "Test Feed 1");
        assert_eq!(articles[0].published_ts, 1_704_153_600_000);
        assert!(!articles[0].is_read);
        assert!(!articles[0].is_starred);
    }

    #[tokio::test]
    async fn test_upsert_same_entry_twice_is_idempotent() {
        let (db, feeds) = seeded(&[1]).await;
        let feed = &feeds[0];
        let entry = dated_entry("a", 0);

        db.upsert_articles_at(&feed.url, &feed.name, &[entry.clone()], 1_000)
            .await
            .unwrap();
        let id = article_id(&feed.url, &entry.link, &entry.title);
        db.mark_read(&id).await.unwrap();

        let summary = db
            .upsert_articles_at(&feed.url, &feed.name, &[entry.clone()], 2_000)
            .await
            .unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.updated, 1);

        let articles = db.list_articles(&ArticleFilter::All).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, id);
        assert!(articles[0].is_read);
        assert!(!articles[0].is_starred);
        assert_eq!(articles[0].fetched_at, 2_000);
    }

    #[tokio::test]
    async fn test_upsert_preserves_user_flags_and_updates_fields() {
        let (db, feeds) = seeded(&[1]).await;
        let feed = &feeds[0];
        let original = dated_entry("a", 0);
        db.upsert_articles(&feed.url, &feed.name, &[original.clone()])
            .await
            .unwrap();

        let id = article_id(&feed.url, &original.link, &original.title);
        db.mark_read(&id).await.unwrap();
        assert_eq!(db.toggle_star(&id).await.unwrap(), Some(true));

        let changed = Entry {
            title: "Updated Title".to_string(),
            content: "Updated content".to_string(),
            ..original
        };
        db.upsert_articles(&feed.url, "Renamed Feed", &[changed])
            .await
            .unwrap();

        let article = db.get_article(&id).await.unwrap().unwrap();
        assert_eq!(article.title, "Updated Title");
        assert_eq!(article.content, "Updated content");
        assert_eq!(article.feed_name, "Renamed Feed");
        assert!(article.is_read, "read status should be preserved");
        assert!(article.is_starred, "starred status should be preserved");
    }

    #[tokio::test]
    async fn test_upsert_duplicate_entries_in_one_batch() {
        let (db, feeds) = seeded(&[1]).await;
        let first = dated_entry("a", 0);
        let second = Entry {
            content: "second copy".to_string(),
            ..first.clone()
        };

        let summary = db
            .upsert_articles(&feeds[0].url, &feeds[0].name, &[first, second])
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);

        let articles = db.list_articles(&ArticleFilter::All).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].content, "second copy");
    }

    #[tokio::test]
    async fn test_upsert_for_unsubscribed_feed_writes_nothing() {
        let db = test_db().await;
        let summary = db
            .upsert_articles("https://gone.example.com/rss", "Gone", &[dated_entry("a", 0)])
            .await
            .unwrap();
        assert_eq!(summary, UpsertSummary::default());
        assert!(db.list_articles(&ArticleFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_empty_batch() {
        let (db, feeds) = seeded(&[1]).await;
        let summary = db
            .upsert_articles(&feeds[0].url, &feeds[0].name, &[])
            .await
            .unwrap();
        assert_eq!(summary, UpsertSummary::default());
    }

    #[tokio::test]
    async fn test_prune_is_per_feed() {
        let (db, feeds) = seeded(&[1, 2]).await;
        let (a, b) = (&feeds[0], &feeds[1]);

        let b_entries: Vec<Entry> = (0..10).map(|i| dated_entry(&format!("b{i}"), i)).collect();
        db.upsert_articles(&b.url, &b.name, &b_entries).await.unwrap();

        let a_entries: Vec<Entry> = (0..600).map(|i| dated_entry(&format!("a{i}"), i)).collect();
        let summary = db.upsert_articles(&a.url, &a.name, &a_entries).await.unwrap();
        assert_eq!(summary.inserted, 600);
        assert_eq!(summary.pruned, 100);

        let a_articles = db
            .list_articles(&ArticleFilter::Feed(a.url.clone()))
            .await
            .unwrap();
        assert_eq!(a_articles.len(), 500);
        // The 500 newest survive: days 100..600
        assert_eq!(a_articles[0].link, "https://example.com/a599");
        assert_eq!(a_articles[499].link, "https://example.com/a100");

        let b_articles = db
            .list_articles(&ArticleFilter::Feed(b.url.clone()))
            .await
            .unwrap();
        assert_eq!(b_articles.len(), 10);
    }

    #[tokio::test]
    async fn test_prune_uses_fetched_at_tie_break() {
        let (db, feeds) = seeded(&[1]).await;
        let feed = &feeds[0];

        // Same (unparseable) date for everything; only fetched_at differs.
        let undated = |i: usize| Entry {
            title: format!("Undated {i}"),
            link: format!("https://example.com/u{i}"),
            published: "sometime".to_string(),
            ..Default::default()
        };
        let old: Vec<Entry> = (0..300).map(undated).collect();
        let new: Vec<Entry> = (300..600).map(undated).collect();
        db.upsert_articles_at(&feed.url, &feed.name, &old, 1_000).await.unwrap();
        let summary = db
            .upsert_articles_at(&feed.url, &feed.name, &new, 2_000)
            .await
            .unwrap();
        assert_eq!(summary.pruned, 100);

        let articles = db.list_articles(&ArticleFilter::All).await.unwrap();
        assert_eq!(articles.len(), 500);
        assert_eq!(articles.iter().filter(|a| a.fetched_at == 2_000).count(), 300);
        assert!(articles.iter().all(|a| a.published_ts == 0));
    }

    #[tokio::test]
    async fn test_starred_articles_exempt_from_prune() {
        let (db, feeds) = seeded(&[1]).await;
        let feed = &feeds[0];

        let oldest = dated_entry("oldest", 0);
        db.upsert_articles(&feed.url, &feed.name, &[oldest.clone()])
            .await
            .unwrap();
        let starred_id = article_id(&feed.url, &oldest.link, &oldest.title);
        db.toggle_star(&starred_id).await.unwrap();

        let newer: Vec<Entry> = (1..=550).map(|i| dated_entry(&format!("n{i}"), i)).collect();
        db.upsert_articles(&feed.url, &feed.name, &newer).await.unwrap();

        let articles = db.list_articles(&ArticleFilter::All).await.unwrap();
        assert_eq!(articles.len(), 501);
        assert_eq!(articles.iter().filter(|a| !a.is_starred).count(), 500);
        assert!(db.get_article(&starred_id).await.unwrap().unwrap().is_starred);
    }

    #[tokio::test]
    async fn test_list_articles_filters() {
        let (db, feeds) = seeded(&[1, 2]).await;
        let entries = [dated_entry("a", 0), dated_entry("b", 1)];
        db.upsert_articles(&feeds[0].url, &feeds[0].name, &entries)
            .await
            .unwrap();
        db.upsert_articles(&feeds[1].url, &feeds[1].name, &[dated_entry("c", 2)])
            .await
            .unwrap();

        let all = db.list_articles(&ArticleFilter::All).await.unwrap();
        let links: Vec<&str> = all.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(
            links,
            vec!["https://example.com/c", "https://example.com/b", "https://example.com/a"]
        );

        db.mark_read(&all[0].id).await.unwrap();
        db.toggle_star(&all[1].id).await.unwrap();

        let unread = db.list_articles(&ArticleFilter::Unread).await.unwrap();
        assert_eq!(unread.len(), 2);
        assert!(unread.iter().all(|a| !a.is_read));

        let starred = db.list_articles(&ArticleFilter::Starred).await.unwrap();
        assert_eq!(starred.len(), 1);
        assert_eq!(starred[0].id, all[1].id);

        let by_feed = db
            .list_articles(&ArticleFilter::Feed(feeds[0].url.clone()))
            .await
            .unwrap();
        assert_eq!(by_feed.len(), 2);
        assert!(by_feed.iter().all(|a| a.feed_url == feeds[0].url));
    }

    #[tokio::test]
    async fn test_list_articles_ties_broken_by_fetched_at() {
        let (db, feeds) = seeded(&[1]).await;
        let feed = &feeds[0];
        db.upsert_articles_at(&feed.url, &feed.name, &[dated_entry("first", 0)], 1_000)
            .await
            .unwrap();
        let same_day = Entry {
            link: "https://example.com/second".to_string(),
            ..dated_entry("second", 0)
        };
        db.upsert_articles_at(&feed.url, &feed.name, &[same_day], 2_000)
            .await
            .unwrap();

        let articles = db.list_articles(&ArticleFilter::All).await.unwrap();
        assert_eq!(articles[0].link, "https://example.com/second");
        assert_eq!(articles[1].link, "https://example.com/first");
    }

    #[tokio::test]
    async fn test_mark_read() {
        let (db, feeds) = seeded(&[1]).await;
        db.upsert_articles(&feeds[0].url, &feeds[0].name, &[dated_entry("a", 0)])
            .await
            .unwrap();
        let id = db.list_articles(&ArticleFilter::All).await.unwrap()[0].id.clone();

        assert!(db.mark_read(&id).await.unwrap());
        assert!(!db.mark_read(&id).await.unwrap(), "second mark is a no-op");
        assert!(db.get_article(&id).await.unwrap().unwrap().is_read);
    }

    #[tokio::test]
    async fn test_toggle_read_and_star() {
        let (db, feeds) = seeded(&[1]).await;
        db.upsert_articles(&feeds[0].url, &feeds[0].name, &[dated_entry("a", 0)])
            .await
            .unwrap();
        let id = db.list_articles(&ArticleFilter::All).await.unwrap()[0].id.clone();

        assert_eq!(db.toggle_read(&id).await.unwrap(), Some(true));
        assert_eq!(db.toggle_read(&id).await.unwrap(), Some(false));
        assert_eq!(db.toggle_star(&id).await.unwrap(), Some(true));
        assert_eq!(db.toggle_star(&id).await.unwrap(), Some(false));

        assert_eq!(db.toggle_read("missing").await.unwrap(), None);
        assert_eq!(db.toggle_star("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_all_read_touches_only_given_ids() {
        let (db, feeds) = seeded(&[1]).await;
        let entries: Vec<Entry> = (0..5).map(|i| dated_entry(&format!("e{i}"), i)).collect();
        db.upsert_articles(&feeds[0].url, &feeds[0].name, &entries)
            .await
            .unwrap();

        let all = db.list_articles(&ArticleFilter::All).await.unwrap();
        let chosen: Vec<String> = all[..3].iter().map(|a| a.id.clone()).collect();

        assert_eq!(db.mark_all_read(&chosen).await.unwrap(), 3);
        assert_eq!(db.mark_all_read(&chosen).await.unwrap(), 0);

        let unread = db.list_articles(&ArticleFilter::Unread).await.unwrap();
        let unread_ids: Vec<&str> = unread.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(unread_ids, vec![all[3].id.as_str(), all[4].id.as_str()]);
    }

    #[tokio::test]
    async fn test_mark_all_read_unread_view_becomes_empty() {
        let (db, feeds) = seeded(&[1, 2]).await;
        db.upsert_articles(&feeds[0].url, &feeds[0].name, &[dated_entry("a", 0)])
            .await
            .unwrap();
        db.upsert_articles(&feeds[1].url, &feeds[1].name, &[dated_entry("b", 1)])
            .await
            .unwrap();

        let visible: Vec<String> = db
            .list_articles(&ArticleFilter::Unread)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        db.mark_all_read(&visible).await.unwrap();

        assert!(db.list_articles(&ArticleFilter::Unread).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_all_read_empty() {
        let db = test_db().await;
        assert_eq!(db.mark_all_read(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_are_serialized() {
        let (db, feeds) = seeded(&[1, 2, 3]).await;

        let mut handles = Vec::new();
        for feed in feeds.clone() {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let entries: Vec<Entry> =
                    (0..40).map(|i| dated_entry(&format!("{}-{i}", feed.name), i)).collect();
                db.upsert_articles(&feed.url, &feed.name, &entries).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let ids: Vec<String> = db
            .list_articles(&ArticleFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids.len(), 120);

        let toggles: Vec<_> = ids
            .iter()
            .take(20)
            .map(|id| {
                let db = db.clone();
                let id = id.clone();
                tokio::spawn(async move { db.toggle_star(&id).await })
            })
            .collect();
        for t in toggles {
            assert_eq!(t.await.unwrap().unwrap(), Some(true));
        }
        assert_eq!(db.list_articles(&ArticleFilter::Starred).await.unwrap().len(), 20);
    }
}
