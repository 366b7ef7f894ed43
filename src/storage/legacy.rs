//! One-shot import of the pre-database flat snapshot.
//!
//! Older releases kept everything in a single JSON document: a feed list, an
//! article list, and the ids of read and starred articles. On first start
//! against a fresh store that document is merged in, a marker is written to
//! the `meta` table, and the document is removed. Once the marker exists the
//! import never runs again.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::articles::{article_id, prune_feed, MAX_ARTICLES_PER_FEED};
use super::schema::Database;
use super::types::DatabaseError;
use crate::feed::UNTITLED;
use crate::util::published_timestamp;

/// `meta` key recording that the legacy snapshot has been absorbed.
pub const LEGACY_MARKER_KEY: &str = "legacy_import_done";

/// Highest snapshot version this build understands.
pub const LEGACY_SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum LegacyError {
    #[error("Failed to access legacy snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid legacy snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported legacy snapshot version {0}")]
    UnsupportedVersion(u32),
}

// ============================================================================
// Snapshot Types
// ============================================================================

/// The flat document older releases persisted.
///
/// Every field is optional on the wire; anything missing takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacySnapshot {
    pub version: u32,
    pub feeds: Vec<LegacyFeed>,
    pub articles: Vec<LegacyArticle>,
    pub read_ids: Vec<String>,
    pub starred_ids: Vec<String>,
}

impl Default for LegacySnapshot {
    fn default() -> Self {
        Self {
            version: LEGACY_SNAPSHOT_VERSION,
            feeds: Vec::new(),
            articles: Vec::new(),
            read_ids: Vec::new(),
            starred_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyFeed {
    pub url: String,
    pub name: Option<String>,
    pub added_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyArticle {
    /// Missing ids are re-derived from feed URL and link/title.
    pub id: Option<String>,
    pub feed_url: String,
    pub feed_name: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub is_read: Option<bool>,
    pub is_starred: Option<bool>,
    pub fetched_at: Option<i64>,
}

/// Where the legacy snapshot lives.
pub trait LegacySource {
    /// Read the snapshot, `None` if there is nothing to import.
    fn load(&self) -> Result<Option<LegacySnapshot>, LegacyError>;

    /// Remove the snapshot after a successful import.
    fn clear(&self) -> Result<(), LegacyError>;
}

/// A snapshot stored as a JSON file.
#[derive(Debug, Clone)]
pub struct LegacyFile {
    path: PathBuf,
}

impl LegacyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LegacySource for LegacyFile {
    fn load(&self) -> Result<Option<LegacySnapshot>, LegacyError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LegacyError::Io(e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: LegacySnapshot = serde_json::from_str(&content)?;
        if snapshot.version > LEGACY_SNAPSHOT_VERSION {
            return Err(LegacyError::UnsupportedVersion(snapshot.version));
        }
        Ok(Some(snapshot))
    }

    fn clear(&self) -> Result<(), LegacyError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(LegacyError::Io(e)),
            _ => Ok(()),
        }
    }
}

/// Result of [`Database::import_legacy_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The marker was already set; nothing was read.
    AlreadyDone,
    /// No snapshot existed; the marker is now set.
    NoLegacyData,
    /// The snapshot was merged in. Counts are rows actually inserted.
    Imported {
        feeds: usize,
        articles: usize,
        /// Articles dropped because their feed is unknown
        skipped: usize,
    },
}

impl Database {
    /// Absorb the legacy snapshot once, then never again.
    ///
    /// Rows are inserted only if absent, so an existing store row with the
    /// same id keeps its values and an interrupted import can be retried
    /// without duplicates. The marker is committed in the same transaction as
    /// the rows. Clearing the source happens after commit; if that fails the
    /// marker still prevents a second import.
    ///
    /// Must run before any other write is issued.
    pub async fn import_legacy_if_needed(
        &self,
        source: &impl LegacySource,
    ) -> Result<MigrationOutcome, DatabaseError> {
        if self.legacy_checked.load(Ordering::Acquire) {
            return Ok(MigrationOutcome::AlreadyDone);
        }

        let outcome = self
            .writes
            .run("import_legacy", async {
                if self.get_meta(LEGACY_MARKER_KEY).await?.is_some() {
                    return Ok(MigrationOutcome::AlreadyDone);
                }

                let now = chrono::Utc::now().timestamp_millis();
                let snapshot = source.load()?;
                let mut tx = self.pool.begin().await?;

                let outcome = match snapshot {
                    None => MigrationOutcome::NoLegacyData,
                    Some(snapshot) => {
                        let read: HashSet<&str> =
                            snapshot.read_ids.iter().map(String::as_str).collect();
                        let starred: HashSet<&str> =
                            snapshot.starred_ids.iter().map(String::as_str).collect();

                        let mut feeds = 0;
                        for feed in snapshot.feeds.iter().filter(|f| !f.url.is_empty()) {
                            let result = sqlx::query(
                                "INSERT OR IGNORE INTO feeds (url, name, added_at) VALUES (?, ?, ?)",
                            )
                            .bind(&feed.url)
                            .bind(feed.name.as_deref().unwrap_or(UNTITLED))
                            .bind(feed.added_at.unwrap_or(now))
                            .execute(&mut *tx)
                            .await?;
                            feeds += result.rows_affected() as usize;
                        }

                        // Names as stored, which may predate the snapshot
                        let known: HashMap<String, String> =
                            sqlx::query_as::<_, (String, String)>("SELECT url, name FROM feeds")
                                .fetch_all(&mut *tx)
                                .await?
                                .into_iter()
                                .collect();

                        let mut articles = 0;
                        let mut skipped = 0;
                        let mut touched: HashSet<&str> = HashSet::new();
                        for article in &snapshot.articles {
                            let Some(feed_name) = known.get(&article.feed_url) else {
                                skipped += 1;
                                continue;
                            };

                            let title = article.title.as_deref().unwrap_or(UNTITLED);
                            let link = article.link.as_deref().unwrap_or_default();
                            let id = article
                                .id
                                .clone()
                                .unwrap_or_else(|| article_id(&article.feed_url, link, title));
                            let published = article.published.as_deref().unwrap_or_default();
                            let is_read =
                                article.is_read.unwrap_or(false) || read.contains(id.as_str());
                            let is_starred = article.is_starred.unwrap_or(false)
                                || starred.contains(id.as_str());

                            let result = sqlx::query(
                                "INSERT OR IGNORE INTO articles (id, feed_url, feed_name, title, link, \
                                 published, published_ts, content, author, is_read, is_starred, fetched_at) \
                                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                            )
                            .bind(&id)
                            .bind(&article.feed_url)
                            .bind(article.feed_name.as_deref().unwrap_or(feed_name))
                            .bind(title)
                            .bind(link)
                            .bind(published)
                            .bind(published_timestamp(published))
                            .bind(article.content.as_deref().unwrap_or_default())
                            .bind(article.author.as_deref().unwrap_or_default())
                            .bind(is_read)
                            .bind(is_starred)
                            .bind(article.fetched_at.unwrap_or(now))
                            .execute(&mut *tx)
                            .await?;
                            articles += result.rows_affected() as usize;
                            touched.insert(&article.feed_url);
                        }

                        for feed_url in touched {
                            prune_feed(&mut tx, feed_url, MAX_ARTICLES_PER_FEED).await?;
                        }

                        MigrationOutcome::Imported {
                            feeds,
                            articles,
                            skipped,
                        }
                    }
                };

                sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
                    .bind(LEGACY_MARKER_KEY)
                    .bind(now.to_string())
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(outcome)
            })
            .await?;

        if let MigrationOutcome::Imported {
            feeds,
            articles,
            skipped,
        } = outcome
        {
            tracing::info!(feeds, articles, skipped, "Imported legacy snapshot");
            if let Err(e) = source.clear() {
                tracing::warn!(error = %e, "Failed to remove legacy snapshot after import");
            }
        }

        self.legacy_checked.store(true, Ordering::Release);
        Ok(outcome)
    }
}
