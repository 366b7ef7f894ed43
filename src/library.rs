//! Subscribe / refresh orchestration over the fetcher and the store.
//!
//! [`Library`] is what a presentation layer holds. It owns no state of its
//! own beyond the read generation counter; everything durable lives in
//! [`Database`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::feed::{FeedFetcher, FetchError, UNTITLED};
use crate::storage::{Article, ArticleFilter, Database, DatabaseError, Feed};
use crate::util::{normalize_feed_url, validate_feed_url, FeedUrlError};

// ============================================================================
// Error Types
// ============================================================================

/// Why a subscription was refused. Displayed to the user as-is.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] FeedUrlError),

    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("Feed unreachable: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Why one feed did not update during a refresh.
#[derive(Debug, Error)]
pub enum RefreshFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Aggregate outcome of [`Library::refresh`].
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Feeds whose entries were stored
    pub succeeded: usize,
    /// Articles that were new to the store
    pub inserted: usize,
    /// Per-feed failures, by feed URL
    pub failures: Vec<(String, RefreshFailure)>,
}

impl RefreshReport {
    /// The "some feeds failed" signal.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

// ============================================================================
// Read Generation
// ============================================================================

/// Monotonic counter that marks all but the newest read as stale.
///
/// Each read takes a ticket before it starts; when it completes it is
/// applied only if no newer ticket has been issued in the meantime.
#[derive(Debug, Default)]
pub struct ReadGeneration(AtomicU64);

impl ReadGeneration {
    /// Issue the next ticket. Tickets start at 1.
    pub fn issue(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Whether `ticket` is still the newest one issued.
    pub fn is_current(&self, ticket: u64) -> bool {
        self.0.load(Ordering::Acquire) == ticket
    }
}

// ============================================================================
// Library
// ============================================================================

/// Feed subscriptions and articles, as seen by a presentation layer.
///
/// Cheap to clone; clones share the store, HTTP client and read counter.
#[derive(Clone)]
pub struct Library {
    db: Database,
    fetcher: FeedFetcher,
    reads: Arc<ReadGeneration>,
}

impl Library {
    pub fn new(db: Database, fetcher: FeedFetcher) -> Self {
        Self {
            db,
            fetcher,
            reads: Arc::new(ReadGeneration::default()),
        }
    }

    /// The underlying store, for flag mutations and feed listing.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Subscribe to a feed and store its current entries.
    ///
    /// The URL is validated and checked against existing subscriptions
    /// before any network request. The feed is named `name` if given,
    /// otherwise by the document's title, otherwise "Untitled". If the
    /// entries cannot be stored the feed is removed again.
    pub async fn subscribe(&self, url: &str, name: Option<&str>) -> Result<Feed, SubscribeError> {
        let url = validate_feed_url(url)?.to_string();

        if self.db.get_feed(&url).await?.is_some() {
            return Err(SubscribeError::AlreadySubscribed(url));
        }

        let parsed = self.fetcher.fetch(&url).await?;

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| Some(parsed.title.trim()).filter(|t| !t.is_empty()))
            .unwrap_or(UNTITLED)
            .to_string();
        let feed = Feed {
            url,
            name,
            added_at: chrono::Utc::now().timestamp_millis(),
        };

        // Lost a race with a concurrent subscribe to the same URL
        if !self.db.add_feed(&feed).await? {
            return Err(SubscribeError::AlreadySubscribed(feed.url));
        }

        // Undo the feed row so the subscription can be retried
        let summary = match self
            .db
            .upsert_articles(&feed.url, &feed.name, &parsed.items)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(undo) = self.db.remove_feed(&feed.url).await {
                    tracing::warn!(
                        feed = %feed.url,
                        error = %undo,
                        "Failed to roll back subscription"
                    );
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            feed = %feed.url,
            name = %feed.name,
            articles = summary.inserted,
            "Subscribed"
        );
        Ok(feed)
    }

    /// Remove a feed and its articles. Returns whether it existed.
    ///
    /// `url` may be given as typed when subscribing; it is normalized the
    /// same way. A presentation layer showing this feed must drop its
    /// selection.
    pub async fn unsubscribe(&self, url: &str) -> Result<bool, DatabaseError> {
        self.db.remove_feed(&normalize_feed_url(url)).await
    }

    /// Fetch every subscribed feed concurrently and store the results.
    ///
    /// All fetches settle before anything is written. A failing feed never
    /// blocks the others; its failure is recorded in the report. The only
    /// error returned is failure to list the feeds in the first place.
    pub async fn refresh(&self) -> Result<RefreshReport, DatabaseError> {
        let feeds = self.db.list_feeds().await?;
        tracing::debug!(feeds = feeds.len(), "Refreshing");

        let results = join_all(feeds.iter().map(|feed| async move {
            let result = self.fetcher.fetch(&feed.url).await;
            (feed, result)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (feed, result) in results {
            let parsed = match result {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(feed = %feed.url, error = %e, "Feed fetch failed");
                    report.failures.push((feed.url.clone(), e.into()));
                    continue;
                }
            };

            match self
                .db
                .upsert_articles(&feed.url, &feed.name, &parsed.items)
                .await
            {
                Ok(summary) => {
                    tracing::debug!(
                        feed = %feed.url,
                        inserted = summary.inserted,
                        updated = summary.updated,
                        "Feed refreshed"
                    );
                    report.succeeded += 1;
                    report.inserted += summary.inserted;
                }
                Err(e) => {
                    tracing::warn!(feed = %feed.url, error = %e, "Failed to store feed articles");
                    report.failures.push((feed.url.clone(), e.into()));
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failures.len(),
            new_articles = report.inserted,
            "Refresh complete"
        );
        Ok(report)
    }

    /// Read articles for display, discarding the result if superseded.
    ///
    /// Returns `Ok(None)` when another `load_articles` call started after
    /// this one did; only the newest read is meant to reach the screen.
    pub async fn load_articles(
        &self,
        filter: &ArticleFilter,
    ) -> Result<Option<Vec<Article>>, DatabaseError> {
        let ticket = self.reads.issue();
        let articles = self.db.list_articles(filter).await?;

        if !self.reads.is_current(ticket) {
            tracing::debug!(ticket, "Ignoring stale article read");
            return Ok(None);
        }
        Ok(Some(articles))
    }
}
