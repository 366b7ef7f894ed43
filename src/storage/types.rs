use thiserror::Error;

use super::legacy::LegacyError;

// ============================================================================
// Error Types
// ============================================================================

/// Failures of the durable store.
///
/// A write that returns an error has been rolled back in full.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Another instance of lector appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Schema creation failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The legacy snapshot could not be read or cleared
    #[error("Legacy import failed: {0}")]
    Legacy(#[from] LegacyError),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, mapping lock contention to [`DatabaseError::InstanceLocked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Which articles [`Database::list_articles`](super::Database::list_articles) returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ArticleFilter {
    #[default]
    All,
    /// Articles of one feed, by feed URL
    Feed(String),
    Unread,
    Starred,
}

/// Outcome of one `upsert_articles` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Rows that did not exist before
    pub inserted: usize,
    /// Existing rows whose descriptive fields were refreshed
    pub updated: usize,
    /// Non-starred rows deleted by the retention cap
    pub pruned: usize,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for Article queries (used by sqlx FromRow).
///
/// Descriptive columns are nullable in the schema; `into_article` maps NULL
/// to the empty-string sentinel.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: String,
    pub feed_url: String,
    pub feed_name: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub published: Option<String>,
    pub published_ts: Option<i64>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub fetched_at: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            feed_url: self.feed_url,
            feed_name: self.feed_name.unwrap_or_default(),
            title: self.title,
            link: self.link.unwrap_or_default(),
            published: self.published.unwrap_or_default(),
            published_ts: self.published_ts.unwrap_or(0),
            content: self.content.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            is_read: self.is_read,
            is_starred: self.is_starred,
            fetched_at: self.fetched_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    /// Natural key
    pub url: String,
    pub name: String,
    /// Subscription time, Unix milliseconds
    pub added_at: i64,
}

/// A stored article with its user flags.
///
/// This is a snapshot: mutating it does not touch the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Derived from `(feed_url, link-or-title)`, see [`article_id`](super::article_id)
    pub id: String,
    pub feed_url: String,
    /// Feed name at the time of the last upsert
    pub feed_name: String,
    pub title: String,
    pub link: String,
    /// Source date string, verbatim
    pub published: String,
    /// Parsed `published`, Unix milliseconds; 0 when unparseable
    pub published_ts: i64,
    pub content: String,
    pub author: String,
    pub is_read: bool,
    pub is_starred: bool,
    /// Time of the most recent upsert, Unix milliseconds
    pub fetched_at: i64,
}
