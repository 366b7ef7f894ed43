//! Durable feed and article store.
//!
//! [`Database`] is the only component that writes feeds and articles. All
//! writes pass through one FIFO queue, so concurrent upserts, flag toggles
//! and the legacy import never interleave; reads go straight to the pool.

mod articles;
mod feeds;
mod legacy;
mod queue;
mod schema;
mod types;

pub use articles::{article_id, MAX_ARTICLES_PER_FEED};
pub use legacy::{
    LegacyArticle, LegacyError, LegacyFeed, LegacyFile, LegacySnapshot, LegacySource,
    MigrationOutcome, LEGACY_MARKER_KEY, LEGACY_SNAPSHOT_VERSION,
};
pub use schema::Database;
pub use types::{Article, ArticleFilter, DatabaseError, Feed, UpsertSummary};
