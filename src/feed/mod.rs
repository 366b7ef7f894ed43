//! Feed retrieval and parsing.
//!
//! - [`parser`] - Pure RSS/Atom parsing into [`Entry`] values (no I/O)
//! - [`fetcher`] - HTTP retrieval with timeout, redirect limit and size cap
//!
//! # Example
//!
//! ```ignore
//! use lector::feed::FeedFetcher;
//!
//! let fetcher = FeedFetcher::new()?;
//! let feed = fetcher.fetch("https://example.com/feed.xml").await?;
//! println!("{}: {} entries", feed.title, feed.items.len());
//! ```

mod fetcher;
mod parser;

pub use fetcher::{FeedFetcher, FetchError, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT};
pub use parser::{parse_feed, Entry, ParsedFeed, UNTITLED};
