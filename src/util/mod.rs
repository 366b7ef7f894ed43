//! Utility functions for common operations.
//!
//! - **URL validation**: subscription URLs must be http(s) with a host
//! - **Date parsing**: source date strings to Unix-millisecond timestamps

mod date;
mod feed_url;

pub use date::published_timestamp;
pub use feed_url::{normalize_feed_url, validate_feed_url, FeedUrlError};
