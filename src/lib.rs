//! Feed synchronization and article store for a personal feed reader.
//!
//! - [`feed`] fetches and parses RSS/Atom documents
//! - [`storage`] persists feeds and articles and reconciles fetched entries
//! - [`library`] orchestrates subscribe/refresh on top of both

pub mod config;
pub mod feed;
pub mod library;
pub mod storage;
pub mod util;
