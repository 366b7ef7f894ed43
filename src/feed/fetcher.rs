use crate::feed::parser::{parse_feed, ParsedFeed};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::time::Duration;
use thiserror::Error;

/// Default bound on a whole fetch (connect, headers and body).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);
/// Default redirect hop limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while fetching a feed.
///
/// Parsing never fails, so every variant is a transport-level problem.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetch did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Network-level error (DNS, connection, TLS, redirect loop, etc.)
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Retrieves and parses one feed document per call.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedFetcher {
    /// Builds a fetcher with the default 12s timeout and 10-hop redirect limit.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_limits(DEFAULT_TIMEOUT, DEFAULT_MAX_REDIRECTS)
    }

    /// Builds a fetcher with an explicit timeout and redirect limit.
    pub fn with_limits(timeout: Duration, max_redirects: usize) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()
            .map_err(FetchError::Transport)?;

        Ok(Self { client, timeout })
    }

    /// Fetches `url` and parses the body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - the whole exchange exceeded the timeout
    /// - [`FetchError::HttpStatus`] - non-2xx response (after redirects)
    /// - [`FetchError::Transport`] - connection, TLS or body read failure
    /// - [`FetchError::ResponseTooLarge`] - body over 10MB
    pub async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let bytes = tokio::time::timeout(self.timeout, self.fetch_body(url))
            .await
            .map_err(|_| FetchError::Timeout)??;

        let text = String::from_utf8_lossy(&bytes);
        let feed = parse_feed(&text);
        tracing::debug!(
            url = %url,
            bytes = bytes.len(),
            items = feed.items.len(),
            "Fetched feed"
        );
        Ok(feed)
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
