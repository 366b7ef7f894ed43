use thiserror::Error;
use url::Url;

/// Errors that can occur when validating a subscription URL.
#[derive(Error, Debug)]
pub enum FeedUrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed subscription.
///
/// Surrounding whitespace is ignored. Only `http` and `https` URLs with a
/// host are accepted. Local and private addresses are allowed: this is a
/// single-user reader and self-hosted feeds are a normal use.
///
/// # Examples
///
/// ```
/// use lector::util::validate_feed_url;
///
/// let url = validate_feed_url("  https://example.com/feed.xml ").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// assert!(validate_feed_url("not a url").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, FeedUrlError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(FeedUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(FeedUrlError::MissingHost),
    }
}

/// The stored form of a feed URL, as produced when subscribing.
///
/// Strings that do not validate are returned trimmed but otherwise as-is,
/// so lookups of unusual stored keys still work.
pub fn normalize_feed_url(url_str: &str) -> String {
    match validate_feed_url(url_str) {
        Ok(url) => url.to_string(),
        Err(_) => url_str.trim().to_string(),
    }
}
