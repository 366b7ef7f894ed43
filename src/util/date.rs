use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Formats tried after RFC 2822 and RFC 3339, interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Converts a source-supplied date string into Unix milliseconds.
///
/// RSS dates are RFC 2822 and Atom dates are RFC 3339; a handful of
/// timezone-less variants seen in the wild are accepted as UTC. Anything
/// unparseable yields `0`, which orders the article as the oldest.
pub fn published_timestamp(published: &str) -> i64 {
    let s = published.trim();
    if s.is_empty() {
        return 0;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.timestamp_millis();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis();
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return naive.and_utc().timestamp_millis();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return naive.and_utc().timestamp_millis();
        }
    }

    tracing::trace!(published = %s, "Unrecognized date format");
    0
}
