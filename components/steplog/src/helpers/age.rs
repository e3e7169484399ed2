//! Human readable "N units ago" rendering.

// External crates
use chrono::{DateTime, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Render how long ago `then` was, relative to `now`.
///
/// Buckets follow the usual humanized form: `now`, `1 second ago`, `5 minutes ago`,
/// `2 weeks ago`, ... Timestamps in the future render as `now`.
pub fn humanize(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();

    let (count, unit) = match secs {
        s if s < 1 => return "now".to_string(),
        s if s < MINUTE => (s, "second"),
        s if s < 2 * MINUTE => (1, "minute"),
        s if s < HOUR => (s / MINUTE, "minute"),
        s if s < 2 * HOUR => (1, "hour"),
        s if s < DAY => (s / HOUR, "hour"),
        s if s < 2 * DAY => (1, "day"),
        s if s < WEEK => (s / DAY, "day"),
        s if s < 2 * WEEK => (1, "week"),
        s if s < MONTH => (s / WEEK, "week"),
        s if s < 2 * MONTH => (1, "month"),
        s if s < YEAR => (s / MONTH, "month"),
        s if s < 2 * YEAR => (1, "year"),
        s => (s / YEAR, "year"),
    };

    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}
