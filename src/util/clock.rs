//! Wall-clock helpers for store-assigned timestamps.

use time::OffsetDateTime;

/// Current UTC time as epoch milliseconds.
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
