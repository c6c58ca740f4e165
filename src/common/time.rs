//! Simple time helpers used by multiple services.

use chrono::{DateTime, Duration, Utc};

/// Current wall-clock timestamp.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp `days` days before now, used for trend windows.
pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}
