//! Ranking window key derivation.
//!
//! Daily windows are UTC calendar dates; weekly windows use ISO-8601 week
//! numbering (weeks start Monday, the year is the one owning that week's
//! Thursday). A Sunday at the end of December can therefore land in the
//! previous ISO year.

use chrono::{DateTime, Datelike, Utc};

/// Cache key of the all-time ranking window.
pub const ALL_TIME_WINDOW: &str = "rank:all_time";

/// UTC calendar date label, `YYYY-MM-DD`.
pub fn daily_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// ISO week label, `<ISO year>-W<week>` (no zero padding).
pub fn weekly_label(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{}", week.year(), week.week())
}

/// Fully-qualified cache keys for the time-bounded windows an event
/// falls into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowKeys {
    pub daily: String,
    pub weekly: String,
}

impl WindowKeys {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            daily: format!("rank:daily:{}", daily_label(at)),
            weekly: format!("rank:weekly:{}", weekly_label(at)),
        }
    }
}
