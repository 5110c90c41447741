//! 📅 Daily index naming. One UTC day, one index, zero opinions about your locale.

use chrono::{DateTime, Datelike, Utc};

/// 🏷️ The prefix every daily partition wears unless told otherwise.
pub const DEFAULT_INDEX_PREFIX: &str = "logs";

/// 📅 `logs-YYYY-MM-DD` for the UTC calendar day of `timestamp`.
///
/// Total function. If the caller doesn't have a timestamp, the caller picks "now".
/// This function never guesses.
pub fn name_for(timestamp: &DateTime<Utc>) -> String {
    DateIndexNamer::default().name_for(timestamp)
}

/// 🏭 Same thing, with a configurable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateIndexNamer {
    prefix: String,
}

impl DateIndexNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn name_for(&self, timestamp: &DateTime<Utc>) -> String {
        format!(
            "{}-{:04}-{:02}-{:02}",
            self.prefix,
            timestamp.year(),
            timestamp.month(),
            timestamp.day()
        )
    }
}

impl Default for DateIndexNamer {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_PREFIX)
    }
}
