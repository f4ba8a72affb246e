//! Search input for a discovery run

use chrono::{Days, NaiveDate};

use crate::error::{IngestionError, Result};

/// Immutable input to one discovery run.
///
/// The date window is `since` inclusive to `until` exclusive; each adapter
/// renders it in its publisher's own parameter names and date format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl SearchQuery {
    /// Builds a query whose window ends at the close of `run_date`.
    pub fn new(terms: impl Into<String>, since: NaiveDate, run_date: NaiveDate) -> Self {
        Self {
            terms: terms.into(),
            since,
            until: run_date.checked_add_days(Days::new(1)).unwrap_or(run_date),
        }
    }

    /// Last day inside the window
    pub fn last_day(&self) -> NaiveDate {
        self.until.pred_opt().unwrap_or(self.until)
    }
}

/// Parses a `--since` value relative to `today`.
///
/// Accepts a calendar date (`2025-10-16`) or a duration (`1d`, `36h`,
/// `2weeks`); durations count back from `today`.
pub fn parse_since_date(since_str: &str, today: NaiveDate) -> Result<NaiveDate> {
    let since_str = since_str.trim().to_lowercase();

    if since_str.is_empty() {
        return Err(IngestionError::InvalidInput("empty --since value".to_string()));
    }

    if let Ok(date) = NaiveDate::parse_from_str(&since_str, "%Y-%m-%d") {
        return Ok(date);
    }

    let duration = humantime::parse_duration(&since_str)
        .map_err(|e| IngestionError::InvalidInput(format!("invalid --since {since_str:?}: {e}")))?;

    // Partial days still reach back into the previous calendar day
    let secs = duration.as_secs();
    let days = secs / 86_400 + u64::from(secs % 86_400 != 0);

    today
        .checked_sub_days(Days::new(days))
        .ok_or_else(|| IngestionError::InvalidInput(format!("--since {since_str:?} is out of range")))
}
