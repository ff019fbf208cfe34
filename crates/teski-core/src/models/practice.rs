use std::collections::BTreeMap;

use chrono::NaiveDate;

/// Day key (`YYYY-MM-DD`, local calendar) to number of completed runs.
///
/// Keys sort lexically in chronological order, which pruning relies on.
pub type PracticeRunHistory = BTreeMap<String, u32>;

/// Broadcast after every recorded practice run. Carries no payload;
/// listeners re-read whichever aggregate they display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PracticeRunsChanged;

/// Format a calendar date as a zero-padded `YYYY-MM-DD` key.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
