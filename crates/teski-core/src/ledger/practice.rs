//! Day-bucketed counter of completed practice runs.
//!
//! History is a JSON object of `YYYY-MM-DD` keys to run counts, stored under
//! a single key of the injected `KeyValueStore`. Writes prune the history to
//! the retention window; reads never mutate it.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::LedgerOptions;
use crate::models::{date_key, PracticeRunHistory, PracticeRunsChanged};
use crate::store::{KeyValueStore, StoreError};

/// Storage key for the serialized run history.
pub const PRACTICE_RUNS_KEY: &str = "teski.practiceRuns.v1";

/// Capacity of the change notification channel. Notifications carry no data,
/// so a lagging listener only needs to know that something changed.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to persist practice history: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to serialize practice history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Drop every bucket older than `keep_days` days before `today`.
///
/// Keys compare lexically, which for `YYYY-MM-DD` is chronological order.
/// A window reaching past the earliest representable date keeps everything.
pub fn prune_history(history: &mut PracticeRunHistory, keep_days: u32, today: NaiveDate) {
    let Some(cutoff) = days_before(today, keep_days) else {
        return;
    };
    let cutoff = date_key(cutoff);
    history.retain(|key, _| key.as_str() >= cutoff.as_str());
}

/// `today` minus `days`, or `None` when that falls outside chrono's range.
fn days_before(today: NaiveDate, days: u32) -> Option<NaiveDate> {
    today.checked_sub_signed(Duration::days(i64::from(days)))
}

pub struct PracticeLedger {
    /// `None` when the host has no durable storage; writes become no-ops.
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    options: LedgerOptions,
    changes: broadcast::Sender<PracticeRunsChanged>,
}

impl PracticeLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, options: LedgerOptions) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store: Some(store),
            clock,
            options,
            changes,
        }
    }

    /// A ledger with nowhere to persist: reads return zero, writes do nothing.
    pub fn detached(clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store: None,
            clock,
            options: LedgerOptions::default(),
            changes,
        }
    }

    pub fn options(&self) -> LedgerOptions {
        self.options
    }

    /// Receive a `PracticeRunsChanged` after every recorded run.
    pub fn subscribe(&self) -> broadcast::Receiver<PracticeRunsChanged> {
        self.changes.subscribe()
    }

    /// Stored history. Missing, unreadable, or corrupt data reads as empty.
    pub fn history(&self) -> PracticeRunHistory {
        let Some(ref store) = self.store else {
            return PracticeRunHistory::new();
        };

        let raw = match store.get(PRACTICE_RUNS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return PracticeRunHistory::new(),
            Err(e) => {
                debug!(error = %e, "Practice history unreadable, treating as empty");
                return PracticeRunHistory::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Practice history corrupt, treating as empty");
                PracticeRunHistory::new()
            }
        }
    }

    /// Record a single completed practice run for today.
    pub fn record_run(&self) -> Result<(), LedgerError> {
        self.record_runs(1)
    }

    /// Add `count` runs to today's bucket, prune, persist, and notify.
    pub fn record_runs(&self, count: u32) -> Result<(), LedgerError> {
        let Some(ref store) = self.store else {
            return Ok(());
        };

        let today = self.clock.today();
        let mut history = self.history();
        let bucket = history.entry(date_key(today)).or_insert(0);
        *bucket = bucket.saturating_add(count);
        let today_total = *bucket;

        prune_history(&mut history, self.options.retention_days, today);

        let serialized = serde_json::to_string(&history)?;
        store.set(PRACTICE_RUNS_KEY, &serialized)?;

        debug!(
            added = count,
            today = today_total,
            days = history.len(),
            "Recorded practice run"
        );

        // No receivers is fine; nobody is displaying a counter.
        let _ = self.changes.send(PracticeRunsChanged);
        Ok(())
    }

    /// Runs recorded today.
    pub fn today_count(&self) -> u32 {
        let key = date_key(self.clock.today());
        self.history().get(&key).copied().unwrap_or(0)
    }

    /// Runs over the configured rolling window (7 days unless overridden).
    pub fn weekly_count(&self) -> u32 {
        self.rolling_count(self.options.weekly_days)
    }

    /// Runs over today plus the previous `days - 1` days.
    ///
    /// Sums the stored buckets inside the window rather than walking every
    /// day, so the cost is bounded by the history size whatever `days` is.
    pub fn rolling_count(&self, days: u32) -> u32 {
        if days == 0 {
            return 0;
        }
        let today = self.clock.today();
        let history = self.history();
        let newest = date_key(today);
        let oldest = days_before(today, days - 1).map(date_key);

        history
            .range(..=newest)
            .filter(|(key, _)| oldest.as_ref().map_or(true, |oldest| *key >= oldest))
            .fold(0u32, |total, (_, runs)| total.saturating_add(*runs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::MemoryStore;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger_at(today: NaiveDate) -> (PracticeLedger, Arc<MemoryStore>, Arc<FixedClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(today));
        let ledger = PracticeLedger::new(store.clone(), clock.clone(), LedgerOptions::default());
        (ledger, store, clock)
    }

    fn seed(store: &MemoryStore, history: &[(&str, u32)]) {
        let map: PracticeRunHistory = history.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        store
            .set(PRACTICE_RUNS_KEY, &serde_json::to_string(&map).unwrap())
            .unwrap();
    }

    fn persisted(store: &MemoryStore) -> PracticeRunHistory {
        serde_json::from_str(&store.get(PRACTICE_RUNS_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_empty_history_reads_zero() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        assert_eq!(ledger.today_count(), 0);
        assert_eq!(ledger.weekly_count(), 0);
        assert_eq!(store.get(PRACTICE_RUNS_KEY).unwrap(), None);
    }

    #[test]
    fn test_two_runs_same_day() {
        let (ledger, _, _) = ledger_at(day(2026, 10, 16));
        ledger.record_run().unwrap();
        ledger.record_run().unwrap();
        assert_eq!(ledger.today_count(), 2);
    }

    #[test]
    fn test_yesterday_counts_toward_week_not_today() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        seed(&store, &[("2026-10-15", 1)]);
        ledger.record_run().unwrap();

        assert_eq!(ledger.today_count(), 1);
        assert_eq!(ledger.rolling_count(7), 2);
        assert_eq!(ledger.weekly_count(), 2);
    }

    #[test]
    fn test_rolling_window_excludes_older_days() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        // 6 days back is inside a 7-day window, 7 days back is not.
        seed(&store, &[("2026-10-10", 3), ("2026-10-09", 5), ("2026-10-16", 1)]);
        assert_eq!(ledger.rolling_count(7), 4);
        assert_eq!(ledger.rolling_count(8), 9);
        assert_eq!(ledger.rolling_count(1), 1);
        assert_eq!(ledger.rolling_count(0), 0);
    }

    #[test]
    fn test_record_prunes_old_buckets() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        seed(&store, &[("2026-09-26", 4), ("2026-10-15", 2)]);

        ledger.record_run().unwrap();

        let history = persisted(&store);
        assert!(!history.contains_key("2026-09-26"));
        assert_eq!(history.get("2026-10-15"), Some(&2));
        assert_eq!(history.get("2026-10-16"), Some(&1));
    }

    #[test]
    fn test_reads_do_not_prune() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        seed(&store, &[("2026-09-26", 4)]);

        assert_eq!(ledger.today_count(), 0);
        assert_eq!(ledger.rolling_count(30), 4);
        assert!(persisted(&store).contains_key("2026-09-26"));
    }

    #[test]
    fn test_prune_keeps_boundary_day() {
        let mut history: PracticeRunHistory = [
            ("2026-10-01".to_string(), 1),
            ("2026-10-02".to_string(), 1),
            ("2026-10-16".to_string(), 1),
        ]
        .into_iter()
        .collect();

        prune_history(&mut history, 14, day(2026, 10, 16));

        assert!(!history.contains_key("2026-10-01"));
        assert!(history.contains_key("2026-10-02"));
        assert!(history.contains_key("2026-10-16"));
    }

    #[test]
    fn test_prune_across_year_boundary() {
        let mut history: PracticeRunHistory = [
            ("2025-12-20".to_string(), 2),
            ("2025-12-31".to_string(), 1),
        ]
        .into_iter()
        .collect();

        prune_history(&mut history, 3, day(2026, 1, 2));

        assert_eq!(history.len(), 1);
        assert!(history.contains_key("2025-12-31"));
    }

    #[test]
    fn test_corrupt_history_reads_empty_and_is_replaced() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        store.set(PRACTICE_RUNS_KEY, "{oops").unwrap();

        assert_eq!(ledger.today_count(), 0);
        ledger.record_run().unwrap();
        assert_eq!(ledger.today_count(), 1);
    }

    #[test]
    fn test_day_rollover_starts_new_bucket() {
        let (ledger, _, clock) = ledger_at(day(2026, 10, 16));
        ledger.record_runs(3).unwrap();
        clock.advance_days(1);

        assert_eq!(ledger.today_count(), 0);
        ledger.record_run().unwrap();
        assert_eq!(ledger.today_count(), 1);
        assert_eq!(ledger.weekly_count(), 4);
    }

    #[test]
    fn test_custom_retention_window() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(day(2026, 10, 16)));
        let options = LedgerOptions {
            retention_days: 2,
            weekly_days: 3,
        };
        let ledger = PracticeLedger::new(store.clone(), clock, options);
        seed(&store, &[("2026-10-13", 1), ("2026-10-14", 1)]);

        ledger.record_run().unwrap();

        let history = persisted(&store);
        assert_eq!(history.len(), 2);
        assert_eq!(ledger.weekly_count(), 2);
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(day(2026, 10, 16)));
        let options = LedgerOptions {
            retention_days: u32::MAX,
            weekly_days: u32::MAX,
        };
        let ledger = PracticeLedger::new(store.clone(), clock, options);
        seed(&store, &[("1999-01-01", 2), ("2026-10-15", 1)]);

        ledger.record_run().unwrap();

        let history = persisted(&store);
        assert_eq!(history.len(), 3);
        assert_eq!(ledger.weekly_count(), 4);
        assert_eq!(ledger.rolling_count(u32::MAX), 4);
    }

    #[test]
    fn test_prune_window_past_min_date_is_noop() {
        let mut history: PracticeRunHistory = [("2026-10-16".to_string(), 1)].into_iter().collect();
        prune_history(&mut history, u32::MAX, day(2026, 10, 16));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_rolling_count_ignores_future_buckets() {
        let (ledger, store, _) = ledger_at(day(2026, 10, 16));
        seed(&store, &[("2026-10-17", 9), ("2026-10-16", 1)]);
        assert_eq!(ledger.rolling_count(7), 1);
    }

    #[test]
    fn test_record_notifies_subscribers() {
        let (ledger, _, _) = ledger_at(day(2026, 10, 16));
        let mut changes = ledger.subscribe();

        ledger.record_run().unwrap();

        assert_eq!(changes.try_recv().unwrap(), PracticeRunsChanged);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_detached_ledger_is_noop() {
        let clock = Arc::new(FixedClock::new(day(2026, 10, 16)));
        let ledger = PracticeLedger::detached(clock);
        let mut changes = ledger.subscribe();

        ledger.record_run().unwrap();

        assert_eq!(ledger.today_count(), 0);
        assert_eq!(ledger.weekly_count(), 0);
        assert!(changes.try_recv().is_err());
    }
}
