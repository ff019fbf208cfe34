//! Local practice ledger.
//!
//! Tracks completed practice runs per local calendar day so "today" and
//! "this week" progress can be shown without a server round-trip. History is
//! kept for 14 days by default.

pub mod practice;

pub use practice::{prune_history, LedgerError, PracticeLedger, PRACTICE_RUNS_KEY};
