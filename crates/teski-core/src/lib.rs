//! Core library for the Teski study companion's client-side plumbing.
//!
//! - `cache`: offline cache controller for the static app shell
//! - `ledger`: local, day-bucketed practice run counter
//! - `quest`: micro-quest sessions that feed the ledger
//! - `api`, `auth`: fetch contract, backend request building, token storage
//! - `store`, `clock`, `config`: injected capabilities and settings

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod models;
pub mod quest;
pub mod store;

pub use cache::CacheController;
pub use clock::{Clock, FixedClock, LocalClock};
pub use config::{LedgerOptions, Settings};
pub use ledger::PracticeLedger;
pub use store::KeyValueStore;
