//! Offline caching of the static app shell.
//!
//! This module provides the `CacheController`, which intercepts requests and
//! applies a two-tier policy:
//! - API-like, cross-origin, non-GET, and authenticated requests bypass the
//!   cache entirely
//! - Static same-origin assets are served stale-while-revalidate from the
//!   bucket named by the current cache version
//!
//! Buckets live in a `CacheStorage`, either in memory or as JSON files on disk.

pub mod controller;
pub mod policy;
pub mod storage;
pub mod tasks;

pub use controller::{
    ActivateOutcome, BucketStats, CacheController, ControllerStats, InstallOutcome, OfflineError,
};
pub use policy::{is_api_path, BypassPolicy, BypassReason};
pub use storage::{
    age_display, CacheStorage, CachedResponse, DiskCacheStorage, MemoryCacheStorage, StorageError,
};
pub use tasks::BackgroundTasks;
