//! Offline cache controller.
//!
//! Intercepts every outgoing request from the host. Requests the
//! `BypassPolicy` rejects go straight to the network. Everything else is
//! served stale-while-revalidate from the bucket named by the current cache
//! version, with the cached app shell as a last resort when offline.
//!
//! Lifecycle, driven explicitly by the host:
//! 1. `on_install` precaches the shell manifest into the current bucket
//! 2. `on_activate` deletes every other bucket
//! 3. `handle` serves requests for as long as this version is live

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::policy::BypassPolicy;
use super::storage::{age_display, CacheStorage, StorageError};
use super::tasks::BackgroundTasks;
use crate::api::{FetchError, Fetcher};
use crate::config::Settings;
use crate::models::{HttpRequest, HttpResponse};

/// Document served for navigations that fail while offline.
const APP_SHELL_PATH: &str = "/index.html";

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Invalid origin {origin}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("Network request failed: {0}")]
    Network(#[from] FetchError),

    #[error("Failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: String,
    pub precached: usize,
    /// Always true: a new version activates without waiting for old instances.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub version: String,
    pub deleted: Vec<String>,
    /// Always true: open clients are served by this version without a reload.
    pub clients_claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    pub name: String,
    /// `None` when the bucket exists but could not be read.
    pub entries: Option<usize>,
    pub last_updated: Option<DateTime<Utc>>,
    pub current: bool,
}

impl BucketStats {
    /// Age of the newest entry, e.g. `5m ago`.
    pub fn age_display(&self) -> Option<String> {
        self.last_updated
            .map(|at| age_display((Utc::now() - at).num_minutes()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStats {
    pub version: String,
    pub buckets: Vec<BucketStats>,
    pub pending_refreshes: usize,
}

pub struct CacheController {
    version: String,
    origin: Url,
    precache_manifest: Vec<String>,
    shell_key: String,
    policy: BypassPolicy,
    debug: bool,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    tasks: BackgroundTasks,
}

impl CacheController {
    pub fn new(
        settings: &Settings,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
    ) -> Result<Self, OfflineError> {
        let origin = Url::parse(&settings.origin).map_err(|e| OfflineError::InvalidOrigin {
            origin: settings.origin.clone(),
            reason: e.to_string(),
        })?;
        let shell_url = origin
            .join(APP_SHELL_PATH)
            .map_err(|e| OfflineError::InvalidOrigin {
                origin: settings.origin.clone(),
                reason: e.to_string(),
            })?;

        let policy = BypassPolicy::new(
            origin.origin().ascii_serialization(),
            settings.backend_host_tokens.clone(),
        );

        Ok(Self {
            version: settings.cache_version.clone(),
            shell_key: HttpRequest::get(shell_url).cache_key(),
            origin,
            precache_manifest: settings.precache_manifest.clone(),
            policy,
            debug: settings.debug,
            fetcher,
            storage,
            tasks: BackgroundTasks::new(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Background refreshes spawned by cache hits.
    pub fn background_tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    fn log_decision(&self, url: &Url, decision: &str) {
        if self.debug {
            info!(url = %url, decision = decision, "Intercepted request");
        } else {
            debug!(url = %url, decision = decision, "Intercepted request");
        }
    }

    /// Resolve a manifest entry or host-supplied path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, OfflineError> {
        self.origin.join(path).map_err(|e| OfflineError::Precache {
            url: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Create the current bucket and fill it with the precache manifest.
    ///
    /// All-or-nothing: if any manifest entry fails to fetch or is not
    /// cacheable, nothing is written and the install fails.
    pub async fn on_install(&self) -> Result<InstallOutcome, OfflineError> {
        info!(version = %self.version, assets = self.precache_manifest.len(), "Installing cache version");
        self.storage.open(&self.version).await?;

        let requests = self
            .precache_manifest
            .iter()
            .map(|path| self.resolve(path).map(HttpRequest::get))
            .collect::<Result<Vec<_>, _>>()?;

        let responses = join_all(requests.iter().map(|r| self.fetcher.fetch(r))).await;

        let mut entries = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(responses) {
            match result {
                Ok(response) if response.is_cacheable() => {
                    entries.push((request.cache_key(), response));
                }
                Ok(response) => {
                    return Err(OfflineError::Precache {
                        url: request.url.to_string(),
                        reason: format!(
                            "status {} ({:?} response)",
                            response.status, response.response_type
                        ),
                    });
                }
                Err(e) => {
                    return Err(OfflineError::Precache {
                        url: request.url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let precached = entries.len();
        for (key, response) in entries {
            self.storage.put(&self.version, &key, response).await?;
        }

        Ok(InstallOutcome {
            version: self.version.clone(),
            precached,
            skip_waiting: true,
        })
    }

    /// Delete every bucket that does not belong to the current version.
    pub async fn on_activate(&self) -> Result<ActivateOutcome, OfflineError> {
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name != self.version && self.storage.delete(&name).await? {
                info!(bucket = %name, "Deleted stale cache bucket");
                deleted.push(name);
            }
        }

        Ok(ActivateOutcome {
            version: self.version.clone(),
            deleted,
            clients_claimed: true,
        })
    }

    /// Serve one intercepted request.
    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, OfflineError> {
        if let Some(reason) = self.policy.bypass_reason(&request) {
            self.log_decision(&request.url, &format!("bypass: {}", reason));
            return Ok(self.fetcher.fetch(&request).await?);
        }

        let key = request.cache_key();

        match self.storage.match_request(&self.version, &key).await {
            Ok(Some(cached)) => {
                self.log_decision(&request.url, "cache hit");
                self.spawn_refresh(request, key);
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cache lookup failed, going to network"),
        }

        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.log_decision(&request.url, "cache miss, stored");
                    if let Err(e) = self
                        .storage
                        .put(&self.version, &key, response.clone())
                        .await
                    {
                        warn!(url = %request.url, error = %e, "Failed to store response");
                    }
                } else {
                    self.log_decision(&request.url, "cache miss, not cacheable");
                }
                Ok(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Fetch failed, trying app shell");
                match self.storage.match_request(&self.version, &self.shell_key).await {
                    Ok(Some(shell)) => {
                        self.log_decision(&request.url, "offline, served app shell");
                        Ok(shell)
                    }
                    _ => Err(OfflineError::Network(e)),
                }
            }
        }
    }

    /// Re-fetch a cache hit in the background, overwriting the entry only
    /// with a cacheable response. Failures keep the old entry.
    fn spawn_refresh(&self, request: HttpRequest, key: String) {
        let fetcher = self.fetcher.clone();
        let storage = self.storage.clone();
        let version = self.version.clone();

        self.tasks.spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(fresh) if fresh.is_cacheable() => {
                    match storage.put(&version, &key, fresh).await {
                        Ok(()) => debug!(url = %request.url, "Refreshed cache entry"),
                        Err(e) => debug!(url = %request.url, error = %e, "Failed to store refresh"),
                    }
                }
                Ok(fresh) => debug!(
                    url = %request.url,
                    status = fresh.status,
                    "Refresh not cacheable, keeping cached entry"
                ),
                Err(e) => debug!(url = %request.url, error = %e, "Background refresh failed"),
            }
        });
    }

    /// Per-bucket entry counts and freshness. An unreadable bucket is
    /// reported without counts instead of failing the whole listing.
    pub async fn stats(&self) -> Result<ControllerStats, OfflineError> {
        let mut buckets = Vec::new();
        for name in self.storage.keys().await? {
            let (entries, last_updated) = match self.storage.entry_count(&name).await {
                Ok(entries) => {
                    let last_updated = self
                        .storage
                        .last_cached_at(&name)
                        .await
                        .ok()
                        .flatten();
                    (Some(entries), last_updated)
                }
                Err(e) => {
                    warn!(bucket = %name, error = %e, "Cache bucket unreadable");
                    (None, None)
                }
            };
            buckets.push(BucketStats {
                current: name == self.version,
                name,
                entries,
                last_updated,
            });
        }

        Ok(ControllerStats {
            version: self.version.clone(),
            buckets,
            pending_refreshes: self.tasks.pending(),
        })
    }
}
