//! Application settings.
//!
//! Settings are injected into each subsystem at construction time instead of
//! living in module-level globals. They are stored at
//! `~/.config/teski/settings.json`; a missing file yields the defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data/cache directory paths
const APP_NAME: &str = "teski";

/// Settings file name
const SETTINGS_FILE: &str = "settings.json";

/// Bump on every deploy of the static shell; stale buckets are evicted on
/// the next activation.
pub const DEFAULT_CACHE_VERSION: &str = "teski-shell-v1";

/// Assets fetched and stored as soon as a new controller version installs.
pub const DEFAULT_PRECACHE_MANIFEST: &[&str] =
    &["/", "/index.html", "/favicon.svg", "/manifest.webmanifest"];

/// Hostname tokens of deployed backends. Requests to any matching host are
/// never cached.
pub const DEFAULT_BACKEND_HOST_TOKENS: &[&str] =
    &["onrender.com", "fly.dev", "railway.app", "herokuapp.com"];

const DEFAULT_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_API_BASE_URL: &str = "https://teski-api.onrender.com";

/// Practice ledger windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerOptions {
    /// Days of history kept when pruning on write.
    pub retention_days: u32,
    /// Default window for the rolling aggregate.
    pub weekly_days: u32,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            retention_days: 14,
            weekly_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin the static shell is served from.
    pub origin: String,
    pub api_base_url: String,
    pub cache_version: String,
    pub precache_manifest: Vec<String>,
    pub backend_host_tokens: Vec<String>,
    /// Log every controller decision at info level.
    pub debug: bool,
    pub ledger: LedgerOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            precache_manifest: DEFAULT_PRECACHE_MANIFEST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            backend_host_tokens: DEFAULT_BACKEND_HOST_TOKENS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            debug: false,
            ledger: LedgerOptions::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = Self::settings_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(SETTINGS_FILE))
    }

    /// Directory holding the key/value store backing the ledger and token.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Directory holding the offline cache buckets.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
