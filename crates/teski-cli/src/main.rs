//! Teski CLI - drives the offline cache controller and practice ledger from
//! a terminal.
//!
//! Usage:
//!   teski practice record [N]
//!   teski practice stats [DAYS]
//!   teski cache install | activate | status
//!   teski fetch <path-or-url>
//!   teski token set <TOKEN> | clear
//!   teski api <path>

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use teski_core::api::{ApiRequestBuilder, ReqwestFetcher};
use teski_core::auth::AuthTokenStore;
use teski_core::cache::DiskCacheStorage;
use teski_core::models::HttpRequest;
use teski_core::store::FileStore;
use teski_core::{CacheController, KeyValueStore, LocalClock, PracticeLedger, Settings};

/// Key/value store file inside the data directory
const STORE_FILE: &str = "storage.json";

/// Overrides `Settings.origin` when set
const ORIGIN_ENV: &str = "TESKI_ORIGIN";

const USAGE: &str = "\
usage:
  teski practice record [N]
  teski practice stats [DAYS]
  teski cache install | activate | status
  teski fetch <path-or-url>
  teski token set <TOKEN> | clear
  teski api <path>";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_settings() -> Result<Settings> {
    let mut settings = Settings::load()?;
    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
        settings.origin = origin;
    }
    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<Arc<dyn KeyValueStore>> {
    let path = settings.data_dir()?.join(STORE_FILE);
    let store = FileStore::new(path).context("Failed to open local storage")?;
    Ok(Arc::new(store))
}

fn open_ledger(settings: &Settings) -> Result<PracticeLedger> {
    Ok(PracticeLedger::new(
        open_store(settings)?,
        Arc::new(LocalClock),
        settings.ledger,
    ))
}

fn open_controller(settings: &Settings) -> Result<CacheController> {
    let fetcher = ReqwestFetcher::new(&settings.origin)?;
    let storage = DiskCacheStorage::new(settings.cache_dir()?)
        .context("Failed to open cache directory")?;
    Ok(CacheController::new(
        settings,
        Arc::new(fetcher),
        Arc::new(storage),
    )?)
}

fn parse_count(arg: Option<&String>, default: u32) -> Result<u32> {
    match arg {
        Some(value) => value
            .parse()
            .with_context(|| format!("Expected a non-negative number, got '{}'", value)),
        None => Ok(default),
    }
}

fn practice_command(settings: &Settings, args: &[String]) -> Result<()> {
    let ledger = open_ledger(settings)?;
    match args.first().map(String::as_str) {
        Some("record") => {
            let count = parse_count(args.get(1), 1)?;
            ledger.record_runs(count)?;
            println!("Recorded {} run(s). Today: {}", count, ledger.today_count());
        }
        Some("stats") => {
            let days = parse_count(args.get(1), settings.ledger.weekly_days)?;
            println!("Today: {}", ledger.today_count());
            println!("Last {} days: {}", days, ledger.rolling_count(days));
            for (day, runs) in ledger.history().iter().rev() {
                println!("  {}  {}", day, runs);
            }
        }
        _ => anyhow::bail!(USAGE),
    }
    Ok(())
}

async fn cache_command(settings: &Settings, args: &[String]) -> Result<()> {
    let controller = open_controller(settings)?;
    match args.first().map(String::as_str) {
        Some("install") => {
            let outcome = controller.on_install().await?;
            println!("Installed {} ({} assets precached)", outcome.version, outcome.precached);
        }
        Some("activate") => {
            let outcome = controller.on_activate().await?;
            if outcome.deleted.is_empty() {
                println!("Activated {} (no stale buckets)", outcome.version);
            } else {
                println!(
                    "Activated {} (deleted: {})",
                    outcome.version,
                    outcome.deleted.join(", ")
                );
            }
        }
        Some("status") => {
            let stats = controller.stats().await?;
            println!("Current version: {}", stats.version);
            for bucket in &stats.buckets {
                let marker = if bucket.current { "*" } else { " " };
                match bucket.entries {
                    Some(entries) => println!(
                        "{} {}  {} entries, updated {}",
                        marker,
                        bucket.name,
                        entries,
                        bucket.age_display().unwrap_or_else(|| "never".to_string())
                    ),
                    None => println!("{} {}  unreadable", marker, bucket.name),
                }
            }
        }
        _ => anyhow::bail!(USAGE),
    }
    Ok(())
}

async fn fetch_command(settings: &Settings, args: &[String]) -> Result<()> {
    let target = args.first().ok_or_else(|| anyhow::anyhow!(USAGE))?;
    let controller = open_controller(settings)?;

    let url = controller.resolve(target)?;
    let response = controller.handle(HttpRequest::get(url)).await?;
    println!(
        "{} {:?} {} bytes",
        response.status,
        response.response_type,
        response.body.len()
    );

    // Let a cache-hit refresh land before the process exits.
    controller.background_tasks().wait_idle().await;
    Ok(())
}

fn token_command(settings: &Settings, args: &[String]) -> Result<()> {
    let tokens = AuthTokenStore::new(open_store(settings)?);
    match (args.first().map(String::as_str), args.get(1)) {
        (Some("set"), Some(token)) => {
            tokens.set_token(token)?;
            println!("Token saved");
        }
        (Some("clear"), _) => {
            tokens.clear()?;
            println!("Token cleared");
        }
        _ => anyhow::bail!(USAGE),
    }
    Ok(())
}

/// Send a backend request through the controller; it is always bypassed.
async fn api_command(settings: &Settings, args: &[String]) -> Result<()> {
    let path = args.first().ok_or_else(|| anyhow::anyhow!(USAGE))?;
    let tokens = AuthTokenStore::new(open_store(settings)?);
    let builder = ApiRequestBuilder::new(&settings.api_base_url, tokens)?;
    let controller = open_controller(settings)?;

    let response = controller.handle(builder.get(path)?).await?;
    println!("{} {} bytes", response.status, response.body.len());
    println!("{}", response.body_text());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = load_settings()?;
    info!(origin = %settings.origin, version = %settings.cache_version, "Teski CLI starting");

    match args.first().map(String::as_str) {
        Some("practice") => practice_command(&settings, &args[1..]),
        Some("cache") => cache_command(&settings, &args[1..]).await,
        Some("fetch") => fetch_command(&settings, &args[1..]).await,
        Some("token") => token_command(&settings, &args[1..]),
        Some("api") => api_command(&settings, &args[1..]).await,
        _ => {
            eprintln!("{}", USAGE);
            Ok(())
        }
    }
}
