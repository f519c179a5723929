// # mangasyncd - Release Tracker Daemon
//
// This daemon is a THIN integration layer only. All reconciliation logic
// lives in mangasync-core; no retry or matching logic belongs here.
//
// The mangasyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the catalog, content source, page fetcher, and site rules
// 4. Triggering reconciliation runs on a fixed interval (or once)
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Content API
// - `MANGADEX_USERNAME`: Account username (required)
// - `MANGADEX_PASSWORD`: Account password (required)
// - `MANGADEX_RATE_LIMIT_BACKOFF_SECS`: Sleep before retrying a 429 (default 1200)
//
// ### Catalog
// - `NOTION_SECRET`: Integration secret (required)
// - `NOTION_DATABASE_ID`: Tracking-list database (required)
// - `NOTION_RATE_LIMIT_BACKOFF_SECS`: Sleep before retrying a 429 (default 60)
//
// ### Engine
// - `MANGASYNC_TIMEZONE`: IANA time zone for schedules (default UTC)
// - `MANGASYNC_INTERVAL_SECS`: Seconds between runs (default 3600)
// - `MANGASYNC_RUN_DEADLINE_SECS`: Deadline of one run (default 1800)
// - `MANGASYNC_CONCURRENCY`: Concurrent fetches and writes (default 4)
// - `MANGASYNC_MODE`: `live` or `dry-run` (default live)
// - `MANGASYNC_RUN_ONCE`: Run a single time and exit (default false)
// - `MANGASYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export MANGADEX_USERNAME=reader
// export MANGADEX_PASSWORD=...
// export NOTION_SECRET=secret_...
// export NOTION_DATABASE_ID=0f3c...
// export MANGASYNC_TIMEZONE=Europe/Amsterdam
//
// mangasyncd
// ```

use anyhow::{Context, Result};
use mangasync_catalog_notion::NotionCatalog;
use mangasync_core::{
    CatalogConfig, ContentApiConfig, EngineConfig, ExtractorRegistry, Reconciler, SyncConfig,
    SystemClock,
};
use mangasync_scrape::HttpPageFetcher;
use mangasync_source_mangadex::MangaDexClient;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    mangadex_username: String,
    mangadex_password: String,
    mangadex_backoff_secs: u64,
    notion_secret: String,
    notion_database_id: String,
    notion_backoff_secs: u64,
    timezone: String,
    interval_secs: u64,
    run_deadline_secs: u64,
    concurrency: usize,
    mode: String,
    run_once: bool,
    log_level: String,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("mangadex_username", &self.mangadex_username)
            .field("mangadex_password", &"<REDACTED>")
            .field("notion_secret", &"<REDACTED>")
            .field("notion_database_id", &self.notion_database_id)
            .field("timezone", &self.timezone)
            .field("interval_secs", &self.interval_secs)
            .field("run_deadline_secs", &self.run_deadline_secs)
            .field("concurrency", &self.concurrency)
            .field("mode", &self.mode)
            .field("run_once", &self.run_once)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            mangadex_username: required("MANGADEX_USERNAME")?,
            mangadex_password: required("MANGADEX_PASSWORD")?,
            mangadex_backoff_secs: number("MANGADEX_RATE_LIMIT_BACKOFF_SECS", 1200)?,
            notion_secret: required("NOTION_SECRET")?,
            notion_database_id: required("NOTION_DATABASE_ID")?,
            notion_backoff_secs: number("NOTION_RATE_LIMIT_BACKOFF_SECS", 60)?,
            timezone: env::var("MANGASYNC_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            interval_secs: number("MANGASYNC_INTERVAL_SECS", 3600)?,
            run_deadline_secs: number("MANGASYNC_RUN_DEADLINE_SECS", 1800)?,
            concurrency: number("MANGASYNC_CONCURRENCY", 4)?,
            mode: env::var("MANGASYNC_MODE").unwrap_or_else(|_| "live".to_string()),
            run_once: flag("MANGASYNC_RUN_ONCE")?,
            log_level: env::var("MANGASYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks numeric ranges, enumerations, and the time zone. Credential
    /// presence is checked again by the core config types.
    fn validate(&self) -> Result<()> {
        if !(60..=86_400).contains(&self.interval_secs) {
            anyhow::bail!(
                "MANGASYNC_INTERVAL_SECS must be between 60 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        if self.run_deadline_secs == 0 || self.run_deadline_secs > self.interval_secs {
            anyhow::bail!(
                "MANGASYNC_RUN_DEADLINE_SECS must be between 1 and MANGASYNC_INTERVAL_SECS ({}). Got: {}",
                self.interval_secs,
                self.run_deadline_secs
            );
        }

        if !(1..=32).contains(&self.concurrency) {
            anyhow::bail!(
                "MANGASYNC_CONCURRENCY must be between 1 and 32. Got: {}",
                self.concurrency
            );
        }

        match self.mode.as_str() {
            "live" | "dry-run" => {}
            _ => anyhow::bail!(
                "MANGASYNC_MODE '{}' is not supported. Supported modes: live, dry-run",
                self.mode
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "MANGASYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.sync_config().validate()?;

        Ok(())
    }

    fn sync_config(&self) -> SyncConfig {
        let mut catalog = CatalogConfig::new(&self.notion_secret, &self.notion_database_id);
        catalog.rate_limit_backoff_secs = self.notion_backoff_secs;

        let mut content_api = ContentApiConfig::new(&self.mangadex_username, &self.mangadex_password);
        content_api.rate_limit_backoff_secs = self.mangadex_backoff_secs;

        SyncConfig {
            catalog,
            content_api,
            engine: EngineConfig {
                concurrency: self.concurrency,
                run_interval_secs: self.interval_secs,
                run_deadline_secs: self.run_deadline_secs,
                timezone: self.timezone.clone(),
                dry_run: self.mode == "dry-run",
            },
        }
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("{} is required. Set it via: export {}=...", name, name),
    }
}

fn number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => anyhow::bail!("{} must be true or false. Got: {}", name, raw),
        },
        Err(_) => Ok(false),
    }
}

/// Wire the adapters into a reconciler
fn build_reconciler(config: &SyncConfig) -> Result<Reconciler> {
    let tz = config.engine.tz()?;

    let catalog = NotionCatalog::new(&config.catalog).context("Failed to create catalog client")?;
    let source = MangaDexClient::new(&config.content_api)
        .context("Failed to create content API client")?;
    let fetcher = HttpPageFetcher::new().context("Failed to create page fetcher")?;

    let mut registry = ExtractorRegistry::new();
    mangasync_scrape::register(&mut registry)?;
    info!("Registered {} source rule(s)", registry.len());

    let reconciler = Reconciler::new(
        Arc::new(catalog),
        Arc::new(source),
        Arc::new(fetcher),
        Arc::new(registry),
        Arc::new(SystemClock::new(tz)),
        config.engine.clone(),
    )?;

    Ok(reconciler)
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting mangasyncd daemon");
    tracing::debug!("Configuration: {:?}", config);

    let sync_config = config.sync_config();
    let reconciler = match build_reconciler(&sync_config) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    info!(
        "Configuration loaded: interval {}s, deadline {}s, concurrency {}, time zone {}, mode {}",
        sync_config.engine.run_interval_secs,
        sync_config.engine.run_deadline_secs,
        sync_config.engine.concurrency,
        sync_config.engine.timezone,
        config.mode
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let outcome = if config.run_once {
            run_once(&reconciler).await
        } else {
            run_daemon(&reconciler, &sync_config.engine).await
        };

        match outcome {
            Ok(()) => SyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                SyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run a single reconciliation and return
async fn run_once(reconciler: &Reconciler) -> Result<()> {
    let report = reconciler.run().await.context("Reconciliation run failed")?;
    info!(?report, "Run complete");
    Ok(())
}

/// Run reconciliations on a fixed interval until a shutdown signal arrives
///
/// A tick that fires while a run is still going is skipped, not queued.
async fn run_daemon(reconciler: &Reconciler, engine: &EngineConfig) -> Result<()> {
    let mut ticker = tokio::time::interval(engine.run_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Ready; first run starts now");

    loop {
        tokio::select! {
            signal = &mut shutdown => return stopped(signal),
            _ = ticker.tick() => {}
        }

        tokio::select! {
            signal = &mut shutdown => return stopped(signal),
            outcome = reconciler.run() => match outcome {
                Ok(report) => info!(?report, "Run complete"),
                Err(mangasync_core::Error::RunInProgress) => {
                    warn!("Previous run still in progress; trigger ignored")
                }
                Err(e) => error!("Run failed: {}", e),
            },
        }
    }
}

// An in-flight run is dropped on shutdown; each catalog write is a single
// request, so no item is left half-written
fn stopped(signal: Result<&'static str>) -> Result<()> {
    let signal = signal?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
