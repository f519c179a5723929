//! Configuration types for the mangasync system
//!
//! This module defines all configuration structures used throughout the crate.
//! Values are normally read from the environment by the daemon; the structs
//! themselves are plain serde types so they can also be built in code.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main mangasync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tracking-list catalog configuration
    pub catalog: CatalogConfig,

    /// Content API configuration
    pub content_api: ContentApiConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.catalog.validate()?;
        self.content_api.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Catalog (Notion database) configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Integration secret
    /// ⚠️ NEVER log this value
    pub api_token: String,

    /// Database holding the tracking list
    pub database_id: String,

    /// Sleep after a rate-limit response before the single retry (seconds)
    #[serde(default = "default_catalog_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("api_token", &"<REDACTED>")
            .field("database_id", &self.database_id)
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .finish()
    }
}

impl CatalogConfig {
    pub fn new(api_token: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            database_id: database_id.into(),
            rate_limit_backoff_secs: default_catalog_backoff_secs(),
        }
    }

    /// Validate the catalog configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.api_token.is_empty() {
            return Err(crate::Error::config("Catalog API token cannot be empty"));
        }
        if self.database_id.is_empty() {
            return Err(crate::Error::config("Catalog database id cannot be empty"));
        }
        Ok(())
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

/// Content API (MangaDex) configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ContentApiConfig {
    /// Account username
    pub username: String,

    /// Account password
    /// ⚠️ NEVER log this value
    pub password: String,

    /// Sleep after a rate-limit response before the single retry (seconds)
    #[serde(default = "default_content_api_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for ContentApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentApiConfig")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .finish()
    }
}

impl ContentApiConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            rate_limit_backoff_secs: default_content_api_backoff_secs(),
        }
    }

    /// Validate the content API configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(crate::Error::config(
                "Content API username and password are required",
            ));
        }
        Ok(())
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrent per-item fetches and on concurrent writes
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Interval between scheduled runs (in seconds)
    #[serde(default = "default_run_interval_secs")]
    pub run_interval_secs: u64,

    /// Overall deadline of a single run (in seconds)
    ///
    /// Work still in flight when the deadline expires is abandoned. Must not
    /// exceed `run_interval_secs`.
    #[serde(default = "default_run_deadline_secs")]
    pub run_deadline_secs: u64,

    /// IANA time zone used for schedules and "today"
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Log intended writes instead of issuing them
    #[serde(default)]
    pub dry_run: bool,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.concurrency == 0 {
            return Err(crate::Error::config("Engine concurrency must be > 0"));
        }
        if self.run_interval_secs == 0 {
            return Err(crate::Error::config("Run interval must be > 0"));
        }
        if self.run_deadline_secs == 0 || self.run_deadline_secs > self.run_interval_secs {
            return Err(crate::Error::config(format!(
                "Run deadline must be between 1 and the run interval ({}s), got {}s",
                self.run_interval_secs, self.run_deadline_secs
            )));
        }
        self.tz()?;

        Ok(())
    }

    /// Parsed time zone
    pub fn tz(&self) -> Result<Tz, crate::Error> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| crate::Error::config(format!("Unknown time zone '{}': {}", self.timezone, e)))
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            run_interval_secs: default_run_interval_secs(),
            run_deadline_secs: default_run_deadline_secs(),
            timezone: default_timezone(),
            dry_run: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_run_interval_secs() -> u64 {
    3600
}

fn default_run_deadline_secs() -> u64 {
    1800
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_catalog_backoff_secs() -> u64 {
    60
}

// The content API locks out an account for a long window after repeated 429s
fn default_content_api_backoff_secs() -> u64 {
    1200
}
