//! HTTP page retrieval for scraped sources

use async_trait::async_trait;
use mangasync_core::traits::PageFetcher;
use mangasync_core::{Error, Result};
use std::time::Duration;

/// Default HTTP timeout for page requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every page request
const USER_AGENT: &str = concat!("mangasync/", env!("CARGO_PKG_VERSION"));

/// Fetches pages with a plain HTTP GET
///
/// No retry: a failed fetch skips the item for this run only.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Create a fetcher with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a fetcher with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!("Fetching page {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(
                status.as_u16(),
                &format!("GET {}", url),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| Error::network(format!("GET {}: failed to read body: {}", url, e)))
    }
}
