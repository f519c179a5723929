// # Notion Catalog
//
// This crate provides the Notion database implementation of the mangasync
// `Catalog` trait.
//
// ## Behaviour
//
// - One query call per page; the engine drives pagination through
//   `list_items`
// - Partitions are selected server-side with a filter on the `Link` url
//   property
// - Creates carry every property plus an external image block for the cover
// - Updates are sparse PATCH calls touching only the release properties and,
//   when given, the status tags
// - A 429 gets one fixed backoff and one retry via `RecoveryPolicy`
// - A 401 is surfaced: an integration secret cannot be refreshed
//
// ## Security Requirements
//
// - The integration secret NEVER appears in logs or `Debug` output
// - The secret MUST be provided via environment variables only
// - Construction fails fast if the secret is empty
//
// ## API Reference
//
// - Query a database: POST `/v1/databases/:database_id/query`
// - Create a page: POST `/v1/pages`
// - Update page properties: PATCH `/v1/pages/:page_id`

mod wire;

pub use wire::parse_date;

use async_trait::async_trait;
use mangasync_core::config::CatalogConfig;
use mangasync_core::model::{Item, ItemDelta, Partition};
use mangasync_core::recovery::RecoveryPolicy;
use mangasync_core::traits::{Catalog, CatalogPage};
use mangasync_core::{Error, Result};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use wire::QueryResponse;

/// Notion API base URL
pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";

/// API version sent with every request
pub const NOTION_VERSION: &str = "2022-06-28";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Notion database catalog
///
/// # Concurrency
///
/// The catalog holds no mutable state; the dispatcher calls `update_item`
/// and `create_item` from several tasks at once.
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the secret.
pub struct NotionCatalog {
    /// Integration secret
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Database holding the tracking list
    database_id: String,

    /// API base URL, overridable for tests
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Single-retry rate-limit recovery
    recovery: RecoveryPolicy,
}

// Custom Debug implementation that hides the secret
impl std::fmt::Debug for NotionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionCatalog")
            .field("api_token", &"<REDACTED>")
            .field("database_id", &self.database_id)
            .field("base_url", &self.base_url)
            .field("recovery", &self.recovery)
            .finish()
    }
}

impl NotionCatalog {
    /// Create a new Notion catalog
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is incomplete or the
    /// HTTP client cannot be built.
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token: config.api_token.clone(),
            database_id: config.database_id.clone(),
            base_url: NOTION_API_BASE.to_string(),
            client,
            recovery: RecoveryPolicy::new(config.rate_limit_backoff()),
        })
    }

    /// Point the catalog at a different API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Issue one request and decode the JSON response
    ///
    /// Non-success statuses are mapped with [`Error::from_status`] so that
    /// 401 and 429 reach the recovery policy as their dedicated variants.
    async fn request(&self, method: Method, url: &str, body: &Value, context: &str) -> Result<Value> {
        let response = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_token)
            .header("Notion-Version", NOTION_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(format!("{}: HTTP request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::from_status(status.as_u16(), context, error_text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::decode(format!("{}: failed to parse response: {}", context, e)))
    }
}

#[async_trait]
impl Catalog for NotionCatalog {
    /// Query one page of a partition
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /v1/databases/:database_id/query
    /// {
    ///   "filter": { "property": "Link", "url": { "contains": "mangadex" } },
    ///   "page_size": 100,
    ///   "start_cursor": "..."
    /// }
    /// ```
    async fn query_page(&self, partition: Partition, cursor: Option<&str>) -> Result<CatalogPage> {
        let url = format!("{}/databases/{}/query", self.base_url, self.database_id);
        let body = wire::query_body(partition, cursor);

        tracing::debug!("Querying {:?} partition (cursor: {:?})", partition, cursor);

        let json = self
            .recovery
            .call("Notion database query", || {
                self.request(Method::POST, &url, &body, "database query")
            })
            .await?;

        let response: QueryResponse = serde_json::from_value(json)
            .map_err(|e| Error::decode(format!("database query: unexpected page shape: {}", e)))?;

        let items: Vec<Item> = response
            .results
            .into_iter()
            .map(wire::PageObject::into_item)
            .collect();

        tracing::debug!(
            "Read {} page(s) from Notion (has_more: {})",
            items.len(),
            response.has_more
        );

        Ok(CatalogPage {
            items,
            has_more: response.has_more,
            next_cursor: response.next_cursor,
        })
    }

    /// Create a page for a new item
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /v1/pages
    /// {
    ///   "parent": { "database_id": "..." },
    ///   "properties": { ... },
    ///   "children": [{ "type": "image", ... }]
    /// }
    /// ```
    async fn create_item(&self, item: &Item) -> Result<()> {
        let url = format!("{}/pages", self.base_url);
        let body = wire::create_body(&self.database_id, item);

        tracing::info!("Creating Notion page for '{}' ({})", item.title, item.source_link);

        self.recovery
            .call("Notion page create", || {
                self.request(Method::POST, &url, &body, "page create")
            })
            .await?;

        Ok(())
    }

    /// Apply a sparse delta to a page
    ///
    /// # API Call
    ///
    /// ```http
    /// PATCH /v1/pages/:page_id
    /// {
    ///   "properties": {
    ///     "Latest Release": { "number": 11 },
    ///     "Latest Release Updated At": { "date": { "start": "..." } },
    ///     "Seen Latest Release": { "checkbox": false }
    ///   }
    /// }
    /// ```
    async fn update_item(&self, id: &str, delta: &ItemDelta) -> Result<()> {
        let url = format!("{}/pages/{}", self.base_url, id);
        let body = wire::update_body(delta);

        tracing::info!(
            "Updating Notion page {} -> latest release {}",
            id,
            delta.latest_release()
        );

        self.recovery
            .call("Notion page update", || {
                self.request(Method::PATCH, &url, &body, "page update")
            })
            .await?;

        Ok(())
    }

    fn catalog_name(&self) -> &'static str {
        "notion"
    }
}
