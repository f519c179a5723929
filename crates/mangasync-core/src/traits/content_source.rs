// # Content Source Trait
//
// Defines the interface to the third-party content API that supplies the
// content-API partition's ground truth.
//
// ## Implementations
//
// - MangaDex: `mangasync-source-mangadex` crate
//
// ## Call pattern
//
// Per run the engine lists subscriptions once, drops the terminal ones and
// those whose link belongs to a terminal catalog item, and then makes one
// detail call and one latest-release call per remaining subscription. Implementations own their session: login on first use,
// refresh on an expired token, and a single backoff on rate limiting.

use crate::model::Status;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

/// A work the user follows on the content API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Identifier on the content API
    pub external_id: String,
    /// The user's reading status, already mapped to a status tag
    pub status: Status,
}

/// Descriptive fields of a subscribed work
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDetail {
    /// Identifier on the content API
    pub external_id: String,
    /// Preferred display title
    pub title: String,
    /// Canonical link; matches the link stored in the catalog
    pub source_link: String,
    /// Cover image, if the work has one
    pub art_url: Option<String>,
    /// The API's own "last chapter" field, often empty
    pub last_chapter: Option<String>,
}

/// Most recent published release of a work
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Release {
    /// Chapter number
    pub number: f64,
    /// When the chapter was published, if reported
    pub published_at: Option<DateTime<FixedOffset>>,
}

/// Trait for content API implementations
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List every work the user follows
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, crate::Error>;

    /// Fetch the descriptive fields of one work
    async fn fetch_detail(&self, external_id: &str) -> Result<SourceDetail, crate::Error>;

    /// Fetch the most recent release of one work
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Release))`: The newest chapter with a parseable number
    /// - `Ok(None)`: The work has no numbered chapters yet
    /// - `Err(Error)`: If the request failed
    async fn latest_release(&self, external_id: &str) -> Result<Option<Release>, crate::Error>;

    /// Canonical link of a work, derived from its id without a request
    ///
    /// Must equal the `source_link` returned by [`fetch_detail`](Self::fetch_detail).
    fn source_link(&self, external_id: &str) -> String;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
