//! Core traits for the mangasync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Catalog`]: Paginated read/write access to the tracking list
//! - [`ContentSource`]: Subscriptions and release data from the content API
//! - [`PageFetcher`]: Raw page retrieval for scraped sources
//! - [`Extractor`]: Latest-release extraction from one site family's markup
//! - [`Clock`]: The current time in the configured local time zone

pub mod catalog;
pub mod clock;
pub mod content_source;
pub mod extractor;
pub mod page_fetcher;

pub use catalog::{Catalog, CatalogPage, ItemStream, list_items};
pub use clock::{Clock, SystemClock};
pub use content_source::{ContentSource, Release, SourceDetail, Subscription};
pub use extractor::Extractor;
pub use page_fetcher::PageFetcher;
