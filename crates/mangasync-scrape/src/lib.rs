// # Scraped Sources
//
// This crate provides the page fetcher and the per-site extraction rules for
// catalog items whose link is not served by the content API.
//
// ## Purpose
//
// Each supported site family gets one table entry: host patterns, the
// selector of its chapter list, and the selector of the newest entry. Sites
// whose pages carry no usable number (episode trackers) are registered as
// daily-increment sources instead.
//
// ## Behaviour
//
// - Entries resolve in table order; the first host match wins
// - Extraction takes the first number in the selected text, preferring one
//   that follows a chapter/episode keyword
// - Missing markup or unparseable text yields no value, so the reconciler
//   keeps the last known release
// - Pages are fetched once per run with no retry

mod fetcher;
mod rules;

pub use fetcher::HttpPageFetcher;
pub use rules::{DAILY_INCREMENT_HOSTS, SITE_RULES, SelectorExtractor, SiteRule};

use mangasync_core::registry::ExtractorRegistry;
use mangasync_core::Result;
use std::sync::Arc;

/// Register the built-in site rules
///
/// This function should be called during daemon initialization.
///
/// # Errors
///
/// Returns [`mangasync_core::Error::Config`] if a built-in selector does not
/// parse.
pub fn register(registry: &mut ExtractorRegistry) -> Result<()> {
    for rule in SITE_RULES {
        registry.register_extractor(rule.hosts, Arc::new(SelectorExtractor::from_rule(rule)?));
    }
    registry.register_daily_increment(DAILY_INCREMENT_HOSTS);

    tracing::debug!(
        "Registered {} extraction rules and {} daily-increment hosts",
        SITE_RULES.len(),
        DAILY_INCREMENT_HOSTS.len()
    );

    Ok(())
}
