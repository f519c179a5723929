//! Table-driven source rule registry
//!
//! The registry maps a source URL to the rule that produces its latest
//! release, avoiding hardcoded if-else chains over site names. Adding a site
//! is a table entry, not new control flow.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mangasync_core::registry::ExtractorRegistry;
//!
//! let mut registry = ExtractorRegistry::new();
//!
//! // Site crates register their rules during initialization
//! mangasync_scrape::register(&mut registry)?;
//!
//! // Resolve and extract
//! let latest = registry.extract("https://mangabuddy.com/x", &page_body);
//! ```
//!
//! ## Resolution
//!
//! Entries are kept in registration order. A URL resolves to the first entry
//! with a host pattern contained in the URL's host; later entries are never
//! consulted. Hosts compare case-insensitively. A URL that does not parse
//! resolves to nothing.

use crate::traits::Extractor;
use std::sync::Arc;
use url::Url;

/// How the latest release of a source is determined
#[derive(Clone)]
pub enum SourceRule {
    /// Fetch the page and run an extractor over it
    Extract(Arc<dyn Extractor>),

    /// The page carries no extractable number; the release advances by
    /// exactly one per local day
    IncrementDaily,
}

impl std::fmt::Debug for SourceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRule::Extract(extractor) => {
                f.debug_tuple("Extract").field(&extractor.name()).finish()
            }
            SourceRule::IncrementDaily => f.write_str("IncrementDaily"),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    hosts: Vec<String>,
    rule: SourceRule,
}

/// Ordered table of host patterns to source rules
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    entries: Vec<Entry>,
}

impl ExtractorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor for every host containing one of `hosts`
    ///
    /// # Example
    ///
    /// ```rust
    /// # use mangasync_core::registry::ExtractorRegistry;
    /// # use mangasync_core::traits::Extractor;
    /// # use std::sync::Arc;
    /// struct FirstLine;
    ///
    /// impl Extractor for FirstLine {
    ///     fn extract(&self, content: &str) -> Option<f64> {
    ///         content.lines().next()?.trim().parse().ok()
    ///     }
    ///     fn name(&self) -> &str {
    ///         "first-line"
    ///     }
    /// }
    ///
    /// let mut registry = ExtractorRegistry::new();
    /// registry.register_extractor(&["example.com"], Arc::new(FirstLine));
    /// assert_eq!(registry.extract("https://example.com/x", "12\n"), Some(12.0));
    /// ```
    pub fn register_extractor(&mut self, hosts: &[&str], extractor: Arc<dyn Extractor>) {
        self.push(hosts, SourceRule::Extract(extractor));
    }

    /// Register hosts whose release advances by one per local day
    pub fn register_daily_increment(&mut self, hosts: &[&str]) {
        self.push(hosts, SourceRule::IncrementDaily);
    }

    fn push(&mut self, hosts: &[&str], rule: SourceRule) {
        self.entries.push(Entry {
            hosts: hosts.iter().map(|host| host.to_ascii_lowercase()).collect(),
            rule,
        });
    }

    /// Find the rule for `url`
    ///
    /// # Returns
    ///
    /// - `Some(&SourceRule)`: The first registered rule whose host pattern
    ///   matches
    /// - `None`: No rule covers this site
    pub fn resolve(&self, url: &str) -> Option<&SourceRule> {
        let url = Url::parse(url).ok()?;
        let host = url.host_str()?;
        self.entries
            .iter()
            .find(|entry| entry.hosts.iter().any(|pattern| host.contains(pattern.as_str())))
            .map(|entry| &entry.rule)
    }

    /// Extract the latest release from `content` fetched from `url`
    ///
    /// Returns `None` when no extractor covers the URL, when the URL belongs
    /// to a daily-increment source, or when the extractor found nothing.
    pub fn extract(&self, url: &str, content: &str) -> Option<f64> {
        match self.resolve(url)? {
            SourceRule::Extract(extractor) => extractor.extract(content),
            SourceRule::IncrementDaily => None,
        }
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry has been registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
