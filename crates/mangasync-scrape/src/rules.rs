//! Selector-based release extraction
//!
//! Every supported site lists its chapters newest first (or, for toomics,
//! newest last) inside one container element. A [`SiteRule`] names that
//! container and the entry whose text carries the newest number.

use mangasync_core::model::parse_release;
use mangasync_core::traits::Extractor;
use mangasync_core::{Error, Result};
use regex::Regex;
use scraper::{Html, Selector};

/// Static description of one site family
#[derive(Debug, Clone, Copy)]
pub struct SiteRule {
    /// Rule name, for logs
    pub name: &'static str,
    /// Host patterns matched by substring
    pub hosts: &'static [&'static str],
    /// Selector of the chapter list container
    pub container: &'static str,
    /// Selector, relative to the container, of the newest entry
    pub entry: &'static str,
}

/// Built-in rules, in resolution order
pub const SITE_RULES: &[SiteRule] = &[
    SiteRule {
        name: "mangakakalot",
        hosts: &["mangakakalot.com"],
        container: ".chapter-list",
        entry: "div:first-child span:first-child a",
    },
    SiteRule {
        name: "manganato",
        hosts: &["readmanganato.com", "manganato.com"],
        container: ".row-content-chapter",
        entry: "li:first-child a",
    },
    SiteRule {
        name: "mangabuddy",
        hosts: &["mangabuddy.com"],
        container: "#chapter-list",
        entry: "li:first-child a:first-child div:first-child strong",
    },
    SiteRule {
        name: "mangaweeaboo",
        hosts: &["mangaweeaboo.com"],
        container: ".version-chap",
        entry: "li:first-child a",
    },
    SiteRule {
        name: "toomics",
        hosts: &["toomics.com"],
        container: ".list-ep",
        entry: ".normal_ep:last-child a .cell-num span",
    },
];

/// Hosts whose release advances by one per local day
pub const DAILY_INCREMENT_HOSTS: &[&str] = &["pahe.win", "animepahe.com"];

// Entry labels often carry a volume before the chapter ("Vol.3 Chapter 25"),
// so a number after a chapter keyword wins over the first number
const KEYWORD_NUMBER: &str = r"(?i)\b(?:chapter|chap|ch|episode|ep)\.?\s*(\d+(?:\.\d+)?)";
const ANY_NUMBER: &str = r"\d+(?:\.\d+)?";

/// Extractor reading the newest release number from one HTML element
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    name: String,
    container: Selector,
    entry: Selector,
    keyword_number: Regex,
    any_number: Regex,
}

impl SelectorExtractor {
    /// Build an extractor from raw selectors
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a selector does not parse.
    pub fn new(name: impl Into<String>, container: &str, entry: &str) -> Result<Self> {
        let name = name.into();
        let parse = |selector: &str| {
            Selector::parse(selector).map_err(|e| {
                Error::config(format!("{}: invalid selector '{}': {:?}", name, selector, e))
            })
        };
        let container = parse(container)?;
        let entry = parse(entry)?;

        Ok(Self {
            container,
            entry,
            keyword_number: Regex::new(KEYWORD_NUMBER)
                .map_err(|e| Error::config(format!("invalid number pattern: {}", e)))?,
            any_number: Regex::new(ANY_NUMBER)
                .map_err(|e| Error::config(format!("invalid number pattern: {}", e)))?,
            name,
        })
    }

    /// Build the extractor for a built-in rule
    pub fn from_rule(rule: &SiteRule) -> Result<Self> {
        Self::new(rule.name, rule.container, rule.entry)
    }

    fn number_in(&self, text: &str) -> Option<f64> {
        let raw = self
            .keyword_number
            .captures(text)
            .and_then(|captures| captures.get(1))
            .or_else(|| self.any_number.find(text))?;

        parse_release(raw.as_str())
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, content: &str) -> Option<f64> {
        let document = Html::parse_document(content);
        let container = document.select(&self.container).next()?;
        let entry = container.select(&self.entry).next()?;
        let text: String = entry.text().collect();

        self.number_in(text.trim())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
