// # Extractor Trait
//
// One extraction rule for one family of sites. Given the raw page content it
// yields the latest published chapter/episode number.
//
// ## Contract
//
// Extraction never fails loudly. Missing markup, an empty match, or text
// that does not parse as a number all yield `None`, which callers treat as
// "no new information" and keep the previously known value. `None` is never
// read as zero.

/// Trait for site-specific extraction rules
pub trait Extractor: Send + Sync {
    /// Latest release number found in `content`, if any
    fn extract(&self, content: &str) -> Option<f64>;

    /// Rule name (for logging/debugging)
    fn name(&self) -> &str;
}
