// # Page Fetcher Trait
//
// Retrieves the raw markup of a scraped source page. The body is handed to
// the extractor registry untouched; there is no fixed schema.

use async_trait::async_trait;

/// Trait for page retrieval implementations
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the body of `url`
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The response body
    /// - `Err(Error)`: Transport failure or non-success status
    async fn fetch(&self, url: &str) -> Result<String, crate::Error>;
}
