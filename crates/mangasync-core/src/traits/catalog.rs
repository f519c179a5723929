// # Catalog Trait
//
// Defines the interface to the remote tracking list.
//
// ## Implementations
//
// - Notion database: `mangasync-catalog-notion` crate
//
// ## Usage
//
// ```rust,ignore
// use mangasync_core::traits::{list_items, Catalog};
// use mangasync_core::model::Partition;
// use futures::TryStreamExt;
//
// async fn scrape_titles(catalog: &dyn Catalog) -> mangasync_core::Result<Vec<String>> {
//     list_items(catalog, Partition::Scrape)
//         .map_ok(|item| item.title)
//         .try_collect()
//         .await
// }
// ```

use crate::error::Result;
use crate::model::{Item, ItemDelta, Partition};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};

/// One page of a catalog query
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    /// Items on this page
    pub items: Vec<Item>,
    /// Whether another page follows
    pub has_more: bool,
    /// Cursor of the next page
    pub next_cursor: Option<String>,
}

/// Lazily paginated sequence of catalog items
pub type ItemStream<'a> = BoxStream<'a, Result<Item>>;

/// Trait for catalog implementations
///
/// Implementations own their transport concerns: authentication and the
/// single rate-limit backoff described by
/// [`RecoveryPolicy`](crate::recovery::RecoveryPolicy). They do not decide
/// what to write; that is owned by the [`Reconciler`](crate::Reconciler).
///
/// # Thread Safety
///
/// Writes are issued concurrently by the
/// [`UpdateDispatcher`](crate::dispatch::UpdateDispatcher), so all methods
/// must be safe to call from several tasks at once.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch one page of the given partition
    ///
    /// # Parameters
    ///
    /// - `partition`: Which half of the tracking list to query
    /// - `cursor`: `None` for the first page, otherwise the previous page's
    ///   `next_cursor`
    async fn query_page(&self, partition: Partition, cursor: Option<&str>) -> Result<CatalogPage>;

    /// Create a new tracked item
    ///
    /// The item carries the freshest values known at creation time; no
    /// follow-up update is issued for it in the same run.
    async fn create_item(&self, item: &Item) -> Result<()>;

    /// Apply a sparse delta to the item with catalog id `id`
    ///
    /// Each call is a single atomic partial write at the remote store.
    async fn update_item(&self, id: &str, delta: &ItemDelta) -> Result<()>;

    /// Get the catalog name (for logging/debugging)
    fn catalog_name(&self) -> &'static str;
}

/// Stream every item of `partition`, following cursors transparently
///
/// The stream is lazy and restartable: each call starts again from the first
/// page. A failed page is yielded as an error and ends the stream.
pub fn list_items(catalog: &dyn Catalog, partition: Partition) -> ItemStream<'_> {
    // `Some(cursor)` is the next page to request, `None` means done
    let first: Option<Option<String>> = Some(None);

    stream::try_unfold(first, move |state| async move {
        let Some(cursor) = state else {
            return Ok(None);
        };

        let page = catalog.query_page(partition, cursor.as_deref()).await?;
        let next = match page.next_cursor {
            Some(next_cursor) if page.has_more => Some(Some(next_cursor)),
            _ => None,
        };

        Ok(Some((page.items, next)))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
