//! Bounded, failure-isolated write dispatch
//!
//! The [`UpdateDispatcher`] issues catalog writes concurrently on a
//! [`JoinSet`], with a semaphore bounding how many are in flight. A failing
//! write is logged and recorded; it never cancels or rolls back its
//! siblings. [`UpdateDispatcher::finish`] is the barrier at the end of a run
//! that makes completion observable.
//!
//! Dropping the dispatcher (for instance when the run deadline expires)
//! aborts every write that has not completed. Each write is a single atomic
//! partial write at the catalog, so an aborted write leaves the item either
//! fully updated or untouched.

use crate::model::{Item, ItemDelta};
use crate::traits::Catalog;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// A single write against the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogWrite {
    /// Sparse update of an existing item
    Update {
        id: String,
        /// Title, for logs only
        title: String,
        delta: ItemDelta,
    },

    /// Creation of a newly discovered item
    Create(Item),
}

impl CatalogWrite {
    /// Short human-readable description for logs
    pub fn describe(&self) -> String {
        match self {
            CatalogWrite::Update { id, title, delta } => format!(
                "update '{}' ({}) -> latest release {}",
                title,
                id,
                delta.latest_release()
            ),
            CatalogWrite::Create(item) => format!(
                "create '{}' ({}) at latest release {}",
                item.title, item.source_link, item.latest_release
            ),
        }
    }

    async fn apply(&self, catalog: &dyn Catalog) -> crate::Result<()> {
        match self {
            CatalogWrite::Update { id, delta, .. } => catalog.update_item(id, delta).await,
            CatalogWrite::Create(item) => catalog.create_item(item).await,
        }
    }
}

/// A write that did not go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub write: String,
    pub error: String,
}

/// Outcome of every write dispatched in one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub updated: usize,
    pub created: usize,
    pub failed: Vec<WriteFailure>,
}

enum WriteKind {
    Update,
    Create,
}

struct WriteOutcome {
    kind: WriteKind,
    description: String,
    result: crate::Result<()>,
}

/// Concurrent catalog writer with per-write failure isolation
pub struct UpdateDispatcher {
    catalog: Arc<dyn Catalog>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<WriteOutcome>,
    dry_run: bool,
}

impl UpdateDispatcher {
    /// Create a dispatcher allowing `concurrency` writes in flight
    pub fn new(catalog: Arc<dyn Catalog>, concurrency: usize, dry_run: bool) -> Self {
        Self {
            catalog,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            dry_run,
        }
    }

    /// Queue a write; returns immediately
    ///
    /// No ordering is guaranteed between writes.
    pub fn dispatch(&mut self, write: CatalogWrite) {
        let kind = match write {
            CatalogWrite::Update { .. } => WriteKind::Update,
            CatalogWrite::Create(_) => WriteKind::Create,
        };
        let description = write.describe();

        if self.dry_run {
            info!("[DRY-RUN] Would {}", description);
            self.tasks.spawn(async move {
                WriteOutcome {
                    kind,
                    description,
                    result: Ok(()),
                }
            });
            return;
        }

        let catalog = Arc::clone(&self.catalog);
        let permits = Arc::clone(&self.permits);

        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only fails if it
            // is dropped, in which case the write proceeds unbounded
            let _permit = permits.acquire_owned().await.ok();
            debug!("Dispatching {}", description);
            let result = write.apply(catalog.as_ref()).await;
            WriteOutcome {
                kind,
                description,
                result,
            }
        });
    }

    /// Number of writes not yet joined
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every dispatched write and collect the outcomes
    pub async fn finish(mut self) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(WriteOutcome {
                    kind,
                    description,
                    result: Ok(()),
                }) => {
                    info!("Completed {}", description);
                    match kind {
                        WriteKind::Update => report.updated += 1,
                        WriteKind::Create => report.created += 1,
                    }
                }
                Ok(WriteOutcome {
                    description,
                    result: Err(e),
                    ..
                }) => {
                    error!("Failed to {}: {}", description, e);
                    report.failed.push(WriteFailure {
                        write: description,
                        error: e.to_string(),
                    });
                }
                Err(join_error) => {
                    error!("Write task did not complete: {}", join_error);
                    report.failed.push(WriteFailure {
                        write: "unknown".to_string(),
                        error: join_error.to_string(),
                    });
                }
            }
        }

        report
    }
}
