//! Core reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Reading a snapshot of both catalog partitions
//! - Gating items on schedule and terminal status before any fetch
//! - Fetching ground truth from the content API or the source page
//! - Turning strict increases into catalog writes
//!
//! ## Architecture
//!
//! ```text
//!                        ┌──────────────┐
//!        trigger ───────▶│  Reconciler  │
//!                        └──────────────┘
//!                                │
//!       ┌───────────────┬────────┴───────┬────────────────┐
//!       ▼               ▼                ▼                ▼
//! ┌───────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐
//! │  Catalog  │  │ContentSource│  │ PageFetcher │  │  Dispatcher  │
//! │  (list)   │  │ (api truth) │  │ + Registry  │  │   (write)    │
//! └───────────┘  └─────────────┘  └─────────────┘  └──────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Take the run lock; a concurrent trigger is rejected
//! 2. Content-API partition: list, drop terminal subscriptions, fetch,
//!    match, update or create
//! 3. Scrape partition: list, gate, scrape or bump, update
//! 4. Join every dispatched write and report
//!
//! No state survives a run except what was written to the catalog.

pub mod eligibility;

use crate::config::EngineConfig;
use crate::dispatch::{CatalogWrite, DispatchReport, UpdateDispatcher};
use crate::error::{Error, Result};
use crate::matcher::{MatchKeys, match_items};
use crate::model::{Item, ItemDelta, Partition, Status, parse_release};
use crate::registry::{ExtractorRegistry, SourceRule};
use crate::traits::{Catalog, Clock, ContentSource, PageFetcher, Subscription, list_items};
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use eligibility::{confirmed_today, is_eligible};
use futures::StreamExt;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Media type given to items created from the content API
const CONTENT_API_KIND: &str = "Manga";

/// Summary of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Items considered (catalog items plus subscriptions)
    pub examined: usize,
    /// Items excluded by the eligibility gate
    pub skipped: usize,
    /// Updates written
    pub updated: usize,
    /// Items created
    pub created: usize,
    /// Fetches, pages, and writes that failed
    pub failures: usize,
}

impl RunReport {
    fn absorb(&mut self, dispatch: DispatchReport) {
        self.updated += dispatch.updated;
        self.created += dispatch.created;
        self.failures += dispatch.failed.len();
    }
}

/// A subscribed work with its ground truth resolved
#[derive(Debug, Clone)]
struct ExternalItem {
    status: Status,
    title: String,
    source_link: String,
    art_url: Option<String>,
    latest_release: Option<f64>,
    released_at: Option<DateTime<FixedOffset>>,
}

impl MatchKeys for ExternalItem {
    fn source_link(&self) -> &str {
        &self.source_link
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Core reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::run()`] once per trigger
///
/// ## Concurrency
///
/// Runs are mutually exclusive: while a run is in flight, further calls to
/// `run()` return [`Error::RunInProgress`] without doing any work. Within a
/// run, listing is sequential; per-item fetches and writes run concurrently
/// up to `concurrency`.
pub struct Reconciler {
    /// Tracking list
    catalog: Arc<dyn Catalog>,

    /// Content API for the content-API partition
    source: Arc<dyn ContentSource>,

    /// Page retrieval for the scrape partition
    fetcher: Arc<dyn PageFetcher>,

    /// Site rules for the scrape partition
    rules: Arc<ExtractorRegistry>,

    /// Local time
    clock: Arc<dyn Clock>,

    /// Engine settings
    settings: EngineConfig,

    /// Held for the duration of a run
    run_lock: Mutex<()>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `settings` does not validate.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        source: Arc<dyn ContentSource>,
        fetcher: Arc<dyn PageFetcher>,
        rules: Arc<ExtractorRegistry>,
        clock: Arc<dyn Clock>,
        settings: EngineConfig,
    ) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            catalog,
            source,
            fetcher,
            rules,
            clock,
            settings,
            run_lock: Mutex::new(()),
        })
    }

    /// Run one full reconciliation, bounded by the configured deadline
    ///
    /// # Returns
    ///
    /// - `Ok(RunReport)`: The run completed; individual item failures are
    ///   counted in the report, not returned
    /// - `Err(Error::RunInProgress)`: Another run holds the lock
    /// - `Err(Error::DeadlineExceeded)`: The deadline expired; in-flight
    ///   writes were abandoned
    pub async fn run(&self) -> Result<RunReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("Previous run still in flight, skipping trigger");
            return Err(Error::RunInProgress);
        };

        let deadline = self.settings.run_deadline();
        let started = std::time::Instant::now();
        info!(
            "Starting sync (catalog: {}, source: {}, deadline: {:?})",
            self.catalog.catalog_name(),
            self.source.source_name(),
            deadline
        );

        match tokio::time::timeout(deadline, self.run_locked()).await {
            Ok(report) => {
                info!(
                    "Sync completed in {:?}: {} examined, {} skipped, {} updated, {} created, {} failures",
                    started.elapsed(),
                    report.examined,
                    report.skipped,
                    report.updated,
                    report.created,
                    report.failures
                );
                Ok(report)
            }
            Err(_) => {
                error!("Sync exceeded its deadline of {:?}, abandoning in-flight work", deadline);
                Err(Error::DeadlineExceeded(deadline))
            }
        }
    }

    async fn run_locked(&self) -> RunReport {
        let now = self.clock.now();
        let mut report = RunReport::default();
        let mut dispatcher = UpdateDispatcher::new(
            Arc::clone(&self.catalog),
            self.settings.concurrency,
            self.settings.dry_run,
        );

        self.reconcile_content_api(&now, &mut dispatcher, &mut report).await;
        self.reconcile_scrape(&now, &mut dispatcher, &mut report).await;

        debug!("Waiting for {} dispatched write(s)", dispatcher.pending());
        report.absorb(dispatcher.finish().await);
        report
    }

    /// Reconcile the content-API partition against the content source
    async fn reconcile_content_api(
        &self,
        now: &DateTime<Tz>,
        dispatcher: &mut UpdateDispatcher,
        report: &mut RunReport,
    ) {
        // A partial view of this partition would turn unseen items into
        // duplicate creations, so any listing failure abandons it
        let local: Vec<Item> = match self.collect_partition(Partition::ContentApi).await {
            (items, None) => items,
            (_, Some(e)) => {
                error!("Failed to list content-API items, skipping partition: {}", e);
                report.failures += 1;
                return;
            }
        };

        let subscriptions = match self.source.list_subscriptions().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!("Failed to list {} subscriptions: {}", self.source.source_name(), e);
                report.failures += 1;
                return;
            }
        };

        report.examined += subscriptions.len();
        let (active, terminal): (Vec<Subscription>, Vec<Subscription>) = subscriptions
            .into_iter()
            .partition(|subscription| !subscription.status.is_terminal());
        report.skipped += terminal.len();

        // A terminal catalog item gets no fetch even while the subscription
        // itself is still active
        let terminal_links: HashSet<&str> = local
            .iter()
            .filter(|item| item.is_terminal())
            .map(|item| item.source_link.as_str())
            .collect();
        let (active, gated): (Vec<Subscription>, Vec<Subscription>) =
            active.into_iter().partition(|subscription| {
                let link = self.source.source_link(&subscription.external_id);
                !terminal_links.contains(link.as_str())
            });
        report.skipped += gated.len();
        debug!(
            "{} active, {} terminal, and {} locally terminal subscription(s)",
            active.len(),
            terminal.len(),
            gated.len()
        );

        // `buffered` keeps source order, which the matcher relies on
        let fetched: Vec<Result<ExternalItem>> = futures::stream::iter(active)
            .map(|subscription| self.fetch_external(subscription))
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let mut external = Vec::with_capacity(fetched.len());
        for result in fetched {
            match result {
                Ok(item) => external.push(item),
                Err(e) => {
                    warn!("Skipping subscription for this run: {}", e);
                    report.failures += 1;
                }
            }
        }

        let matching = match_items(&local, &external);

        for pair in &matching.pairs {
            let (Some(current), Some(fresh)) = (local.get(pair.local), external.get(pair.external))
            else {
                continue;
            };

            info!("Syncing {}", current.source_link);
            if current.is_terminal() {
                debug!("'{}' is in a terminal status, not updating", current.title);
                report.skipped += 1;
                continue;
            }

            if let Some(write) = content_api_update(current, fresh, now) {
                dispatcher.dispatch(write);
            }
        }

        for index in &matching.shadowed {
            if let Some(fresh) = external.get(*index) {
                warn!(
                    "'{}' ({}) matches an item already paired this run, ignoring",
                    fresh.title, fresh.source_link
                );
            }
        }

        for index in &matching.unmatched {
            if let Some(fresh) = external.get(*index) {
                info!("Creating new catalog item for {}", fresh.source_link);
                dispatcher.dispatch(CatalogWrite::Create(new_item(fresh, now)));
            }
        }
    }

    /// Resolve one subscription's detail and latest release
    async fn fetch_external(&self, subscription: Subscription) -> Result<ExternalItem> {
        let id = subscription.external_id.as_str();
        let detail = self.source.fetch_detail(id).await?;

        let release = match self.source.latest_release(id).await {
            Ok(release) => release,
            Err(e) => {
                warn!(
                    "Failed to fetch latest release for {}, falling back to detail: {}",
                    id, e
                );
                None
            }
        };

        // The chapter feed is authoritative; the detail's own field is
        // frequently empty
        let (latest_release, released_at) = match release {
            Some(release) => (Some(release.number), release.published_at),
            None => (
                detail.last_chapter.as_deref().and_then(parse_release),
                None,
            ),
        };

        Ok(ExternalItem {
            status: subscription.status,
            title: detail.title,
            source_link: detail.source_link,
            art_url: detail.art_url,
            latest_release,
            released_at,
        })
    }

    /// Reconcile the scrape partition against source pages
    async fn reconcile_scrape(
        &self,
        now: &DateTime<Tz>,
        dispatcher: &mut UpdateDispatcher,
        report: &mut RunReport,
    ) {
        // Scraped items are independent, so a partial listing is still useful
        let (items, listing_error) = self.collect_partition(Partition::Scrape).await;
        if let Some(e) = listing_error {
            error!(
                "Failed to list scraped items, continuing with {} item(s) read so far: {}",
                items.len(),
                e
            );
            report.failures += 1;
        }

        report.examined += items.len();
        let (eligible, ineligible): (Vec<Item>, Vec<Item>) =
            items.into_iter().partition(|item| is_eligible(item, now));
        report.skipped += ineligible.len();

        let outcomes: Vec<(String, Result<Option<CatalogWrite>>)> = futures::stream::iter(eligible)
            .map(|item| async move {
                let link = item.source_link.clone();
                (link, self.scrape_item(item, now).await)
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        for (link, outcome) in outcomes {
            match outcome {
                Ok(Some(write)) => dispatcher.dispatch(write),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to refresh {}: {}", link, e);
                    report.failures += 1;
                }
            }
        }
    }

    /// Determine the write, if any, for one eligible scraped item
    async fn scrape_item(&self, item: Item, now: &DateTime<Tz>) -> Result<Option<CatalogWrite>> {
        let Some(rule) = self.rules.resolve(&item.source_link) else {
            debug!("No source rule for {}, leaving as is", item.source_link);
            return Ok(None);
        };

        let confirmed_at = now.fixed_offset();
        let new_release = match rule {
            SourceRule::IncrementDaily => {
                if confirmed_today(&item, now) {
                    debug!("{} already advanced today", item.source_link);
                    return Ok(None);
                }
                item.latest_release + 1.0
            }
            SourceRule::Extract(extractor) => {
                info!("Syncing {}", item.source_link);
                let page = self.fetcher.fetch(&item.source_link).await?;
                match extractor.extract(&page) {
                    Some(number) => number,
                    None => {
                        debug!(
                            "{} found no release on {}, keeping {}",
                            extractor.name(),
                            item.source_link,
                            item.latest_release
                        );
                        return Ok(None);
                    }
                }
            }
        };

        Ok(update_for(&item, new_release, confirmed_at, None))
    }

    /// Read a whole partition, stopping at the first failed page
    async fn collect_partition(&self, partition: Partition) -> (Vec<Item>, Option<Error>) {
        let mut stream = list_items(self.catalog.as_ref(), partition);
        let mut items = Vec::new();

        while let Some(next) = stream.next().await {
            match next {
                Ok(item) => items.push(item),
                Err(e) => return (items, Some(e)),
            }
        }

        debug!("Read {} item(s) from {:?} partition", items.len(), partition);
        (items, None)
    }
}

/// Update for a matched content-API pair, if the source is ahead
fn content_api_update(current: &Item, fresh: &ExternalItem, now: &DateTime<Tz>) -> Option<CatalogWrite> {
    let new_release = fresh.latest_release?;
    let confirmed_at = fresh
        .released_at
        .map(|at| at.with_timezone(&now.timezone()).fixed_offset())
        .unwrap_or_else(|| now.fixed_offset());

    // Tags are only ever added; the catalog replaces the whole set on write
    let status_set = (!current.status_set.contains(&fresh.status)).then(|| {
        let mut merged = current.status_set.clone();
        merged.insert(fresh.status);
        merged
    });

    update_for(current, new_release, confirmed_at, status_set)
}

fn update_for(
    current: &Item,
    new_release: f64,
    confirmed_at: DateTime<FixedOffset>,
    status_set: Option<BTreeSet<Status>>,
) -> Option<CatalogWrite> {
    let Some(id) = current.id.clone() else {
        warn!("'{}' has no catalog id, cannot update", current.title);
        return None;
    };

    let delta = ItemDelta::advance(current, new_release, confirmed_at)?;
    let delta = match status_set {
        Some(status_set) => delta.with_status_set(status_set),
        None => delta,
    };

    Some(CatalogWrite::Update {
        id,
        title: current.title.clone(),
        delta,
    })
}

/// Full item for a subscription missing from the catalog
fn new_item(fresh: &ExternalItem, now: &DateTime<Tz>) -> Item {
    let confirmed_at = fresh.latest_release.map(|_| {
        fresh
            .released_at
            .map(|at| at.with_timezone(&now.timezone()).fixed_offset())
            .unwrap_or_else(|| now.fixed_offset())
    });

    Item {
        id: None,
        kind: CONTENT_API_KIND.to_string(),
        title: fresh.title.clone(),
        source_link: fresh.source_link.clone(),
        status_set: BTreeSet::from([fresh.status]),
        current_progress: 0.0,
        latest_release: fresh.latest_release.unwrap_or(0.0),
        latest_release_updated_at: confirmed_at,
        seen_latest_release: false,
        release_schedule: None,
        rating: None,
        art_url: fresh.art_url.clone(),
    }
}
