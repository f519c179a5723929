//! Test doubles and common utilities for reconciliation contract tests
//!
//! This module provides in-memory stand-ins for every collaborator of the
//! Reconciler. Each double counts its calls so tests can assert on what was
//! (and was not) fetched or written.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use chrono_tz::Tz;
use mangasync_core::error::{Error, Result};
use mangasync_core::model::{Item, ItemDelta, Partition, Status};
use mangasync_core::registry::ExtractorRegistry;
use mangasync_core::traits::{
    Catalog, CatalogPage, Clock, ContentSource, Extractor, PageFetcher, Release, SourceDetail,
    Subscription,
};
use mangasync_core::{EngineConfig, Reconciler};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tuesday 2024-05-07, 12:00 in Amsterdam
pub fn tuesday_noon() -> DateTime<Tz> {
    chrono_tz::Europe::Amsterdam
        .with_ymd_and_hms(2024, 5, 7, 12, 0, 0)
        .unwrap()
}

pub fn at(rfc3339: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap()
}

/// An in-memory catalog that pages its items and applies writes
pub struct MemoryCatalog {
    items: Mutex<Vec<Item>>,
    page_size: usize,
    /// Partitions whose listing fails at the given page index
    failing_pages: Mutex<HashMap<Partition, usize>>,
    /// Item ids whose updates fail
    failing_updates: Mutex<HashSet<String>>,
    /// Delay applied to every write
    write_delay: Mutex<Duration>,
    query_count: AtomicUsize,
    update_count: AtomicUsize,
    create_count: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: Mutex::new(items),
            page_size: 2,
            failing_pages: Mutex::new(HashMap::new()),
            failing_updates: Mutex::new(HashSet::new()),
            write_delay: Mutex::new(Duration::ZERO),
            query_count: AtomicUsize::new(0),
            update_count: AtomicUsize::new(0),
            create_count: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1000),
        }
    }

    /// Fail listing `partition` when page `page` is requested
    pub fn fail_page(&self, partition: Partition, page: usize) {
        self.failing_pages.lock().unwrap().insert(partition, page);
    }

    /// Fail every update of the item with catalog id `id`
    pub fn fail_updates_of(&self, id: &str) {
        self.failing_updates.lock().unwrap().insert(id.to_string());
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.lock().unwrap().clone()
    }

    /// Snapshot of the item with catalog id `id`
    pub fn item(&self, id: &str) -> Item {
        self.items()
            .into_iter()
            .find(|item| item.id.as_deref() == Some(id))
            .unwrap_or_else(|| panic!("no item with id {id}"))
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.update_count() + self.create_count()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn query_page(&self, partition: Partition, cursor: Option<&str>) -> Result<CatalogPage> {
        self.query_count.fetch_add(1, Ordering::SeqCst);

        let page: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        if self.failing_pages.lock().unwrap().get(&partition) == Some(&page) {
            return Err(Error::network("connection reset"));
        }

        let matching: Vec<Item> = self
            .items()
            .into_iter()
            .filter(|item| partition.contains(&item.source_link))
            .collect();

        let start = page * self.page_size;
        let end = (start + self.page_size).min(matching.len());
        let has_more = end < matching.len();

        Ok(CatalogPage {
            items: matching.get(start..end).map(<[Item]>::to_vec).unwrap_or_default(),
            has_more,
            next_cursor: has_more.then(|| (page + 1).to_string()),
        })
    }

    async fn create_item(&self, item: &Item) -> Result<()> {
        let delay = *self.write_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        self.create_count.fetch_add(1, Ordering::SeqCst);
        let id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.items.lock().unwrap().push(item.clone().with_id(id));
        Ok(())
    }

    async fn update_item(&self, id: &str, delta: &ItemDelta) -> Result<()> {
        let delay = *self.write_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.failing_updates.lock().unwrap().contains(id) {
            return Err(Error::http(502, "bad gateway"));
        }

        self.update_count.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|item| item.id.as_deref() == Some(id))
            .ok_or_else(|| Error::http(404, format!("no page {id}")))?;
        delta.apply_to(item);
        Ok(())
    }

    fn catalog_name(&self) -> &'static str {
        "memory"
    }
}

/// A subscribed work as the fake content API reports it
#[derive(Clone)]
pub struct FakeWork {
    pub id: String,
    pub status: Status,
    pub title: String,
    pub last_chapter: Option<String>,
    pub latest: Option<Release>,
}

impl FakeWork {
    pub fn new(id: &str, title: &str, status: Status) -> Self {
        Self {
            id: id.to_string(),
            status,
            title: title.to_string(),
            last_chapter: None,
            latest: None,
        }
    }

    pub fn with_latest(mut self, number: f64, published_at: Option<&str>) -> Self {
        self.latest = Some(Release {
            number,
            published_at: published_at.map(at),
        });
        self
    }

    pub fn with_last_chapter(mut self, last_chapter: &str) -> Self {
        self.last_chapter = Some(last_chapter.to_string());
        self
    }

    pub fn link(&self) -> String {
        format!("https://mangadex.org/title/{}", self.id)
    }
}

/// A content source serving a fixed set of works
#[derive(Default)]
pub struct FakeContentSource {
    works: Mutex<Vec<FakeWork>>,
    failing_details: Mutex<HashSet<String>>,
    detail_count: AtomicUsize,
    release_count: AtomicUsize,
}

impl FakeContentSource {
    pub fn new(works: Vec<FakeWork>) -> Self {
        Self {
            works: Mutex::new(works),
            ..Self::default()
        }
    }

    /// Fail detail lookups of the work with id `id`
    pub fn fail_detail_of(&self, id: &str) {
        self.failing_details.lock().unwrap().insert(id.to_string());
    }

    /// Replace the latest release of a work
    pub fn publish(&self, id: &str, number: f64) {
        let mut works = self.works.lock().unwrap();
        if let Some(work) = works.iter_mut().find(|work| work.id == id) {
            work.latest = Some(Release {
                number,
                published_at: None,
            });
        }
    }

    pub fn detail_count(&self) -> usize {
        self.detail_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    fn work(&self, id: &str) -> Result<FakeWork> {
        self.works
            .lock()
            .unwrap()
            .iter()
            .find(|work| work.id == id)
            .cloned()
            .ok_or_else(|| Error::http(404, format!("no manga {id}")))
    }
}

#[async_trait]
impl ContentSource for FakeContentSource {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self
            .works
            .lock()
            .unwrap()
            .iter()
            .map(|work| Subscription {
                external_id: work.id.clone(),
                status: work.status,
            })
            .collect())
    }

    async fn fetch_detail(&self, external_id: &str) -> Result<SourceDetail> {
        self.detail_count.fetch_add(1, Ordering::SeqCst);
        if self.failing_details.lock().unwrap().contains(external_id) {
            return Err(Error::network("timed out"));
        }

        let work = self.work(external_id)?;
        Ok(SourceDetail {
            external_id: work.id.clone(),
            title: work.title.clone(),
            source_link: work.link(),
            art_url: None,
            last_chapter: work.last_chapter.clone(),
        })
    }

    async fn latest_release(&self, external_id: &str) -> Result<Option<Release>> {
        self.release_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.work(external_id)?.latest)
    }

    fn source_link(&self, external_id: &str) -> String {
        format!("https://mangadex.org/title/{}", external_id)
    }

    fn source_name(&self) -> &'static str {
        "fake-api"
    }
}

/// A page fetcher serving canned page bodies by URL
#[derive(Default)]
pub struct FakePageFetcher {
    pages: Mutex<HashMap<String, String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakePageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakePageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http(404, format!("no page at {url}")))
    }
}

/// Extracts the number following `latest:` in a page body
pub struct LatestLineExtractor;

impl Extractor for LatestLineExtractor {
    fn extract(&self, content: &str) -> Option<f64> {
        content
            .lines()
            .find_map(|line| line.trim().strip_prefix("latest:"))
            .and_then(|number| number.trim().parse().ok())
    }

    fn name(&self) -> &str {
        "latest-line"
    }
}

/// A clock frozen at a given instant
pub struct FixedClock(pub DateTime<Tz>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.0
    }
}

/// Registry with `mangabuddy.com` extracted and `pahe.win` bumped daily
pub fn test_registry() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register_extractor(&["mangabuddy.com"], Arc::new(LatestLineExtractor));
    registry.register_daily_increment(&["pahe.win"]);
    registry
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        concurrency: 4,
        run_interval_secs: 3600,
        run_deadline_secs: 60,
        timezone: "Europe/Amsterdam".to_string(),
        dry_run: false,
    }
}

/// All collaborators of one reconciler, kept for assertions
pub struct Harness {
    pub catalog: Arc<MemoryCatalog>,
    pub source: Arc<FakeContentSource>,
    pub fetcher: Arc<FakePageFetcher>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new(items: Vec<Item>, works: Vec<FakeWork>) -> Self {
        Self::with_config(items, works, tuesday_noon(), engine_config())
    }

    pub fn with_config(
        items: Vec<Item>,
        works: Vec<FakeWork>,
        now: DateTime<Tz>,
        config: EngineConfig,
    ) -> Self {
        let catalog = Arc::new(MemoryCatalog::new(items));
        let source = Arc::new(FakeContentSource::new(works));
        let fetcher = Arc::new(FakePageFetcher::new());

        let reconciler = Reconciler::new(
            catalog.clone(),
            source.clone(),
            fetcher.clone(),
            Arc::new(test_registry()),
            Arc::new(FixedClock(now)),
            config,
        )
        .expect("valid engine config");

        Self {
            catalog,
            source,
            fetcher,
            reconciler,
        }
    }
}
