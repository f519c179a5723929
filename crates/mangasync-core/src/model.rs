//! Tracked-item data model
//!
//! An [`Item`] is one row of the tracking list. The catalog owns the
//! authoritative copy; the engine only ever sees snapshots read at the start
//! of a run and describes changes to them as an [`ItemDelta`] or a full
//! [`Item`] to create.

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeSet;

/// Substring that places a link in the content-API partition
pub const CONTENT_API_LINK_MARKER: &str = "mangadex";

/// Lifecycle tag of a tracked work
///
/// Tags are not mutually exclusive: an anime can be both `Completed` and
/// `DoneAiring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Reading,
    Watching,
    Completed,
    Dropped,
    OnHold,
    PlanningToRead,
    PlanningToWatch,
    DoneAiring,
}

impl Status {
    /// Every status tag, in declaration order
    pub const ALL: [Status; 8] = [
        Status::Reading,
        Status::Watching,
        Status::Completed,
        Status::Dropped,
        Status::OnHold,
        Status::PlanningToRead,
        Status::PlanningToWatch,
        Status::DoneAiring,
    ];

    /// Label used for the tag in the catalog
    pub fn label(self) -> &'static str {
        match self {
            Status::Reading => "Reading",
            Status::Watching => "Watching",
            Status::Completed => "Completed",
            Status::Dropped => "Dropped",
            Status::OnHold => "On Hold",
            Status::PlanningToRead => "Planning to Read",
            Status::PlanningToWatch => "Planning to Watch",
            Status::DoneAiring => "Done Airing",
        }
    }

    /// Parse a catalog label; unknown labels yield `None`
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }

    /// Display colour of the tag when written as a select option
    pub fn color(self) -> &'static str {
        match self {
            Status::Dropped => "brown",
            Status::DoneAiring => "green",
            Status::Completed => "pink",
            Status::PlanningToRead | Status::PlanningToWatch => "purple",
            Status::Reading | Status::Watching => "red",
            Status::OnHold => "blue",
        }
    }

    /// Terminal tags end tracking: no fetch and no update
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Dropped | Status::DoneAiring)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which half of the tracking list an item belongs to
///
/// Every item belongs to exactly one partition, decided by its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Items whose ground truth comes from the content API
    ContentApi,
    /// Items whose ground truth is scraped from the source page
    Scrape,
}

impl Partition {
    /// Partition of a source link
    pub fn of_link(link: &str) -> Self {
        if link.contains(CONTENT_API_LINK_MARKER) {
            Partition::ContentApi
        } else {
            Partition::Scrape
        }
    }

    /// Whether `link` belongs to this partition
    pub fn contains(self, link: &str) -> bool {
        Self::of_link(link) == self
    }
}

/// A tracked work
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Catalog identity; `None` until the item has been created
    pub id: Option<String>,
    /// Media type tag ("Manga", "Anime", ...)
    pub kind: String,
    /// Display name, also the fallback matching key
    pub title: String,
    /// Canonical URL of the work
    pub source_link: String,
    /// Lifecycle tags
    pub status_set: BTreeSet<Status>,
    /// User's consumption position
    pub current_progress: f64,
    /// Highest known published chapter/episode
    pub latest_release: f64,
    /// When `latest_release` was last confirmed; `None` if never checked
    pub latest_release_updated_at: Option<DateTime<FixedOffset>>,
    /// Whether the user has seen `latest_release`
    pub seen_latest_release: bool,
    /// Weekday the work releases on; `None` means every run
    pub release_schedule: Option<String>,
    /// Optional user rating
    pub rating: Option<f64>,
    /// Optional cover image
    pub art_url: Option<String>,
}

impl Item {
    /// Create an untracked item with only the identity fields set
    pub fn new(title: impl Into<String>, source_link: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: String::new(),
            title: title.into(),
            source_link: source_link.into(),
            status_set: BTreeSet::new(),
            current_progress: 0.0,
            latest_release: 0.0,
            latest_release_updated_at: None,
            seen_latest_release: false,
            release_schedule: None,
            rating: None,
            art_url: None,
        }
    }

    /// Set the catalog id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a status tag
    pub fn with_status(mut self, status: Status) -> Self {
        self.status_set.insert(status);
        self
    }

    /// Set the latest release and when it was confirmed
    pub fn with_latest_release(
        mut self,
        latest_release: f64,
        updated_at: Option<DateTime<FixedOffset>>,
    ) -> Self {
        self.latest_release = latest_release;
        self.latest_release_updated_at = updated_at;
        self
    }

    /// Set the release weekday
    pub fn with_release_schedule(mut self, weekday: impl Into<String>) -> Self {
        self.release_schedule = Some(weekday.into());
        self
    }

    /// Whether any status tag is terminal
    pub fn is_terminal(&self) -> bool {
        self.status_set.iter().any(|status| status.is_terminal())
    }
}

/// Sparse change to a tracked item
///
/// Only constructible through [`ItemDelta::advance`], which refuses anything
/// that is not a strict increase and always clears `seen_latest_release`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDelta {
    latest_release: f64,
    latest_release_updated_at: DateTime<FixedOffset>,
    status_set: Option<BTreeSet<Status>>,
}

impl ItemDelta {
    /// Delta moving `current` to `new_release`, or `None` if that would not
    /// be an increase
    pub fn advance(
        current: &Item,
        new_release: f64,
        confirmed_at: DateTime<FixedOffset>,
    ) -> Option<Self> {
        if !new_release.is_finite() || new_release <= current.latest_release {
            return None;
        }

        Some(Self {
            latest_release: new_release,
            latest_release_updated_at: confirmed_at,
            status_set: None,
        })
    }

    /// Also replace the item's status tags
    pub fn with_status_set(mut self, status_set: BTreeSet<Status>) -> Self {
        self.status_set = Some(status_set);
        self
    }

    pub fn latest_release(&self) -> f64 {
        self.latest_release
    }

    pub fn latest_release_updated_at(&self) -> DateTime<FixedOffset> {
        self.latest_release_updated_at
    }

    /// Always `false`: every delta announces a new release
    pub fn seen_latest_release(&self) -> bool {
        false
    }

    pub fn status_set(&self) -> Option<&BTreeSet<Status>> {
        self.status_set.as_ref()
    }

    /// Apply the delta to a snapshot
    pub fn apply_to(&self, item: &mut Item) {
        item.latest_release = self.latest_release;
        item.latest_release_updated_at = Some(self.latest_release_updated_at);
        item.seen_latest_release = false;
        if let Some(ref status_set) = self.status_set {
            item.status_set = status_set.clone();
        }
    }
}

/// Parse a chapter/episode number such as `"10"` or `"10.5"`
///
/// Empty, negative, and non-numeric strings yield `None`.
pub fn parse_release(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite() && *number >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in Status::ALL {
            assert_eq!(Status::from_label(status.label()), Some(status));
        }
        assert_eq!(Status::from_label("Re-reading"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<Status> = Status::ALL
            .into_iter()
            .filter(|status| status.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![Status::Completed, Status::Dropped, Status::DoneAiring]
        );
    }

    #[test]
    fn test_partition_by_link() {
        assert_eq!(
            Partition::of_link("https://mangadex.org/title/abc"),
            Partition::ContentApi
        );
        assert_eq!(
            Partition::of_link("https://mangabuddy.com/x"),
            Partition::Scrape
        );
        assert!(Partition::Scrape.contains("https://toomics.com/en/webtoon/1"));
    }

    #[test]
    fn test_delta_requires_increase() {
        let item = Item::new("X", "https://mangabuddy.com/x").with_latest_release(10.0, None);
        let now = at("2024-05-07T12:00:00+02:00");

        assert!(ItemDelta::advance(&item, 10.0, now).is_none());
        assert!(ItemDelta::advance(&item, 9.5, now).is_none());
        assert!(ItemDelta::advance(&item, f64::NAN, now).is_none());

        let delta = ItemDelta::advance(&item, 10.5, now).unwrap();
        assert_eq!(delta.latest_release(), 10.5);
        assert!(!delta.seen_latest_release());
    }

    #[test]
    fn test_apply_clears_seen_flag() {
        let mut item = Item::new("X", "https://mangabuddy.com/x").with_latest_release(3.0, None);
        item.seen_latest_release = true;
        let now = at("2024-05-07T12:00:00+02:00");

        ItemDelta::advance(&item, 4.0, now)
            .unwrap()
            .apply_to(&mut item);

        assert_eq!(item.latest_release, 4.0);
        assert_eq!(item.latest_release_updated_at, Some(now));
        assert!(!item.seen_latest_release);
    }

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("42.5"), Some(42.5));
        assert_eq!(parse_release(" 11 "), Some(11.0));
        assert_eq!(parse_release(""), None);
        assert_eq!(parse_release("Chapter"), None);
        assert_eq!(parse_release("-1"), None);
    }
}
