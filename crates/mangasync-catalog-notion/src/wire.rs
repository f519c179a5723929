//! Notion database wire format
//!
//! Decoding is lenient: a missing or empty property becomes the field's
//! default rather than failing the whole page. Only a page that is not a
//! JSON object with an `id` is a decode error.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat};
use mangasync_core::model::{CONTENT_API_LINK_MARKER, Item, ItemDelta, Partition, Status};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

pub(crate) const PROP_TYPE: &str = "Type";
pub(crate) const PROP_CURRENT_PROGRESS: &str = "Current Progress";
pub(crate) const PROP_RATING: &str = "Rating";
pub(crate) const PROP_LINK: &str = "Link";
pub(crate) const PROP_STATUS: &str = "Status";
pub(crate) const PROP_LATEST_RELEASE_UPDATED_AT: &str = "Latest Release Updated At";
pub(crate) const PROP_LATEST_RELEASE: &str = "Latest Release";
pub(crate) const PROP_SEEN_LATEST_RELEASE: &str = "Seen Latest Release";
pub(crate) const PROP_RELEASE_SCHEDULE: &str = "Release Schedule";
pub(crate) const PROP_TITLE: &str = "Title";

/// Maximum page size accepted by the query endpoint
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub results: Vec<PageObject>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageObject {
    pub id: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Properties {
    #[serde(rename = "Type", default)]
    kind: Option<SelectProperty>,
    #[serde(rename = "Current Progress", default)]
    current_progress: Option<NumberProperty>,
    #[serde(rename = "Rating", default)]
    rating: Option<NumberProperty>,
    #[serde(rename = "Link", default)]
    link: Option<UrlProperty>,
    #[serde(rename = "Status", default)]
    status: Option<MultiSelectProperty>,
    #[serde(rename = "Latest Release Updated At", default)]
    latest_release_updated_at: Option<DateProperty>,
    #[serde(rename = "Latest Release", default)]
    latest_release: Option<NumberProperty>,
    #[serde(rename = "Seen Latest Release", default)]
    seen_latest_release: Option<CheckboxProperty>,
    #[serde(rename = "Release Schedule", default)]
    release_schedule: Option<MultiSelectProperty>,
    #[serde(rename = "Title", default)]
    title: Option<TitleProperty>,
}

#[derive(Debug, Deserialize)]
struct NamedOption {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SelectProperty {
    select: Option<NamedOption>,
}

#[derive(Debug, Deserialize)]
struct NumberProperty {
    number: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct UrlProperty {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MultiSelectProperty {
    #[serde(default)]
    multi_select: Vec<NamedOption>,
}

#[derive(Debug, Deserialize)]
struct DateProperty {
    date: Option<DateValue>,
}

#[derive(Debug, Deserialize)]
struct DateValue {
    start: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckboxProperty {
    #[serde(default)]
    checkbox: bool,
}

#[derive(Debug, Deserialize)]
struct TitleProperty {
    #[serde(default)]
    title: Vec<RichText>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: Option<String>,
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    content: String,
}

fn number(property: &Option<NumberProperty>) -> Option<f64> {
    property.as_ref().and_then(|p| p.number)
}

impl PageObject {
    /// Convert a page into a tracked item
    pub fn into_item(self) -> Item {
        let props = self.properties;

        let title = props
            .title
            .map(|t| {
                t.title
                    .into_iter()
                    .filter_map(|part| part.plain_text.or(part.text.map(|text| text.content)))
                    .collect::<String>()
            })
            .unwrap_or_default();

        let status_set: BTreeSet<Status> = props
            .status
            .map(|s| {
                s.multi_select
                    .iter()
                    .filter_map(|option| Status::from_label(&option.name))
                    .collect()
            })
            .unwrap_or_default();

        let release_schedule = props
            .release_schedule
            .and_then(|s| s.multi_select.into_iter().next())
            .map(|option| option.name);

        Item {
            id: Some(self.id),
            kind: props
                .kind
                .and_then(|k| k.select)
                .map(|option| option.name)
                .unwrap_or_default(),
            title,
            source_link: props.link.and_then(|l| l.url).unwrap_or_default(),
            status_set,
            current_progress: number(&props.current_progress).unwrap_or(0.0),
            latest_release: number(&props.latest_release).unwrap_or(0.0),
            latest_release_updated_at: props
                .latest_release_updated_at
                .and_then(|d| d.date)
                .and_then(|d| d.start)
                .as_deref()
                .and_then(parse_date),
            seen_latest_release: props
                .seen_latest_release
                .map(|c| c.checkbox)
                .unwrap_or(false),
            release_schedule,
            rating: number(&props.rating),
            art_url: None,
        }
    }
}

/// Parse a Notion date property value
///
/// Accepts full RFC 3339 timestamps, offset-less timestamps and plain dates.
/// Values without an offset are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

fn format_date(at: &DateTime<FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Query body selecting one partition by its link
pub fn query_body(partition: Partition, cursor: Option<&str>) -> Value {
    let condition = match partition {
        Partition::ContentApi => "contains",
        Partition::Scrape => "does_not_contain",
    };

    let mut url = Map::new();
    url.insert(condition.into(), json!(CONTENT_API_LINK_MARKER));

    let mut body = json!({
        "filter": { "property": PROP_LINK, "url": url },
        "page_size": PAGE_SIZE,
    });

    if let Some(cursor) = cursor {
        body["start_cursor"] = json!(cursor);
    }

    body
}

fn status_options(status_set: &BTreeSet<Status>) -> Value {
    Value::Array(
        status_set
            .iter()
            .map(|status| json!({ "name": status.label(), "color": status.color() }))
            .collect(),
    )
}

/// Body creating a page for `item` in `database_id`
pub fn create_body(database_id: &str, item: &Item) -> Value {
    let mut properties = Map::new();

    if !item.kind.is_empty() {
        properties.insert(PROP_TYPE.into(), json!({ "select": { "name": item.kind } }));
    }
    properties.insert(
        PROP_TITLE.into(),
        json!({ "title": [{ "text": { "content": item.title } }] }),
    );
    properties.insert(PROP_LINK.into(), json!({ "url": item.source_link }));
    properties.insert(
        PROP_STATUS.into(),
        json!({ "multi_select": status_options(&item.status_set) }),
    );
    properties.insert(
        PROP_CURRENT_PROGRESS.into(),
        json!({ "number": item.current_progress }),
    );
    properties.insert(
        PROP_LATEST_RELEASE.into(),
        json!({ "number": item.latest_release }),
    );
    properties.insert(
        PROP_SEEN_LATEST_RELEASE.into(),
        json!({ "checkbox": item.seen_latest_release }),
    );
    if let Some(ref at) = item.latest_release_updated_at {
        properties.insert(
            PROP_LATEST_RELEASE_UPDATED_AT.into(),
            json!({ "date": { "start": format_date(at) } }),
        );
    }
    if let Some(schedule) = item.release_schedule.as_deref().filter(|s| !s.trim().is_empty()) {
        properties.insert(
            PROP_RELEASE_SCHEDULE.into(),
            json!({ "multi_select": [{ "name": schedule }] }),
        );
    }
    if let Some(rating) = item.rating {
        properties.insert(PROP_RATING.into(), json!({ "number": rating }));
    }

    let mut body = json!({
        "parent": { "database_id": database_id },
        "properties": properties,
    });

    if let Some(ref art_url) = item.art_url {
        body["children"] = json!([{
            "object": "block",
            "type": "image",
            "image": { "type": "external", "external": { "url": art_url } }
        }]);
    }

    body
}

/// Sparse body applying `delta`
pub fn update_body(delta: &ItemDelta) -> Value {
    let mut properties = Map::new();

    properties.insert(
        PROP_LATEST_RELEASE.into(),
        json!({ "number": delta.latest_release() }),
    );
    properties.insert(
        PROP_LATEST_RELEASE_UPDATED_AT.into(),
        json!({ "date": { "start": format_date(&delta.latest_release_updated_at()) } }),
    );
    properties.insert(
        PROP_SEEN_LATEST_RELEASE.into(),
        json!({ "checkbox": delta.seen_latest_release() }),
    );
    if let Some(status_set) = delta.status_set() {
        properties.insert(
            PROP_STATUS.into(),
            json!({ "multi_select": status_options(status_set) }),
        );
    }

    json!({ "properties": properties })
}
