//! Integration tests for the Notion catalog against a mock API server.

use futures::TryStreamExt;
use mangasync_catalog_notion::{NOTION_VERSION, NotionCatalog};
use mangasync_core::config::CatalogConfig;
use mangasync_core::model::{Item, ItemDelta, Partition, Status};
use mangasync_core::traits::{Catalog, list_items};
use mangasync_core::Error;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catalog(server: &MockServer) -> NotionCatalog {
    let mut config = CatalogConfig::new("secret_test_token", "db-1");
    config.rate_limit_backoff_secs = 0;
    NotionCatalog::new(&config)
        .unwrap()
        .with_base_url(server.uri())
}

fn notion_page(id: &str, title: &str, link: &str, latest: f64) -> Value {
    json!({
        "object": "page",
        "id": id,
        "properties": {
            "Title": { "title": [{ "plain_text": title, "text": { "content": title } }] },
            "Link": { "url": link },
            "Status": { "multi_select": [{ "name": "Reading", "color": "red" }] },
            "Latest Release": { "number": latest },
            "Seen Latest Release": { "checkbox": false }
        }
    })
}

fn query_response(pages: Vec<Value>, next_cursor: Option<&str>) -> Value {
    json!({
        "object": "list",
        "results": pages,
        "has_more": next_cursor.is_some(),
        "next_cursor": next_cursor
    })
}

/// Tests that listing follows `next_cursor` until `has_more` is false.
#[tokio::test]
async fn test_list_follows_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(
            vec![notion_page("p3", "Three", "https://mangabuddy.com/3", 3.0)],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(header("Notion-Version", NOTION_VERSION))
        .and(header("Authorization", "Bearer secret_test_token"))
        .and(body_partial_json(json!({
            "filter": { "property": "Link", "url": { "does_not_contain": "mangadex" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(
            vec![
                notion_page("p1", "One", "https://mangabuddy.com/1", 1.0),
                notion_page("p2", "Two", "https://mangabuddy.com/2", 2.5),
            ],
            Some("cursor-2"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog(&server);
    let items: Vec<Item> = list_items(&catalog, Partition::Scrape)
        .try_collect()
        .await
        .unwrap();

    let titles: Vec<&str> = items.iter().map(|item| item.title.as_str()).collect();
    assert_eq!(titles, vec!["One", "Two", "Three"]);
    assert_eq!(items[1].latest_release, 2.5);
    assert_eq!(items[0].id.as_deref(), Some("p1"));
    assert!(items[0].status_set.contains(&Status::Reading));
}

/// Tests that a 429 on the first query call gets one backoff and one retry,
/// without duplicating the page.
#[tokio::test]
async fn test_rate_limited_query_retried_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "object": "error",
            "status": 429,
            "code": "rate_limited"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(query_response(
            vec![notion_page("p1", "Frieren", "https://mangadex.org/title/f", 120.0)],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = catalog(&server);
    let items: Vec<Item> = list_items(&catalog, Partition::ContentApi)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Frieren");
}

/// Tests that a second 429 within the same call is surfaced.
#[tokio::test]
async fn test_persistent_rate_limit_surfaces() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let result = catalog(&server).query_page(Partition::Scrape, None).await;

    assert!(matches!(result, Err(Error::RateLimited(_))));
}

/// Tests that an unauthorized response is not retried.
#[tokio::test]
async fn test_unauthorized_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "object": "error",
            "status": 401,
            "code": "unauthorized"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = catalog(&server).query_page(Partition::Scrape, None).await;

    assert!(matches!(result, Err(Error::AuthExpired(_))));
}

/// Tests that an unexpected body is a decode error, not a panic.
#[tokio::test]
async fn test_malformed_page_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "results": [{ "object": "page" }] })),
        )
        .mount(&server)
        .await;

    let result = catalog(&server).query_page(Partition::Scrape, None).await;

    assert!(matches!(result, Err(Error::Decode(_))));
}

/// Tests that an update is a sparse PATCH of the release properties.
#[tokio::test]
async fn test_update_is_sparse_patch() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/pages/p1"))
        .and(body_partial_json(json!({
            "properties": {
                "Latest Release": { "number": 11.0 },
                "Seen Latest Release": { "checkbox": false }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page", "id": "p1" })))
        .expect(1)
        .mount(&server)
        .await;

    let item = Item::new("Solo", "https://mangabuddy.com/solo")
        .with_id("p1")
        .with_latest_release(10.0, None);
    let confirmed_at = chrono::DateTime::parse_from_rfc3339("2024-05-07T12:00:00+02:00").unwrap();
    let delta = ItemDelta::advance(&item, 11.0, confirmed_at).unwrap();

    catalog(&server).update_item("p1", &delta).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let properties = body["properties"].as_object().unwrap();
    assert!(!properties.contains_key("Status"));
    assert!(!properties.contains_key("Title"));
    assert_eq!(
        properties["Latest Release Updated At"]["date"]["start"],
        "2024-05-07T12:00:00+02:00"
    );
}

/// Tests that a create posts the full page into the configured database.
#[tokio::test]
async fn test_create_posts_full_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pages"))
        .and(body_partial_json(json!({
            "parent": { "database_id": "db-1" },
            "properties": {
                "Title": { "title": [{ "text": { "content": "Dandadan" } }] },
                "Link": { "url": "https://mangadex.org/title/d" },
                "Type": { "select": { "name": "Manga" } }
            },
            "children": [{ "type": "image" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "page", "id": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut item = Item::new("Dandadan", "https://mangadex.org/title/d")
        .with_status(Status::PlanningToRead);
    item.kind = "Manga".to_string();
    item.art_url = Some("https://uploads.mangadex.org/covers/d/c.png.512.jpg".to_string());

    catalog(&server).create_item(&item).await.unwrap();
}

/// Tests that a server error on write is surfaced with its status.
#[tokio::test]
async fn test_server_error_on_update() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/pages/p1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let item = Item::new("X", "https://mangabuddy.com/x").with_id("p1");
    let confirmed_at = chrono::DateTime::parse_from_rfc3339("2024-05-07T12:00:00+02:00").unwrap();
    let delta = ItemDelta::advance(&item, 1.0, confirmed_at).unwrap();

    let result = catalog(&server).update_item("p1", &delta).await;

    assert!(matches!(result, Err(Error::Http { status: 502, .. })));
}
