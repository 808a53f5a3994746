//! Announcement history against a mock space.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use storecomms::directory::{DirectoryCache, ManualClock};
use storecomms::history::{HistoryFilter, HistoryQuery, PostStatus};
use test_utils::{SPACE_ID, platform_client, user};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn channel(id: &str, title: &str, accessors: &[&str], created: &str) -> Value {
    json!({
        "id": id,
        "pluginID": "news",
        "accessorIDs": accessors,
        "createdAt": created,
        "config": {"localization": {"en_US": {"title": title}}},
    })
}

fn post(id: &str, title: &str, kicker: &str, teaser: &str, published: Value) -> Value {
    json!({
        "id": id,
        "published": published,
        "contents": {"en_US": {"title": title, "kicker": kicker, "teaser": teaser}},
    })
}

async fn mock_space(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                user("u1", Some("100"), "Ada", "Lovelace"),
                user("u2", Some("200"), "Alan", "Turing"),
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                channel("c1", "Safety - 10/1/2026", &["u1", "u2"], "2026-10-01T09:00:00.000Z"),
                channel("c2", "Marketing - 10/5/2026", &["u2"], "2026-10-05T09:00:00.000Z"),
                {"id": "p1", "pluginID": "tasks", "config": {"localization": {"en_US": {"title": "Store #100"}}}},
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/c1/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [post(
                "post-1",
                "Fire drill",
                "Safety",
                "DueDate: 2026-10-20; Stores: 2",
                json!("2026-10-01T09:05:00Z"),
            )]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/c2/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [post("post-2", "Window display", "Marketing", "Stores: 1", Value::Null)]
        })))
        .mount(server)
        .await;
}

fn history(server: &MockServer) -> HistoryQuery {
    let client = platform_client(server);
    let directory = Arc::new(DirectoryCache::new(
        client.clone(),
        "storeid",
        Duration::from_secs(300),
        Arc::new(ManualClock::new()),
    ));
    HistoryQuery::new(
        client,
        directory,
        SPACE_ID,
        Some("https://studio.example.com".to_string()),
    )
}

#[tokio::test]
async fn test_lists_news_channels_newest_first() {
    let server = MockServer::start().await;
    mock_space(&server).await;

    let items = history(&server).list_items(&HistoryFilter::default()).await;

    let ids: Vec<_> = items.iter().map(|item| item.channel_id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);

    let drill = &items[1];
    assert_eq!(drill.title, "Fire drill");
    assert_eq!(drill.department, "Safety");
    assert_eq!(drill.user_count, 2);
    assert_eq!(drill.due_date.as_deref(), Some("2026-10-20"));
    assert_eq!(drill.status, PostStatus::Published);
    assert_eq!(
        drill.edit_url.as_deref(),
        Some("https://studio.example.com/studio/channels/c1/posts/post-1/edit")
    );
    assert_eq!(items[0].status, PostStatus::Draft);
}

#[tokio::test]
async fn test_store_filter_limits_to_accessible_channels() {
    let server = MockServer::start().await;
    mock_space(&server).await;

    let filter = HistoryFilter {
        store_id: Some("100".to_string()),
        ..HistoryFilter::default()
    };
    let items = history(&server).list_items(&filter).await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].channel_id, "c1");
}

#[tokio::test]
async fn test_unknown_store_yields_nothing() {
    let server = MockServer::start().await;
    mock_space(&server).await;

    let filter = HistoryFilter {
        store_id: Some("999".to_string()),
        ..HistoryFilter::default()
    };
    assert!(history(&server).list_items(&filter).await.is_empty());
}

#[tokio::test]
async fn test_due_range_and_search_filters() {
    let server = MockServer::start().await;
    mock_space(&server).await;
    let query = history(&server);

    let in_range = HistoryFilter {
        due_date_from: Some("2026-10-15".to_string()),
        due_date_to: Some("2026-10-31".to_string()),
        ..HistoryFilter::default()
    };
    let items = query.list_items(&in_range).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].channel_id, "c1");

    let search = HistoryFilter {
        search: Some("window".to_string()),
        ..HistoryFilter::default()
    };
    let items = query.list_items(&search).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].channel_id, "c2");
}

#[tokio::test]
async fn test_listing_failure_yields_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(
        history(&server)
            .list_items(&HistoryFilter::default())
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_failed_post_lookup_leaves_channel_as_draft() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/c1/posts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("posts unavailable"))
        .expect(1)
        .mount(&server)
        .await;
    mock_space(&server).await;

    let items = history(&server).list_items(&HistoryFilter::default()).await;

    let ids: Vec<_> = items.iter().map(|item| item.channel_id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c1"]);

    let unread = &items[1];
    assert_eq!(unread.title, "Safety - 10/1/2026");
    assert_eq!(unread.status, PostStatus::Draft);
    assert!(unread.post_id.is_none());
    assert!(unread.due_date.is_none());
    assert!(unread.edit_url.is_none());
    assert_eq!(unread.department, "Uncategorized");
    assert_eq!(unread.user_count, 2);

    assert_eq!(items[0].title, "Window display");
    assert_eq!(items[0].post_id.as_deref(), Some("post-2"));
}
