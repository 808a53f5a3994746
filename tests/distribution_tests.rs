//! Announcement creation and task fan-out against a mock platform.

mod test_utils;

use chrono::NaiveDate;
use serde_json::json;
use storecomms::announce::{AnnounceError, AnnouncementRequest, Distributor, Task};
use storecomms::config::{DistributionConfig, PlatformConfig};
use storecomms::directory::DirectoryEntry;
use storecomms::error::ValidationError;
use test_utils::{SPACE_ID, installation, platform_client};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target(id: &str, store: &str) -> DirectoryEntry {
    DirectoryEntry {
        id: id.to_string(),
        visible_id: store.to_string(),
        external_id: None,
        name: format!("Store {}", store),
    }
}

fn task(title: &str, due: Option<NaiveDate>) -> Task {
    Task {
        title: title.to_string(),
        description: Some(format!("{} details", title)),
        due_date: due,
    }
}

fn distributor(server: &MockServer, platform: PlatformConfig) -> Distributor {
    let distribution = DistributionConfig {
        batch_size: 2,
        batch_pause_ms: 0,
    };
    Distributor::new(platform_client(server), &platform, &distribution)
}

fn platform() -> PlatformConfig {
    PlatformConfig {
        space_id: SPACE_ID.to_string(),
        ..PlatformConfig::default()
    }
}

async fn mount_channel_and_post(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chan-1"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/chan-1/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "post-1"})))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_installations(server: &MockServer, installations: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": installations})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_safety_drill_reaches_the_one_store_with_a_project() {
    let server = MockServer::start().await;
    mount_channel_and_post(&server).await;
    mount_installations(
        &server,
        vec![
            installation("proj-100", "tasks", "Store #100"),
            installation("chan-old", "news", "Safety - 1/2/2026"),
        ],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/tasks/proj-100/lists"))
        .and(body_partial_json(json!({"name": "Safety Drill"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "list-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks/proj-100/tasks"))
        .and(body_partial_json(json!({
            "taskListId": "list-1",
            "status": "OPEN",
            "priority": "Priority_3"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "t"})))
        .expect(2)
        .mount(&server)
        .await;

    let outcome = distributor(&server, platform())
        .create_and_distribute(AnnouncementRequest {
            target_users: vec![target("u1", "100"), target("u2", "200")],
            title: "Safety Drill".to_string(),
            department: Some("Safety".to_string()),
            tasks: vec![
                task("Check exits", NaiveDate::from_ymd_opt(2026, 11, 3)),
                task("Test alarm", None),
            ],
        })
        .await
        .expect("announcement created");

    assert_eq!(outcome.channel_id, "chan-1");
    assert_eq!(outcome.post_id, "post-1");
    assert_eq!(outcome.task_lists_created, 1);
    assert_eq!(outcome.task_count, 2);
    assert!(outcome.task_errors.is_empty());
}

#[tokio::test]
async fn test_channel_accessors_include_ops_members_and_fixed_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "ops-1"}, {"id": "u1"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .and(body_partial_json(json!({
            "pluginID": "news",
            "accessorIDs": ["u1", "ops-1", "fixed-9"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chan-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/chan-1/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "post-1"})))
        .mount(&server)
        .await;

    let platform = PlatformConfig {
        ops_group_id: Some("ops".to_string()),
        fixed_ops_ids: vec!["fixed-9".to_string(), "u1".to_string()],
        ..platform()
    };
    let outcome = distributor(&server, platform)
        .create_and_distribute(AnnouncementRequest {
            target_users: vec![target("u1", "100")],
            title: "Holiday hours".to_string(),
            department: None,
            tasks: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.task_lists_created, 0);
    assert_eq!(outcome.task_count, 0);
}

#[tokio::test]
async fn test_ops_group_failure_keeps_targets_and_fixed_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("search down"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .and(body_partial_json(json!({
            "pluginID": "news",
            "accessorIDs": ["u1", "fixed-9"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chan-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/chan-1/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "post-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let platform = PlatformConfig {
        ops_group_id: Some("ops".to_string()),
        fixed_ops_ids: vec!["fixed-9".to_string()],
        ..platform()
    };
    let outcome = distributor(&server, platform)
        .create_and_distribute(AnnouncementRequest {
            target_users: vec![target("u1", "100")],
            title: "Holiday hours".to_string(),
            department: None,
            tasks: Vec::new(),
        })
        .await
        .expect("announcement created without ops members");

    assert_eq!(outcome.channel_id, "chan-1");
    assert_eq!(outcome.post_id, "post-1");
}

#[tokio::test]
async fn test_task_list_failure_skips_only_that_store() {
    let server = MockServer::start().await;
    mount_channel_and_post(&server).await;
    mount_installations(
        &server,
        vec![
            installation("proj-100", "tasks", "Store #100"),
            installation("proj-200", "tasks", "Store #200"),
            installation("proj-300", "tasks", "Store #300"),
        ],
    )
    .await;
    for (project, list) in [("proj-100", "l-100"), ("proj-300", "l-300")] {
        Mock::given(method("POST"))
            .and(path(format!("/tasks/{}/lists", project)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": list})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/tasks/{}/tasks", project)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/tasks/proj-200/lists"))
        .respond_with(ResponseTemplate::new(500).set_body_string("list quota"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks/proj-200/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = distributor(&server, platform())
        .create_and_distribute(AnnouncementRequest {
            target_users: vec![target("u1", "100"), target("u2", "200"), target("u3", "300")],
            title: "Inventory count".to_string(),
            department: Some("Operations".to_string()),
            tasks: vec![task("Count shelves", None)],
        })
        .await
        .unwrap();

    assert_eq!(outcome.task_lists_created, 2);
    assert_eq!(outcome.task_count, 2);
    assert_eq!(outcome.task_errors.len(), 1);
    let failure = &outcome.task_errors[0];
    assert_eq!(failure.installation.as_deref(), Some("proj-200"));
    assert_eq!(failure.store_id.as_deref(), Some("200"));
    assert!(failure.task.is_none());
    assert!(failure.error.contains("500"));
}

#[tokio::test]
async fn test_task_failures_are_isolated_per_store() {
    let server = MockServer::start().await;
    mount_channel_and_post(&server).await;
    mount_installations(
        &server,
        vec![
            installation("proj-100", "tasks", "Store #100"),
            installation("proj-200", "tasks", "Store 200"),
            installation("proj-300", "tasks", "Store #300"),
        ],
    )
    .await;
    for (project, list) in [("proj-100", "l-100"), ("proj-300", "l-300")] {
        Mock::given(method("POST"))
            .and(path(format!("/tasks/{}/lists", project)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": list})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/tasks/{}/tasks", project)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/tasks/proj-200/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "l-200"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks/proj-200/tasks"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let outcome = distributor(&server, platform())
        .create_and_distribute(AnnouncementRequest {
            target_users: vec![target("u1", "100"), target("u2", "200"), target("u3", "300")],
            title: "Inventory count".to_string(),
            department: Some("Operations".to_string()),
            tasks: vec![task("Count shelves", None)],
        })
        .await
        .unwrap();

    assert_eq!(outcome.task_lists_created, 3);
    assert_eq!(outcome.task_count, 2);
    assert_eq!(outcome.task_errors.len(), 1);
    let failure = &outcome.task_errors[0];
    assert_eq!(failure.installation.as_deref(), Some("proj-200"));
    assert_eq!(failure.store_id.as_deref(), Some("200"));
    assert_eq!(failure.task.as_deref(), Some("Count shelves"));
}

#[tokio::test]
async fn test_post_failure_reports_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/spaces/{}/installations", SPACE_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chan-1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/chan-1/posts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = distributor(&server, platform())
        .create_and_distribute(AnnouncementRequest {
            target_users: vec![target("u1", "100")],
            title: "Update".to_string(),
            department: None,
            tasks: Vec::new(),
        })
        .await
        .unwrap_err();

    match err {
        AnnounceError::Post { channel_id, .. } => assert_eq!(channel_id, "chan-1"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_validation_runs_before_any_remote_call() {
    let server = MockServer::start().await;

    let err = distributor(&server, platform())
        .create_and_distribute(AnnouncementRequest {
            target_users: Vec::new(),
            title: "Update".to_string(),
            department: None,
            tasks: Vec::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnnounceError::Invalid(ValidationError::NoVerifiedUsers)
    ));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
