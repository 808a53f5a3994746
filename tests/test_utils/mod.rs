//! Shared fixtures for integration tests.
//!
//! A `wiremock` server stands in for the workplace platform; clients built
//! here retry quickly so retry paths stay fast.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{Value, json};
use storecomms::config::AppConfig;
use storecomms::platform::{PlatformClient, RetryPolicy};
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "test-token";
pub const SPACE_ID: &str = "space-1";

/// Three attempts with millisecond pauses.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        rate_limit_backoff: Duration::from_millis(10),
        transport_backoff: Duration::from_millis(10),
    }
}

/// Client pointed at the mock platform.
pub fn platform_client(server: &MockServer) -> PlatformClient {
    PlatformClient::new(
        server.uri(),
        Some(TEST_TOKEN.to_string()),
        fast_retry(),
        Duration::from_secs(5),
    )
    .expect("client builds")
}

/// Configuration for a full app against the mock platform, with fast polling.
pub fn test_config(server: &MockServer) -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        ..AppConfig::default()
    };
    config.platform.base_url = server.uri();
    config.platform.token = Some(TEST_TOKEN.to_string());
    config.platform.space_id = SPACE_ID.to_string();
    config.platform.studio_url = Some("https://studio.example.com".to_string());
    config.gate.rate_limit_backoff_ms = 10;
    config.gate.transport_backoff_ms = 10;
    config.import.preview_poll_ms = 5;
    config.import.preview_max_polls = 5;
    config.import.commit_poll_ms = 5;
    config.import.commit_max_polls = 5;
    config.distribution.batch_pause_ms = 0;
    config
}

/// A directory user carrying `store` in the `storeid` profile attribute.
pub fn user(id: &str, store: Option<&str>, first: &str, last: &str) -> Value {
    let mut profile = serde_json::Map::new();
    if let Some(store) = store {
        profile.insert("storeid".to_string(), json!(store));
    }
    json!({
        "id": id,
        "externalId": format!("ext-{}", id),
        "firstName": first,
        "lastName": last,
        "profile": profile,
    })
}

/// An installation as listed under a space.
pub fn installation(id: &str, plugin: &str, title: &str) -> Value {
    json!({
        "id": id,
        "pluginID": plugin,
        "config": {"localization": {"en_US": {"title": title}}},
    })
}
