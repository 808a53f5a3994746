//! # API Handlers
//!
//! HTTP endpoints consumed by the browser tool. All routes live under `/api`.

pub mod announcements;
pub mod users;

use axum::{extract::State, response::Json};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ValidationError;
use crate::server::AppState;

/// Liveness response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Non-secret settings the browser needs
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    /// Base URL of the platform studio, for edit links
    pub studio_url: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[utoipa::path(
    get,
    path = "/api/config",
    responses(
        (status = 200, description = "Public configuration", body = PublicConfig)
    ),
    tag = "system"
)]
pub async fn public_config(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(PublicConfig {
        studio_url: state.config.platform.studio_base(),
    })
}

/// A field sent either as JSON or as a JSON-encoded string, as form posts do.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Encoded<T> {
    Value(T),
    Text(String),
}

impl<T: DeserializeOwned> Encoded<T> {
    /// The decoded value; `None` when the string form is not valid JSON for `T`.
    pub fn decode(self) -> Option<T> {
        match self {
            Encoded::Value(value) => Some(value),
            Encoded::Text(text) => serde_json::from_str(&text).ok(),
        }
    }
}

/// Store identifiers from a JSON array of strings or numbers, or a string
/// holding such an array. Blank entries are dropped.
pub fn parse_store_ids(value: &Value) -> Result<Vec<String>, ValidationError> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(Ok(s.trim().to_string())),
                Value::Number(n) => Some(Ok(n.to_string())),
                _ => Some(Err(ValidationError::InvalidStoreIds)),
            })
            .collect(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(inner @ Value::Array(_)) => parse_store_ids(&inner),
            _ => Err(ValidationError::InvalidStoreIds),
        },
        _ => Err(ValidationError::InvalidStoreIds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_store_ids_accepts_strings_and_numbers() {
        let ids = parse_store_ids(&json!(["100", 200, " 300 ", ""])).unwrap();
        assert_eq!(ids, vec!["100", "200", "300"]);
    }

    #[test]
    fn test_parse_store_ids_accepts_encoded_array() {
        let ids = parse_store_ids(&json!("[\"100\", 7]")).unwrap();
        assert_eq!(ids, vec!["100", "7"]);
    }

    #[test]
    fn test_parse_store_ids_rejects_non_arrays() {
        for value in [json!("100"), json!({"id": 1}), json!(null), json!([true])] {
            assert_eq!(
                parse_store_ids(&value),
                Err(ValidationError::InvalidStoreIds)
            );
        }
    }

    #[test]
    fn test_encoded_decodes_both_forms() {
        let direct: Encoded<Vec<u32>> = serde_json::from_value(json!([1, 2])).unwrap();
        let text: Encoded<Vec<u32>> = serde_json::from_value(json!("[3]")).unwrap();
        let broken: Encoded<Vec<u32>> = serde_json::from_value(json!("nope")).unwrap();

        assert_eq!(direct.decode(), Some(vec![1, 2]));
        assert_eq!(text.decode(), Some(vec![3]));
        assert_eq!(broken.decode(), None);
    }
}
