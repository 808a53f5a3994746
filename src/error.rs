//! # Error Handling
//!
//! Every handler failure is rendered as `application/problem+json` with the
//! request's trace id. Component errors (remote platform, import job,
//! validation) are mapped onto it here so handlers can use `?` throughout.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::announce::AnnounceError;
use crate::import::ImportError;
use crate::platform::PlatformError;
use crate::telemetry;

const BODY_SNIPPET_CHARS: usize = 200;
const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 30;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace id of the running request, or a short correlation id outside one.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Caller input that cannot be acted on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title is required.")]
    MissingTitle,

    #[error("No verified users provided.")]
    NoVerifiedUsers,

    #[error("storeIds must be an array of store identifiers.")]
    InvalidStoreIds,

    #[error("No CSV content provided.")]
    EmptyCsv,

    #[error("{field}: {reason}")]
    Field { field: &'static str, reason: String },
}

impl ValidationError {
    fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingTitle => "title",
            ValidationError::NoVerifiedUsers => "verifiedUsers",
            ValidationError::InvalidStoreIds => "storeIds",
            ValidationError::EmptyCsv => "csvContent",
            ValidationError::Field { field, .. } => field,
        }
    }
}

/// Upstream platform error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Upstream system identifier
    pub provider: String,
    /// HTTP status code from upstream, absent for timeouts and transport failures
    pub status: Option<u16>,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        let mut details = serde_json::Map::new();
        details.insert(error.field().to_string(), json!(error.to_string()));
        validation_error(&error.to_string(), serde_json::Value::Object(details))
    }
}

impl From<PlatformError> for ApiError {
    fn from(error: PlatformError) -> Self {
        match &error {
            PlatformError::Status { status, body } => {
                provider_error("platform", Some(*status), Some(body.clone()))
            }
            PlatformError::RateLimited { .. } => provider_error("platform", Some(429), None)
                .with_retry_after(RATE_LIMIT_RETRY_AFTER_SECS),
            other => {
                let mut api = provider_error("platform", None, None);
                api.message = other.to_string().into_boxed_str();
                api
            }
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(error: ImportError) -> Self {
        match error {
            ImportError::EmptyCsv => ValidationError::EmptyCsv.into(),
            ImportError::Platform(platform) => platform.into(),
            other => {
                let details = other.remote_errors().cloned();
                let api = ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "IMPORT_FAILED",
                    &other.to_string(),
                );
                match details {
                    Some(errors) => api.with_details(errors),
                    None => api,
                }
            }
        }
    }
}

impl From<AnnounceError> for ApiError {
    fn from(error: AnnounceError) -> Self {
        match error {
            AnnounceError::Invalid(invalid) => invalid.into(),
            AnnounceError::Channel(source) | AnnounceError::Post { source, .. } => source.into(),
        }
    }
}

/// Create an upstream platform error. Every upstream failure maps to 502.
pub fn provider_error(provider: &str, status: Option<u16>, body: Option<String>) -> ApiError {
    let provider_error = ProviderError {
        provider: provider.to_string(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > BODY_SNIPPET_CHARS {
                let truncated: String = b.chars().take(BODY_SNIPPET_CHARS).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    let message = match status {
        Some(status) => format!("Provider {} returned error status {}", provider, status),
        None => format!("Provider {} request failed", provider),
    };

    ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &message)
        .with_details(json!(provider_error))
}

pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
