//! # Remote-Call Gate
//!
//! Every request to the workplace platform goes through [`PlatformClient`],
//! which attaches credentials, retries rate-limited and failed transports a
//! bounded number of times, and turns everything else into a [`PlatformError`].

pub mod api;
pub mod error;
pub mod models;

use std::time::Duration;

use reqwest::{
    Method, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, LOCATION},
    multipart,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{AppConfig, GateConfig};

pub use error::PlatformError;
pub use models::UploadReceipt;

/// Attempt budget and pauses applied by the gate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub transport_backoff: Duration,
}

impl From<&GateConfig> for RetryPolicy {
    fn from(config: &GateConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            rate_limit_backoff: config.rate_limit_backoff(),
            transport_backoff: config.transport_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&GateConfig::default())
    }
}

/// Authenticated client for the remote platform.
#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    /// Create a client with an explicit retry policy and request timeout.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("storecomms/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            retry,
        })
    }

    /// Create a client from the application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, PlatformError> {
        Self::new(
            config.platform.base_url.clone(),
            config.platform.token.clone(),
            RetryPolicy::from(&config.gate),
            config.gate.request_timeout(),
        )
    }

    /// Issue a JSON call and return the parsed response (`{}` for 204).
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, PlatformError> {
        self.call_with_headers(method, path, body, HeaderMap::new())
            .await
    }

    /// Issue a JSON call and deserialize the response into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, PlatformError> {
        let value = self.call(method, path, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Issue a JSON call with extra headers layered over the defaults.
    pub async fn call_with_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        extra_headers: HeaderMap,
    ) -> Result<Value, PlatformError> {
        let url = format!("{}{}", self.base_url, path);
        let payload = body.map(serde_json::to_vec).transpose()?;
        let max_attempts = self.retry.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = self
                .authorize(self.http.request(method.clone(), &url))
                .header(CONTENT_TYPE, "application/json")
                .headers(extra_headers.clone());
            if let Some(bytes) = &payload {
                request = request.body(bytes.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt >= max_attempts {
                        error!(
                            method = %method,
                            path,
                            attempts = attempt,
                            error = %err,
                            "Platform call failed after retries"
                        );
                        return Err(PlatformError::Timeout {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }
                    warn!(
                        method = %method,
                        path,
                        attempt,
                        error = %err,
                        "Platform transport failure, retrying"
                    );
                    tokio::time::sleep(self.retry.transport_backoff).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= max_attempts {
                    error!(
                        method = %method,
                        path,
                        status = status.as_u16(),
                        attempts = attempt,
                        "Platform rate limit outlasted retries"
                    );
                    return Err(PlatformError::RateLimited { attempts: attempt });
                }
                warn!(
                    method = %method,
                    path,
                    attempt,
                    backoff_ms = self.retry.rate_limit_backoff.as_millis() as u64,
                    "Platform rate limit hit, backing off"
                );
                tokio::time::sleep(self.retry.rate_limit_backoff).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!(
                    method = %method,
                    path,
                    status = status.as_u16(),
                    body = %body,
                    "Platform call rejected"
                );
                return Err(PlatformError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Object(Default::default()));
            }

            let bytes = response.bytes().await.map_err(|err| {
                error!(method = %method, path, error = %err, "Failed to read platform response");
                PlatformError::Decode(err.to_string())
            })?;
            debug!(method = %method, path, status = status.as_u16(), "Platform call succeeded");
            return decode_body(&bytes);
        }
    }

    /// Upload CSV content as a multipart file and return the created import.
    ///
    /// This bypasses the JSON helper: the import endpoint expects file-upload
    /// encoding and is not retried.
    pub async fn upload_csv(
        &self,
        csv_content: &str,
        filename: &str,
    ) -> Result<UploadReceipt, PlatformError> {
        let path = "/users/imports";
        let part = multipart::Part::text(csv_content.to_string())
            .file_name(filename.to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .authorize(self.http.post(format!("{}{}", self.base_url, path)))
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                error!(path, error = %err, "CSV upload failed");
                PlatformError::Timeout {
                    attempts: 1,
                    message: err.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(path, status = status.as_u16(), body = %body, "CSV upload rejected");
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let location_id = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        // The body is optional; a location header alone is a valid answer.
        let body = response
            .bytes()
            .await
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
            .unwrap_or_else(|| Value::Object(Default::default()));

        let import_id = location_id.or_else(|| match body.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        });

        Ok(UploadReceipt { import_id, body })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Basic {}", token)),
            None => request,
        }
    }
}

fn decode_body(bytes: &[u8]) -> Result<Value, PlatformError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_slice(bytes)?)
}
