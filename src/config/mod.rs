//! Configuration loading for the store communications service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `STORECOMMS_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "STORECOMMS_";

/// Application configuration derived from `STORECOMMS_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
}

/// Connection details for the remote workplace platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PlatformConfig {
    /// REST base URL, e.g. `https://app.example.com/api`
    #[serde(default)]
    pub base_url: String,
    /// Pre-encoded credential sent as `Authorization: Basic <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Workspace that holds announcement channels and store projects
    #[serde(default)]
    pub space_id: String,
    /// Profile attribute carrying the visible store identifier
    #[serde(default = "default_hidden_attribute_key")]
    pub hidden_attribute_key: String,
    /// Base URL for human-facing edit links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub studio_url: Option<String>,
    /// Accessors granted on every channel regardless of target stores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_ops_ids: Vec<String>,
    /// Group whose members are granted on every channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ops_group_id: Option<String>,
}

/// Retry policy for the remote-call gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GateConfig {
    /// Total attempts per call, including the first one (default: 3)
    #[serde(default = "default_gate_max_attempts")]
    pub max_attempts: u32,
    /// Pause after a 429 response in milliseconds (default: 2000)
    #[serde(default = "default_gate_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    /// Pause after a transport failure in milliseconds (default: 1000)
    #[serde(default = "default_gate_transport_backoff_ms")]
    pub transport_backoff_ms: u64,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_gate_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// Directory cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DirectoryConfig {
    /// Snapshot time-to-live in seconds (default: 900)
    #[serde(default = "default_directory_ttl_seconds")]
    pub ttl_seconds: u64,
}

/// Polling budget for the bulk CSV import workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ImportConfig {
    #[serde(default = "default_import_preview_poll_ms")]
    pub preview_poll_ms: u64,
    #[serde(default = "default_import_preview_max_polls")]
    pub preview_max_polls: u32,
    #[serde(default = "default_import_commit_poll_ms")]
    pub commit_poll_ms: u64,
    #[serde(default = "default_import_commit_max_polls")]
    pub commit_max_polls: u32,
}

/// Fan-out settings for per-store task distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DistributionConfig {
    /// Installations processed concurrently per batch (default: 5)
    #[serde(default = "default_distribution_batch_size")]
    pub batch_size: usize,
    /// Pause between batches in milliseconds (default: 200)
    #[serde(default = "default_distribution_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            platform: PlatformConfig::default(),
            gate: GateConfig::default(),
            directory: DirectoryConfig::default(),
            import: ImportConfig::default(),
            distribution: DistributionConfig::default(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            space_id: String::new(),
            hidden_attribute_key: default_hidden_attribute_key(),
            studio_url: None,
            fixed_ops_ids: Vec::new(),
            ops_group_id: None,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_gate_max_attempts(),
            rate_limit_backoff_ms: default_gate_rate_limit_backoff_ms(),
            transport_backoff_ms: default_gate_transport_backoff_ms(),
            request_timeout_seconds: default_gate_request_timeout_seconds(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_directory_ttl_seconds(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            preview_poll_ms: default_import_preview_poll_ms(),
            preview_max_polls: default_import_preview_max_polls(),
            commit_poll_ms: default_import_commit_poll_ms(),
            commit_max_polls: default_import_commit_max_polls(),
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_distribution_batch_size(),
            batch_pause_ms: default_distribution_batch_pause_ms(),
        }
    }
}

impl PlatformConfig {
    /// Studio base URL, falling back to the API base without its `/api` segment.
    pub fn studio_base(&self) -> Option<String> {
        if let Some(url) = self.studio_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.trim_end_matches('/').to_string());
        }
        if self.base_url.is_empty() {
            return None;
        }
        Some(self.base_url.replacen("/api", "", 1).trim_end_matches('/').to_string())
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(ConfigError::InvalidGateAttempts {
                value: self.max_attempts,
            });
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidGateTimeout);
        }
        Ok(())
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn transport_backoff(&self) -> Duration {
        Duration::from_millis(self.transport_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_max_polls == 0 || self.commit_max_polls == 0 {
            return Err(ConfigError::InvalidImportPollBudget);
        }
        Ok(())
    }
}

impl DistributionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > 50 {
            return Err(ConfigError::InvalidBatchSize {
                value: self.batch_size,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.platform.token.is_some() {
            config.platform.token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Local and test profiles may run against a mock platform configured later
        if !matches!(self.profile.as_str(), "local" | "test") {
            if self.platform.base_url.is_empty() {
                return Err(ConfigError::MissingPlatformBaseUrl);
            }
            if self.platform.token.is_none() {
                return Err(ConfigError::MissingPlatformToken);
            }
            if self.platform.space_id.is_empty() {
                return Err(ConfigError::MissingSpaceId);
            }
        }

        if !self.platform.base_url.is_empty()
            && let Err(source) = url::Url::parse(&self.platform.base_url)
        {
            return Err(ConfigError::InvalidPlatformBaseUrl {
                value: self.platform.base_url.clone(),
                source,
            });
        }

        if self.platform.hidden_attribute_key.trim().is_empty() {
            return Err(ConfigError::MissingHiddenAttributeKey);
        }

        if self.directory.ttl_seconds == 0 {
            return Err(ConfigError::InvalidDirectoryTtl);
        }

        self.gate.validate()?;
        self.import.validate()?;
        self.distribution.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_hidden_attribute_key() -> String {
    "storeid".to_string()
}

fn default_gate_max_attempts() -> u32 {
    3
}

fn default_gate_rate_limit_backoff_ms() -> u64 {
    2000
}

fn default_gate_transport_backoff_ms() -> u64 {
    1000
}

fn default_gate_request_timeout_seconds() -> u64 {
    30
}

fn default_directory_ttl_seconds() -> u64 {
    900 // 15 minutes
}

fn default_import_preview_poll_ms() -> u64 {
    1000
}

fn default_import_preview_max_polls() -> u32 {
    30
}

fn default_import_commit_poll_ms() -> u64 {
    2000
}

fn default_import_commit_max_polls() -> u32 {
    60
}

fn default_distribution_batch_size() -> usize {
    5
}

fn default_distribution_batch_pause_ms() -> u64 {
    200
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("platform base URL is missing; set STORECOMMS_PLATFORM_BASE_URL")]
    MissingPlatformBaseUrl,
    #[error("invalid platform base URL '{value}': {source}")]
    InvalidPlatformBaseUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("platform token is missing; set STORECOMMS_PLATFORM_TOKEN")]
    MissingPlatformToken,
    #[error("space id is missing; set STORECOMMS_SPACE_ID")]
    MissingSpaceId,
    #[error("hidden attribute key must not be blank")]
    MissingHiddenAttributeKey,
    #[error("directory TTL must be positive")]
    InvalidDirectoryTtl,
    #[error("gate max attempts must be between 1 and 10, got {value}")]
    InvalidGateAttempts { value: u32 },
    #[error("gate request timeout must be positive")]
    InvalidGateTimeout,
    #[error("import poll budgets must be positive")]
    InvalidImportPollBudget,
    #[error("distribution batch size must be between 1 and 50, got {value}")]
    InvalidBatchSize { value: usize },
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: String, value: String },
}

/// Loads configuration using layered `.env` files and `STORECOMMS_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from dotenv layers, then the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_string(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);

        let platform = PlatformConfig {
            base_url: take_string(&mut layered, "PLATFORM_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            token: take_string(&mut layered, "PLATFORM_TOKEN"),
            space_id: take_string(&mut layered, "SPACE_ID").unwrap_or_default(),
            hidden_attribute_key: take_string(&mut layered, "HIDDEN_ATTRIBUTE_KEY")
                .unwrap_or_else(default_hidden_attribute_key),
            studio_url: take_string(&mut layered, "STUDIO_URL"),
            fixed_ops_ids: take_string(&mut layered, "FIXED_OPS_IDS")
                .map(|ids| split_list(&ids))
                .unwrap_or_default(),
            ops_group_id: take_string(&mut layered, "OPS_GROUP_ID"),
        };

        let gate = GateConfig {
            max_attempts: take_parsed(&mut layered, "GATE_MAX_ATTEMPTS")?
                .unwrap_or_else(default_gate_max_attempts),
            rate_limit_backoff_ms: take_parsed(&mut layered, "GATE_RATE_LIMIT_BACKOFF_MS")?
                .unwrap_or_else(default_gate_rate_limit_backoff_ms),
            transport_backoff_ms: take_parsed(&mut layered, "GATE_TRANSPORT_BACKOFF_MS")?
                .unwrap_or_else(default_gate_transport_backoff_ms),
            request_timeout_seconds: take_parsed(&mut layered, "GATE_REQUEST_TIMEOUT_SECONDS")?
                .unwrap_or_else(default_gate_request_timeout_seconds),
        };

        let directory = DirectoryConfig {
            ttl_seconds: take_parsed(&mut layered, "DIRECTORY_TTL_SECONDS")?
                .unwrap_or_else(default_directory_ttl_seconds),
        };

        let import = ImportConfig {
            preview_poll_ms: take_parsed(&mut layered, "IMPORT_PREVIEW_POLL_MS")?
                .unwrap_or_else(default_import_preview_poll_ms),
            preview_max_polls: take_parsed(&mut layered, "IMPORT_PREVIEW_MAX_POLLS")?
                .unwrap_or_else(default_import_preview_max_polls),
            commit_poll_ms: take_parsed(&mut layered, "IMPORT_COMMIT_POLL_MS")?
                .unwrap_or_else(default_import_commit_poll_ms),
            commit_max_polls: take_parsed(&mut layered, "IMPORT_COMMIT_MAX_POLLS")?
                .unwrap_or_else(default_import_commit_max_polls),
        };

        let distribution = DistributionConfig {
            batch_size: take_parsed(&mut layered, "DISTRIBUTION_BATCH_SIZE")?
                .unwrap_or_else(default_distribution_batch_size),
            batch_pause_ms: take_parsed(&mut layered, "DISTRIBUTION_BATCH_PAUSE_MS")?
                .unwrap_or_else(default_distribution_batch_pause_ms),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            platform,
            gate,
            directory,
            import,
            distribution,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: std::str::FromStr>(
    values: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match take_string(values, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: format!("{ENV_PREFIX}{key}"),
                value: raw,
            }),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
