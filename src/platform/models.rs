//! Wire types for the remote platform's REST contract.
//!
//! Only the fields this service reads are modelled; everything else is ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One page of a `limit`/`offset` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Response of any create call; only the new id is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile: serde_json::Map<String, Value>,
}

impl PlatformUser {
    /// `"<first> <last>"`, trimmed.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    /// Profile attribute as a string; numbers are stringified, blanks are absent.
    pub fn profile_value(&self, key: &str) -> Option<String> {
        match self.profile.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocalizedTitle {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Localization {
    #[serde(rename = "en_US", default, skip_serializing_if = "Option::is_none")]
    pub en_us: Option<LocalizedTitle>,
    #[serde(rename = "de_DE", default, skip_serializing_if = "Option::is_none")]
    pub de_de: Option<LocalizedTitle>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InstallationConfig {
    #[serde(default)]
    pub localization: Option<Localization>,
}

/// A configured plugin instance: announcement channel or store project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "pluginID", default)]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub config: Option<InstallationConfig>,
    #[serde(rename = "accessorIDs", default)]
    pub accessor_ids: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl Installation {
    /// English display title, if configured.
    pub fn title(&self) -> Option<&str> {
        self.config
            .as_ref()?
            .localization
            .as_ref()?
            .en_us
            .as_ref()?
            .title
            .as_deref()
    }

    pub fn created(&self) -> Option<&str> {
        self.created_at.as_deref().or(self.created.as_deref())
    }
}

/// Body of `POST /spaces/{space}/installations`.
#[derive(Debug, Clone, Serialize)]
pub struct NewInstallation {
    #[serde(rename = "pluginID")]
    pub plugin_id: String,
    #[serde(rename = "externalID")]
    pub external_id: String,
    pub config: InstallationConfig,
    #[serde(rename = "accessorIDs")]
    pub accessor_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PostContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teaser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kicker: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PostContents {
    #[serde(rename = "en_US", default)]
    pub en_us: Option<PostContent>,
}

/// Body of `POST /channels/{id}/posts`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub contents: PostContents,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub contents: Option<PostContents>,
    #[serde(default)]
    pub published: Option<Value>,
    #[serde(default)]
    pub planned: Option<Value>,
}

impl Post {
    pub fn content(&self) -> Option<&PostContent> {
        self.contents.as_ref()?.en_us.as_ref()
    }

    pub fn is_published(&self) -> bool {
        is_truthy(self.published.as_ref())
    }

    pub fn is_planned(&self) -> bool {
        is_truthy(self.planned.as_ref())
    }
}

/// Body of `POST /tasks/{installation}/tasks`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: String,
    pub task_list_id: String,
    pub assignee_ids: Vec<String>,
    pub group_ids: Vec<String>,
    pub priority: String,
    pub attachment_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// Snapshot of a bulk import job as reported by `GET /users/imports/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub stats: Option<Value>,
    #[serde(default)]
    pub errors: Option<Value>,
}

/// Result of the multipart CSV upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub import_id: Option<String>,
    pub body: Value,
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// Accepts ids encoded either as JSON strings or numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
