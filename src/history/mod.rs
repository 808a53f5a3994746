//! # History Query
//!
//! Past announcements are not stored locally. They are reconstructed from the
//! platform on every query: each announcement channel plus its latest post,
//! with department and due date decoded from the post's kicker and teaser.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use utoipa::{IntoParams, ToSchema};

use crate::announce::{DEFAULT_DEPARTMENT, parse_calendar_date, render::teaser_due_date};
use crate::directory::DirectoryCache;
use crate::platform::{
    PlatformClient, PlatformError,
    models::{Installation, Post},
};

const NEWS_PLUGIN: &str = "news";
const UNTITLED: &str = "Untitled";

/// Query string of `GET /api/items`. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryFilter {
    /// Only announcements visible to this store
    pub store_id: Option<String>,
    /// Exact department, case-insensitive
    pub category: Option<String>,
    /// Earliest due date, `YYYY-MM-DD`
    pub due_date_from: Option<String>,
    /// Latest due date, `YYYY-MM-DD`
    pub due_date_to: Option<String>,
    /// Substring of title or department, case-insensitive
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
}

impl PostStatus {
    pub fn of(post: &Post) -> Self {
        if post.is_published() {
            PostStatus::Published
        } else if post.is_planned() {
            PostStatus::Scheduled
        } else {
            PostStatus::Draft
        }
    }
}

/// One past announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub channel_id: String,
    pub post_id: Option<String>,
    pub title: String,
    pub department: String,
    pub user_count: usize,
    pub created_at: String,
    /// Raw due date token from the post teaser
    pub due_date: Option<String>,
    pub status: PostStatus,
    /// Studio link for editing the post
    #[serde(rename = "studioUrl")]
    pub edit_url: Option<String>,
}

impl HistoryItem {
    /// Item as known from the channel alone, before its post is read.
    fn from_installation(installation: &Installation) -> Self {
        Self {
            channel_id: installation.id.clone(),
            post_id: None,
            title: installation.title().unwrap_or(UNTITLED).to_string(),
            department: DEFAULT_DEPARTMENT.to_string(),
            user_count: installation.accessor_ids.as_ref().map_or(0, Vec::len),
            created_at: installation
                .created()
                .map(str::to_string)
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            due_date: None,
            status: PostStatus::Draft,
            edit_url: None,
        }
    }

    fn apply_post(&mut self, post: &Post, studio_base: Option<&str>) {
        self.post_id = Some(post.id.clone());
        if let Some(content) = post.content() {
            if let Some(title) = content.title.as_deref().filter(|t| !t.is_empty()) {
                self.title = title.to_string();
            }
            if let Some(kicker) = content.kicker.as_deref().map(str::trim)
                && !kicker.is_empty()
            {
                self.department = kicker.to_string();
            }
            self.due_date = content.teaser.as_deref().and_then(teaser_due_date);
        }
        self.status = PostStatus::of(post);
        self.edit_url = studio_base.map(|base| {
            format!(
                "{}/studio/channels/{}/posts/{}/edit",
                base.trim_end_matches('/'),
                self.channel_id,
                post.id
            )
        });
    }
}

/// Parsed form of [`HistoryFilter`].
#[derive(Debug, Clone, Default)]
struct Criteria {
    category: Option<String>,
    due_from: Option<NaiveDate>,
    due_to: Option<NaiveDate>,
    search: Option<String>,
}

impl Criteria {
    fn from_filter(filter: &HistoryFilter) -> Self {
        Self {
            category: non_blank(&filter.category).map(str::to_lowercase),
            due_from: parse_bound("dueDateFrom", &filter.due_date_from),
            due_to: parse_bound("dueDateTo", &filter.due_date_to),
            search: non_blank(&filter.search).map(str::to_lowercase),
        }
    }

    fn matches(&self, item: &HistoryItem) -> bool {
        if let Some(category) = &self.category
            && item.department.to_lowercase() != *category
        {
            return false;
        }

        if self.due_from.is_some() || self.due_to.is_some() {
            let Some(due) = item.due_date.as_deref().and_then(parse_calendar_date) else {
                return false;
            };
            if self.due_from.is_some_and(|from| due < from) || self.due_to.is_some_and(|to| due > to)
            {
                return false;
            }
        }

        if let Some(search) = &self.search
            && !item.title.to_lowercase().contains(search)
            && !item.department.to_lowercase().contains(search)
        {
            return false;
        }

        true
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bound(name: &str, value: &Option<String>) -> Option<NaiveDate> {
    let raw = non_blank(value)?;
    let parsed = parse_calendar_date(raw);
    if parsed.is_none() {
        warn!(filter = name, value = raw, "Ignoring unparseable due date filter");
    }
    parsed
}

pub struct HistoryQuery {
    client: PlatformClient,
    directory: Arc<DirectoryCache>,
    space_id: String,
    studio_base: Option<String>,
}

impl HistoryQuery {
    pub fn new(
        client: PlatformClient,
        directory: Arc<DirectoryCache>,
        space_id: impl Into<String>,
        studio_base: Option<String>,
    ) -> Self {
        Self {
            client,
            directory,
            space_id: space_id.into(),
            studio_base,
        }
    }

    /// Past announcements matching `filter`, newest first. Never fails: a
    /// broken listing yields an empty list.
    pub async fn list_items(&self, filter: &HistoryFilter) -> Vec<HistoryItem> {
        let target_user = match non_blank(&filter.store_id) {
            Some(store_id) => match self.directory.resolve(store_id).await {
                Some(entry) => Some(entry.id),
                None => {
                    debug!(store_id, "Unknown store in history filter");
                    return Vec::new();
                }
            },
            None => None,
        };

        match self.collect(target_user.as_deref(), &Criteria::from_filter(filter)).await {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "History query failed");
                Vec::new()
            }
        }
    }

    async fn collect(
        &self,
        target_user: Option<&str>,
        criteria: &Criteria,
    ) -> Result<Vec<HistoryItem>, PlatformError> {
        let installations = self.client.list_all_installations(&self.space_id).await?;
        let mut items = Vec::new();

        for installation in installations
            .iter()
            .filter(|inst| inst.plugin_id.as_deref() == Some(NEWS_PLUGIN))
        {
            if let Some(user_id) = target_user
                && !installation
                    .accessor_ids
                    .as_ref()
                    .is_some_and(|ids| ids.iter().any(|id| id == user_id))
            {
                continue;
            }

            let mut item = HistoryItem::from_installation(installation);
            match self.client.latest_post(&installation.id).await {
                Ok(Some(post)) => item.apply_post(&post, self.studio_base.as_deref()),
                Ok(None) => {}
                Err(err) => {
                    warn!(channel_id = %installation.id, error = %err, "Could not load latest post");
                }
            }

            if criteria.matches(&item) {
                items.push(item);
            }
        }

        sort_newest_first(&mut items);
        Ok(items)
    }
}

/// Descending by `createdAt`; unparseable timestamps sort last.
fn sort_newest_first(items: &mut [HistoryItem]) {
    items.sort_by_key(|item| {
        Reverse(
            DateTime::parse_from_rfc3339(&item.created_at)
                .ok()
                .map(|created| created.with_timezone(&Utc)),
        )
    });
}
