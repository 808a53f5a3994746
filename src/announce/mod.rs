//! # Announcement + Task Distributor
//!
//! Creates an announcement channel with one post, then copies the
//! announcement's tasks into the project installation of every targeted store.
//!
//! Channel and post creation must succeed for the call to succeed. Task
//! distribution is best effort: every task list and task is attempted on its
//! own and failures come back as [`TaskError`] records next to the counts.

pub mod discovery;
pub mod render;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, warn};
use utoipa::ToSchema;

use crate::config::{DistributionConfig, PlatformConfig};
use crate::directory::DirectoryEntry;
use crate::error::ValidationError;
use crate::platform::{
    PlatformClient, PlatformError,
    models::{
        InstallationConfig, Localization, LocalizedTitle, NewInstallation, NewPost, NewTask,
        PostContent, PostContents,
    },
};

pub use discovery::{ProjectInstallation, discover_projects, store_id_from_title};

/// Tasks beyond this many are dropped before filtering.
pub const MAX_TASKS: usize = 20;
pub const DEFAULT_DEPARTMENT: &str = "Uncategorized";

const NEWS_PLUGIN: &str = "news";
const TASK_STATUS_OPEN: &str = "OPEN";
const TASK_PRIORITY_LOWEST: &str = "Priority_3";

/// One action item attached to an announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Missing or null titles read as blank and the task is dropped.
    #[serde(default, deserialize_with = "blank_if_null")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Calendar date; blank strings and full timestamps are accepted.
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
}

/// Unvalidated announcement input.
#[derive(Debug, Clone)]
pub struct AnnouncementRequest {
    pub target_users: Vec<DirectoryEntry>,
    pub title: String,
    pub department: Option<String>,
    pub tasks: Vec<Task>,
}

/// An announcement that passed validation.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub target_users: Vec<DirectoryEntry>,
    pub title: String,
    pub department: String,
    pub tasks: Vec<Task>,
}

impl AnnouncementRequest {
    pub fn validate(self) -> Result<Announcement, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.target_users.is_empty() {
            return Err(ValidationError::NoVerifiedUsers);
        }

        let department = match self.department.as_deref().map(str::trim) {
            Some(department) if !department.is_empty() && department != "undefined" => {
                department.to_string()
            }
            _ => DEFAULT_DEPARTMENT.to_string(),
        };

        let tasks = self
            .tasks
            .into_iter()
            .take(MAX_TASKS)
            .filter(|task| !task.title.trim().is_empty())
            .map(|task| Task {
                title: task.title.trim().to_string(),
                ..task
            })
            .collect();

        Ok(Announcement {
            target_users: self.target_users,
            title,
            department,
            tasks,
        })
    }
}

/// A task list or task that could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    /// Title of the failed task; absent when the task list itself failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub channel_id: String,
    pub post_id: String,
    pub task_lists_created: usize,
    pub task_count: usize,
    pub task_errors: Vec<TaskError>,
}

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to create announcement channel: {0}")]
    Channel(#[source] PlatformError),

    #[error("failed to create post in channel {channel_id}: {source}")]
    Post {
        channel_id: String,
        #[source]
        source: PlatformError,
    },
}

#[derive(Debug, Default)]
struct Distribution {
    task_lists_created: usize,
    task_count: usize,
    errors: Vec<TaskError>,
}

impl Distribution {
    fn absorb(&mut self, other: Distribution) {
        self.task_lists_created += other.task_lists_created;
        self.task_count += other.task_count;
        self.errors.extend(other.errors);
    }
}

pub struct Distributor {
    client: PlatformClient,
    space_id: String,
    fixed_accessor_ids: Vec<String>,
    ops_group_id: Option<String>,
    batch_size: usize,
    batch_pause: Duration,
}

impl Distributor {
    pub fn new(
        client: PlatformClient,
        platform: &PlatformConfig,
        distribution: &DistributionConfig,
    ) -> Self {
        Self {
            client,
            space_id: platform.space_id.clone(),
            fixed_accessor_ids: platform.fixed_ops_ids.clone(),
            ops_group_id: platform.ops_group_id.clone(),
            batch_size: distribution.batch_size.max(1),
            batch_pause: Duration::from_millis(distribution.batch_pause_ms),
        }
    }

    /// Create the channel and post, then fan the tasks out to store projects.
    pub async fn create_and_distribute(
        &self,
        request: AnnouncementRequest,
    ) -> Result<CreateOutcome, AnnounceError> {
        let announcement = request.validate()?;
        let Announcement {
            target_users,
            title,
            department,
            tasks,
        } = announcement;

        let ops_ids = self.ops_member_ids().await;
        let accessor_ids = accessor_set(
            target_users
                .iter()
                .map(|user| user.id.as_str())
                .chain(ops_ids.iter().map(String::as_str))
                .chain(self.fixed_accessor_ids.iter().map(String::as_str)),
        );

        let name = render::channel_name(&department, Local::now().date_naive());
        let localized = LocalizedTitle {
            title: Some(name.clone()),
        };
        let channel = NewInstallation {
            plugin_id: NEWS_PLUGIN.to_string(),
            external_id: Utc::now().timestamp_millis().to_string(),
            config: InstallationConfig {
                localization: Some(Localization {
                    en_us: Some(localized.clone()),
                    de_de: Some(localized),
                }),
            },
            accessor_ids,
        };
        let channel_id = self
            .client
            .create_installation(&self.space_id, &channel)
            .await
            .map_err(AnnounceError::Channel)?
            .id;
        info!(channel_id = %channel_id, channel = %name, accessors = channel.accessor_ids.len(), "Channel created");

        let post = NewPost {
            contents: PostContents {
                en_us: Some(PostContent {
                    title: Some(title.clone()),
                    content: Some(render::post_content(&title, &tasks)),
                    teaser: Some(render::build_teaser(
                        &department,
                        target_users.len(),
                        render::earliest_due_date(&tasks),
                    )),
                    kicker: Some(department.clone()),
                }),
            },
        };
        let post_id = match self.client.create_post(&channel_id, &post).await {
            Ok(created) => created.id,
            Err(source) => {
                error!(channel_id = %channel_id, error = %source, "Post creation failed");
                return Err(AnnounceError::Post { channel_id, source });
            }
        };
        info!(channel_id = %channel_id, post_id = %post_id, "Post created");

        let mut distribution = Distribution::default();
        if !tasks.is_empty() {
            let store_ids: Vec<String> = target_users
                .iter()
                .map(|user| user.visible_id.clone())
                .collect();
            match discover_projects(&self.client, &self.space_id, &store_ids).await {
                Ok(projects) if projects.is_empty() => {
                    warn!("No matching project installations found for target stores");
                }
                Ok(projects) => {
                    distribution = self.distribute(&title, &tasks, &projects).await;
                }
                Err(err) => {
                    error!(error = %err, "Project discovery failed; tasks not distributed");
                    distribution.errors.push(TaskError {
                        installation: None,
                        store_id: None,
                        task: None,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(CreateOutcome {
            channel_id,
            post_id,
            task_lists_created: distribution.task_lists_created,
            task_count: distribution.task_count,
            task_errors: distribution.errors,
        })
    }

    /// Members of the operations group; empty when unset or unavailable.
    async fn ops_member_ids(&self) -> Vec<String> {
        let Some(group_id) = self.ops_group_id.as_deref() else {
            return Vec::new();
        };
        match self.client.search_group_members(group_id).await {
            Ok(members) => members.into_iter().map(|member| member.id).collect(),
            Err(err) => {
                warn!(group_id, error = %err, "Could not load ops group members; continuing without them");
                Vec::new()
            }
        }
    }

    /// Fixed-size concurrent batches with a pause between batches.
    async fn distribute(
        &self,
        list_name: &str,
        tasks: &[Task],
        projects: &[ProjectInstallation],
    ) -> Distribution {
        info!(
            projects = projects.len(),
            tasks = tasks.len(),
            batch_size = self.batch_size,
            "Distributing tasks"
        );
        let list_name: Arc<str> = Arc::from(list_name);
        let tasks: Arc<[Task]> = Arc::from(tasks);
        let mut total = Distribution::default();

        for (index, batch) in projects.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.batch_pause).await;
            }

            let mut running = JoinSet::new();
            for project in batch {
                running.spawn(
                    distribute_to_project(
                        self.client.clone(),
                        project.clone(),
                        list_name.clone(),
                        tasks.clone(),
                    )
                    .in_current_span(),
                );
            }
            while let Some(joined) = running.join_next().await {
                match joined {
                    Ok(outcome) => total.absorb(outcome),
                    Err(err) => total.errors.push(TaskError {
                        installation: None,
                        store_id: None,
                        task: None,
                        error: format!("distribution task aborted: {}", err),
                    }),
                }
            }
        }

        info!(
            task_lists_created = total.task_lists_created,
            task_count = total.task_count,
            errors = total.errors.len(),
            "Task distribution finished"
        );
        total
    }
}

/// One task list named after the announcement, then its tasks one by one.
async fn distribute_to_project(
    client: PlatformClient,
    project: ProjectInstallation,
    list_name: Arc<str>,
    tasks: Arc<[Task]>,
) -> Distribution {
    let mut outcome = Distribution::default();
    let record = |task: Option<&str>, error: &PlatformError| TaskError {
        installation: Some(project.installation_id.clone()),
        store_id: Some(project.store_id.clone()),
        task: task.map(str::to_string),
        error: error.to_string(),
    };

    let list_id = match client
        .create_task_list(&project.installation_id, &list_name)
        .await
    {
        Ok(created) => created.id,
        Err(err) => {
            error!(installation = %project.installation_id, error = %err, "Task list creation failed");
            outcome.errors.push(record(None, &err));
            return outcome;
        }
    };
    outcome.task_lists_created = 1;

    for task in tasks.iter() {
        let body = NewTask {
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            status: TASK_STATUS_OPEN.to_string(),
            task_list_id: list_id.clone(),
            assignee_ids: Vec::new(),
            group_ids: Vec::new(),
            priority: TASK_PRIORITY_LOWEST.to_string(),
            attachment_ids: Vec::new(),
            due_date: task.due_date.and_then(|date| end_of_day_utc(date, &Local)),
        };
        match client.create_task(&project.installation_id, &body).await {
            Ok(_) => outcome.task_count += 1,
            Err(err) => {
                error!(
                    installation = %project.installation_id,
                    task = %task.title,
                    error = %err,
                    "Task creation failed"
                );
                outcome.errors.push(record(Some(&task.title), &err));
            }
        }
    }
    outcome
}

/// Deduplicated accessor ids in first-seen order; blank ids are dropped.
pub fn accessor_set<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(str::trim)
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// 23:59:59 of `date` in `tz`, as a UTC RFC 3339 timestamp.
pub fn end_of_day_utc<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<String> {
    let local = date.and_hms_opt(23, 59, 59)?;
    let instant = tz.from_local_datetime(&local).earliest()?;
    Some(
        instant
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Parse a calendar date from `YYYY-MM-DD` or the date part of a timestamp.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()))
}

fn blank_if_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_calendar_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid due date '{}'", raw))),
    }
}
