//! # Announcement Handlers
//!
//! Creating announcements with their task distribution, listing past ones
//! and deleting a channel.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::header::CACHE_CONTROL,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;

use super::{Encoded, parse_store_ids};
use crate::announce::{AnnouncementRequest, Task, TaskError};
use crate::directory::DirectoryEntry;
use crate::error::ApiError;
use crate::history::{HistoryFilter, HistoryItem};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Stores already verified through `/api/verify-users`
    #[serde(default)]
    #[schema(value_type = Option<Vec<DirectoryEntry>>)]
    pub verified_users: Option<Encoded<Vec<DirectoryEntry>>>,
    /// Fallback when `verifiedUsers` is empty: resolved through the directory
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    pub store_ids: Option<Value>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<Task>>)]
    pub tasks: Option<Encoded<Vec<Task>>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub success: bool,
    pub channel_id: String,
    pub post_id: String,
    pub task_lists_created: usize,
    pub task_count: usize,
    /// Per-store task failures; absent when everything was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_errors: Option<Vec<TaskError>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemsResponse {
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Create an announcement channel and distribute its tasks
#[utoipa::path(
    post,
    path = "/api/create",
    request_body = CreateRequest,
    responses(
        (status = 200, description = "Channel and post created; task failures listed", body = CreateResponse),
        (status = 400, description = "Missing title or no resolvable stores", body = ApiError),
        (status = 502, description = "Channel or post creation failed", body = ApiError)
    ),
    tag = "announcements"
)]
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError> {
    let Json(request) = payload?;

    let mut target_users = request
        .verified_users
        .and_then(Encoded::decode)
        .unwrap_or_default();
    if target_users.is_empty()
        && let Some(raw_ids) = request.store_ids.as_ref()
    {
        let store_ids = parse_store_ids(raw_ids)?;
        let resolution = state.directory.resolve_all(&store_ids).await;
        info!(
            requested = store_ids.len(),
            resolved = resolution.found.len(),
            "Resolved store ids for announcement"
        );
        target_users = resolution.found;
    }

    let outcome = state
        .distributor
        .create_and_distribute(AnnouncementRequest {
            target_users,
            title: request.title,
            department: request.department,
            tasks: request
                .tasks
                .and_then(Encoded::decode)
                .unwrap_or_default(),
        })
        .await?;

    Ok(Json(CreateResponse {
        success: true,
        channel_id: outcome.channel_id,
        post_id: outcome.post_id,
        task_lists_created: outcome.task_lists_created,
        task_count: outcome.task_count,
        task_errors: (!outcome.task_errors.is_empty()).then_some(outcome.task_errors),
    }))
}

/// Past announcements, newest first
#[utoipa::path(
    get,
    path = "/api/items",
    params(HistoryFilter),
    responses(
        (status = 200, description = "Matching announcements", body = ItemsResponse)
    ),
    tag = "announcements"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> impl IntoResponse {
    let items = state.history.list_items(&filter).await;
    (
        [(CACHE_CONTROL, "no-store")],
        Json(ItemsResponse { items }),
    )
}

/// Delete an announcement channel
#[utoipa::path(
    delete,
    path = "/api/delete/{id}",
    params(("id" = String, Path, description = "Channel installation id")),
    responses(
        (status = 200, description = "Channel deleted", body = DeleteResponse),
        (status = 502, description = "Platform error", body = ApiError)
    ),
    tag = "announcements"
)]
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.client.delete_installation(&id).await?;
    info!(channel_id = %id, "Channel deleted");
    Ok(Json(DeleteResponse { success: true }))
}
