//! # User Directory Handlers
//!
//! Store lookup against the directory cache, merge-field preparation and the
//! CSV bulk import of profile data.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use utoipa::ToSchema;

use super::parse_store_ids;
use crate::directory::DirectoryEntry;
use crate::error::{ApiError, ValidationError, not_found};
use crate::import::ImportResult;
use crate::merge::{self, MergeField};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUsersRequest {
    /// Store identifiers, as strings or numbers
    #[schema(value_type = Vec<String>)]
    pub store_ids: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUsersResponse {
    pub found_users: Vec<DirectoryEntry>,
    pub not_found_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadUsersRequest {
    #[serde(default)]
    pub csv_content: String,
    /// Profile field id to CSV column name
    #[serde(default)]
    #[schema(value_type = Object)]
    pub field_mappings: Map<String, Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeFieldsRequest {
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    /// Optional suffix for every non-key field id, e.g. `2026-10`
    #[serde(default)]
    pub date_stamp: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeFieldsResponse {
    pub fields: Vec<MergeField>,
    pub csv_content: String,
    #[schema(value_type = Object)]
    pub field_mappings: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRefreshResponse {
    pub entries: usize,
    pub built_at: DateTime<Utc>,
}

/// Partition store ids into known directory users and unknown ids
#[utoipa::path(
    post,
    path = "/api/verify-users",
    request_body = VerifyUsersRequest,
    responses(
        (status = 200, description = "Store ids resolved", body = VerifyUsersResponse),
        (status = 400, description = "storeIds is not an array", body = ApiError)
    ),
    tag = "users"
)]
pub async fn verify_users(
    State(state): State<AppState>,
    payload: Result<Json<VerifyUsersRequest>, JsonRejection>,
) -> Result<Json<VerifyUsersResponse>, ApiError> {
    let Json(request) = payload?;
    let store_ids = request
        .store_ids
        .as_ref()
        .ok_or(ValidationError::InvalidStoreIds)
        .and_then(parse_store_ids)?;

    let resolution = state.directory.resolve_all(&store_ids).await;
    info!(
        requested = store_ids.len(),
        found = resolution.found.len(),
        not_found = resolution.not_found.len(),
        "Verified store ids"
    );

    Ok(Json(VerifyUsersResponse {
        found_users: resolution.found,
        not_found_ids: resolution.not_found,
    }))
}

/// Full platform profile of the user behind a store id
#[utoipa::path(
    get,
    path = "/api/user/{store_id}",
    params(("store_id" = String, Path, description = "Visible store identifier")),
    responses(
        (status = 200, description = "Platform user profile", body = serde_json::Value),
        (status = 404, description = "Unknown store", body = ApiError),
        (status = 502, description = "Platform error", body = ApiError)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let entry = state
        .directory
        .resolve(&store_id)
        .await
        .ok_or_else(|| not_found(&format!("Store {} not found", store_id.trim())))?;

    Ok(Json(state.client.get_user(&entry.id).await?))
}

/// Upload a CSV and drive the delta import to completion
#[utoipa::path(
    post,
    path = "/api/upload-users",
    request_body = UploadUsersRequest,
    responses(
        (status = 200, description = "Import finished or still processing", body = ImportResult),
        (status = 400, description = "Empty CSV", body = ApiError),
        (status = 502, description = "Import or platform failure", body = ApiError)
    ),
    tag = "users"
)]
pub async fn upload_users(
    State(state): State<AppState>,
    payload: Result<Json<UploadUsersRequest>, JsonRejection>,
) -> Result<Json<ImportResult>, ApiError> {
    let Json(request) = payload?;
    if request.csv_content.trim().is_empty() {
        return Err(ValidationError::EmptyCsv.into());
    }

    let result = state
        .importer
        .import_users(&request.csv_content, &request.field_mappings)
        .await?;
    Ok(Json(result))
}

/// Derive merge fields and the import CSV from parsed spreadsheet cells
#[utoipa::path(
    post,
    path = "/api/merge-fields",
    request_body = MergeFieldsRequest,
    responses(
        (status = 200, description = "Merge fields derived", body = MergeFieldsResponse),
        (status = 400, description = "No header row", body = ApiError)
    ),
    tag = "users"
)]
pub async fn merge_fields(
    State(state): State<AppState>,
    payload: Result<Json<MergeFieldsRequest>, JsonRejection>,
) -> Result<Json<MergeFieldsResponse>, ApiError> {
    let Json(request) = payload?;
    if request.headers.first().is_none_or(|key| key.trim().is_empty()) {
        return Err(ValidationError::Field {
            field: "headers",
            reason: "the first column must name the store identifier".to_string(),
        }
        .into());
    }

    let fields = merge::derive_merge_fields(
        &request.headers,
        &request.rows,
        &state.config.platform.hidden_attribute_key,
        request.date_stamp.as_deref(),
    );
    let csv_content = merge::build_csv(&fields, &request.rows);
    let field_mappings = merge::field_mappings(&fields)
        .into_iter()
        .map(|(field, target)| (field, Value::String(target)))
        .collect();

    Ok(Json(MergeFieldsResponse {
        fields,
        csv_content,
        field_mappings,
    }))
}

/// Rebuild the directory snapshot now
#[utoipa::path(
    post,
    path = "/api/directory/refresh",
    responses(
        (status = 200, description = "Snapshot rebuilt", body = DirectoryRefreshResponse)
    ),
    tag = "users"
)]
pub async fn refresh_directory(State(state): State<AppState>) -> Json<DirectoryRefreshResponse> {
    let snapshot = state.directory.refresh().await;
    Json(DirectoryRefreshResponse {
        entries: snapshot.entry_count(),
        built_at: snapshot.built_at(),
    })
}
