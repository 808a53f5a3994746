//! Typed endpoint helpers layered over [`PlatformClient::call`].

use reqwest::{
    Method,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde_json::{Value, json};

use super::{
    PlatformClient, PlatformError,
    models::{
        Created, ImportStatus, Installation, NewInstallation, NewPost, NewTask, Page,
        PlatformUser, Post,
    },
};

/// Page size used for every offset-paginated listing.
pub const PAGE_SIZE: usize = 100;

const USER_SEARCH_MEDIA_TYPE: &str = "application/vnd.staffbase.accessors.users-search.v1+json";

fn with_query<V: AsRef<str>>(path: &str, params: &[(&str, V)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}?{}", path, query)
}

/// Percent-encode one path segment. `/` and spaces are escaped; a space
/// becomes `%20`, never `+`.
fn encode_segment(segment: &str) -> String {
    let Ok(mut scratch) = url::Url::parse("http://segment.invalid/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = scratch.path_segments_mut() {
        segments.pop_if_empty().push(segment);
    }
    scratch.path().trim_start_matches('/').to_string()
}

impl PlatformClient {
    /// `GET /users?limit&offset`
    pub async fn list_users(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlatformUser>, PlatformError> {
        let path = with_query(
            "/users",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        );
        let page: Page<PlatformUser> = self.call_as(Method::GET, &path, None).await?;
        Ok(page.data)
    }

    /// `GET /users/{id}`: the full remote profile, passed through untouched.
    pub async fn get_user(&self, user_id: &str) -> Result<Value, PlatformError> {
        self.call(Method::GET, &format!("/users/{}", encode_segment(user_id)), None)
            .await
    }

    /// Members of a group via the accessor user-search endpoint.
    pub async fn search_group_members(
        &self,
        group_id: &str,
    ) -> Result<Vec<PlatformUser>, PlatformError> {
        let filter = format!("groups eq \"{}\"", group_id);
        let path = with_query("/users/search", &[("filter", filter)]);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(USER_SEARCH_MEDIA_TYPE));

        let value = self
            .call_with_headers(Method::GET, &path, None, headers)
            .await?;
        let page: Page<PlatformUser> = serde_json::from_value(value)?;
        Ok(page.data)
    }

    /// `GET /spaces/{space}/installations?limit&offset`
    pub async fn list_installations(
        &self,
        space_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Installation>, PlatformError> {
        let path = with_query(
            &format!("/spaces/{}/installations", encode_segment(space_id)),
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        );
        let page: Page<Installation> = self.call_as(Method::GET, &path, None).await?;
        Ok(page.data)
    }

    /// Every installation in the space, following pages until a short one.
    pub async fn list_all_installations(
        &self,
        space_id: &str,
    ) -> Result<Vec<Installation>, PlatformError> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.list_installations(space_id, PAGE_SIZE, offset).await?;
            let fetched = page.len();
            all.extend(page);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(all)
    }

    /// `POST /spaces/{space}/installations`
    pub async fn create_installation(
        &self,
        space_id: &str,
        installation: &NewInstallation,
    ) -> Result<Created, PlatformError> {
        let body = serde_json::to_value(installation)?;
        self.call_as(
            Method::POST,
            &format!("/spaces/{}/installations", encode_segment(space_id)),
            Some(&body),
        )
        .await
    }

    /// `DELETE /installations/{id}`
    pub async fn delete_installation(&self, installation_id: &str) -> Result<(), PlatformError> {
        self.call(
            Method::DELETE,
            &format!("/installations/{}", encode_segment(installation_id)),
            None,
        )
        .await?;
        Ok(())
    }

    /// `POST /channels/{id}/posts`
    pub async fn create_post(
        &self,
        channel_id: &str,
        post: &NewPost,
    ) -> Result<Created, PlatformError> {
        let body = serde_json::to_value(post)?;
        self.call_as(
            Method::POST,
            &format!("/channels/{}/posts", encode_segment(channel_id)),
            Some(&body),
        )
        .await
    }

    /// Most recent post of a channel, if it has any.
    pub async fn latest_post(&self, channel_id: &str) -> Result<Option<Post>, PlatformError> {
        let path = with_query(
            &format!("/channels/{}/posts", encode_segment(channel_id)),
            &[("limit", "1")],
        );
        let page: Page<Post> = self.call_as(Method::GET, &path, None).await?;
        Ok(page.data.into_iter().next())
    }

    /// `POST /tasks/{installation}/lists`
    pub async fn create_task_list(
        &self,
        installation_id: &str,
        name: &str,
    ) -> Result<Created, PlatformError> {
        self.call_as(
            Method::POST,
            &format!("/tasks/{}/lists", encode_segment(installation_id)),
            Some(&json!({ "name": name })),
        )
        .await
    }

    /// `POST /tasks/{installation}/tasks`
    pub async fn create_task(
        &self,
        installation_id: &str,
        task: &NewTask,
    ) -> Result<Value, PlatformError> {
        let body = serde_json::to_value(task)?;
        self.call(
            Method::POST,
            &format!("/tasks/{}/tasks", encode_segment(installation_id)),
            Some(&body),
        )
        .await
    }

    /// `PATCH /users/imports/{id}/config`
    pub async fn configure_import(
        &self,
        import_id: &str,
        config: &Value,
    ) -> Result<(), PlatformError> {
        self.call(
            Method::PATCH,
            &format!("/users/imports/{}/config", encode_segment(import_id)),
            Some(config),
        )
        .await?;
        Ok(())
    }

    /// `PATCH /users/imports/{id}` with a requested state.
    pub async fn request_import_state(
        &self,
        import_id: &str,
        state: &str,
    ) -> Result<(), PlatformError> {
        self.call(
            Method::PATCH,
            &format!("/users/imports/{}", encode_segment(import_id)),
            Some(&json!({ "state": state })),
        )
        .await?;
        Ok(())
    }

    /// `GET /users/imports/{id}`
    pub async fn import_status(&self, import_id: &str) -> Result<ImportStatus, PlatformError> {
        self.call_as(
            Method::GET,
            &format!("/users/imports/{}", encode_segment(import_id)),
            None,
        )
        .await
    }
}
