//! # Server Configuration
//!
//! Router, shared state and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::announce::Distributor;
use crate::config::AppConfig;
use crate::directory::{Clock, DirectoryCache, SystemClock};
use crate::error::{ApiError, not_found};
use crate::handlers::{self, announcements, users};
use crate::history::HistoryQuery;
use crate::import::{ImportOrchestrator, ImportPolicy};
use crate::platform::{PlatformClient, PlatformError};
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: PlatformClient,
    pub directory: Arc<DirectoryCache>,
    pub importer: Arc<ImportOrchestrator>,
    pub distributor: Arc<Distributor>,
    pub history: Arc<HistoryQuery>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, PlatformError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build every component from `config`, with `clock` driving cache expiry.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, PlatformError> {
        let client = PlatformClient::from_config(&config)?;
        let platform = &config.platform;

        let directory = Arc::new(DirectoryCache::new(
            client.clone(),
            platform.hidden_attribute_key.clone(),
            Duration::from_secs(config.directory.ttl_seconds),
            clock,
        ));
        let importer = Arc::new(ImportOrchestrator::new(
            client.clone(),
            platform.hidden_attribute_key.clone(),
            ImportPolicy::from(&config.import),
        ));
        let distributor = Arc::new(Distributor::new(
            client.clone(),
            platform,
            &config.distribution,
        ));
        let history = Arc::new(HistoryQuery::new(
            client.clone(),
            directory.clone(),
            platform.space_id.clone(),
            platform.studio_base(),
        ));

        Ok(Self {
            config: Arc::new(config),
            client,
            directory,
            importer,
            distributor,
            history,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::public_config))
        .route("/verify-users", post(users::verify_users))
        .route("/user/{store_id}", get(users::get_user))
        .route("/upload-users", post(users::upload_users))
        .route("/merge-fields", post(users::merge_fields))
        .route("/directory/refresh", post(users::refresh_directory))
        .route("/create", post(announcements::create))
        .route("/items", get(announcements::list_items))
        .route("/delete/{id}", delete(announcements::delete_channel))
        .fallback(api_not_found);

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn api_not_found() -> ApiError {
    not_found("Route not found")
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(config: AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = config.bind_addr().context("invalid server address")?;
    let profile = config.profile.clone();

    let state = AppState::new(config).context("failed to build platform client")?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::public_config,
        crate::handlers::users::verify_users,
        crate::handlers::users::get_user,
        crate::handlers::users::upload_users,
        crate::handlers::users::merge_fields,
        crate::handlers::users::refresh_directory,
        crate::handlers::announcements::create,
        crate::handlers::announcements::list_items,
        crate::handlers::announcements::delete_channel,
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::error::ProviderError,
            crate::handlers::HealthResponse,
            crate::handlers::PublicConfig,
            crate::handlers::users::VerifyUsersRequest,
            crate::handlers::users::VerifyUsersResponse,
            crate::handlers::users::UploadUsersRequest,
            crate::handlers::users::MergeFieldsRequest,
            crate::handlers::users::MergeFieldsResponse,
            crate::handlers::users::DirectoryRefreshResponse,
            crate::handlers::announcements::CreateRequest,
            crate::handlers::announcements::CreateResponse,
            crate::handlers::announcements::ItemsResponse,
            crate::handlers::announcements::DeleteResponse,
            crate::directory::DirectoryEntry,
            crate::merge::MergeField,
            crate::import::ImportResult,
            crate::announce::Task,
            crate::announce::TaskError,
            crate::history::HistoryItem,
            crate::history::PostStatus,
        )
    ),
    tags(
        (name = "system", description = "Health and public configuration"),
        (name = "users", description = "Store directory and profile imports"),
        (name = "announcements", description = "Announcements and task distribution"),
    ),
    info(
        title = "Store Communications API",
        description = "Store announcements, task distribution and profile imports",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
