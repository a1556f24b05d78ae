//! Worklog server library logic.

pub mod api;
pub mod api_sse;
pub mod broadcast;
pub mod config;
pub mod ingest;
pub mod registry;
pub mod snapshot;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use broadcast::Broadcaster;
use config::{AuthMode, Config};
use ingest::Authenticator;
use registry::ClientRegistry;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use worklog_db::DbPool;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// How ingest requests are authenticated.
    pub authenticator: Authenticator,
    /// Whether submitted tags are normalized before storage.
    pub normalize_tags: bool,
    /// Live viewer mailboxes.
    pub registry: ClientRegistry,
    /// Fanout service feeding the registry.
    pub broadcaster: Arc<Broadcaster>,
    /// Directory holding `index.html` and the viewer assets.
    pub static_dir: PathBuf,
}

impl AppState {
    /// Builds the state and starts the broadcaster.
    ///
    /// Must be called inside a tokio runtime. The configuration is expected
    /// to have passed [`Config::validate`].
    pub fn from_config(pool: DbPool, config: &Config) -> Self {
        let (authenticator, normalize_tags) = match config.auth.mode {
            AuthMode::Users => (Authenticator::Directory, true),
            AuthMode::Shared => (
                Authenticator::SharedSecret(config.auth.token.clone().unwrap_or_default()),
                config.ingest.normalize_tags,
            ),
        };

        let registry = ClientRegistry::new(config.broadcast.mailbox_capacity);
        let broadcaster = Broadcaster::start(registry.clone(), config.broadcast.settings());

        Self {
            pool,
            authenticator,
            normalize_tags,
            registry,
            broadcaster: Arc::new(broadcaster),
            static_dir: config.server.static_dir.clone(),
        }
    }
}

/// Maximum request body size (64 KiB). Updates are short text messages.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/update", post(api::post_update_handler))
        .route("/initial", get(api::get_initial_handler))
        .route("/initial/{username}", get(api::get_user_initial_handler))
        .route("/stream", get(api_sse::get_stream_handler))
        .route("/stream/{username}", get(api_sse::get_user_stream_handler))
        .route("/user/{username}", get(api::user_page_handler));

    // User registration only exists when there is a directory to register in.
    let router = match state.authenticator {
        Authenticator::Directory => router.route("/users", post(api::create_user_handler)),
        Authenticator::SharedSecret(_) => router,
    };

    let static_dir = state.static_dir.clone();
    if static_dir.join("index.html").exists() {
        tracing::info!(path = %static_dir.display(), "serving viewer static files");
    } else {
        tracing::warn!(
            path = %static_dir.display(),
            "index.html not found in static directory, viewer pages will 404"
        );
    }

    router
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
