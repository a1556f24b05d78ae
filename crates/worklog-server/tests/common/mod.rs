#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
};
use serde_json::Value;
use std::path::Path;
use worklog_db::{create_pool, run_migrations, DbRuntimeSettings};
use worklog_server::config::{AuthMode, Config};
use worklog_server::AppState;
use worklog_types::{User, AUTH_HEADER};

/// Users-mode state over a fresh in-memory database.
pub fn users_state() -> AppState {
    state_with(Config::default())
}

/// Shared-secret state over a fresh in-memory database.
pub fn shared_state(token: &str, normalize_tags: bool) -> AppState {
    let mut config = Config::default();
    config.auth.mode = AuthMode::Shared;
    config.auth.token = Some(token.to_string());
    config.ingest.normalize_tags = normalize_tags;
    state_with(config)
}

pub fn state_with(config: Config) -> AppState {
    config.validate().expect("test config should be valid");
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    AppState::from_config(pool, &config)
}

/// Same as `users_state` but serving `static_dir`.
pub fn users_state_serving(static_dir: &Path) -> AppState {
    let mut config = Config::default();
    config.server.static_dir = static_dir.to_path_buf();
    state_with(config)
}

pub fn register_user(state: &AppState, username: &str) -> User {
    let conn = state.pool.get().unwrap();
    worklog_identity::create_user(&conn, username).unwrap()
}

pub fn entry_count(state: &AppState) -> i64 {
    let conn = state.pool.get().unwrap();
    worklog_entries::count_entries(&conn).unwrap()
}

pub fn post_update(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/update")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTH_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
