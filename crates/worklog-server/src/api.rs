//! API handlers for the worklog server.

use crate::ingest::{self, Authenticator, IngestError};
use crate::snapshot::snapshot;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Extension, Path, Request},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use worklog_identity::{create_user, lookup_by_username, DirectoryError};
use worklog_types::{Entry, User, AUTH_HEADER};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            IngestError::Validation(msg) => ApiError::BadRequest(msg),
            IngestError::Storage(msg) => ApiError::InternalServerError(msg),
        }
    }
}

/// Handler for `POST /update`.
///
/// The body is taken as raw bytes so the token is checked before the JSON
/// is parsed.
pub async fn post_update_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Entry>), ApiError> {
    let token = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok());
    let entry = ingest::submit(&state, token, &body).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Handler for `GET /initial`.
pub async fn get_initial_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    Ok(Json(snapshot(&state, None).await?))
}

/// Handler for `GET /initial/{username}`.
pub async fn get_user_initial_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    Ok(Json(snapshot(&state, Some(username)).await?))
}

/// Handler for `POST /users`. Only routed in users mode.
pub async fn create_user_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let payload: CreateUserRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("bad request".to_string()))?;

    let pool = state.pool.clone();
    let user = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;

        create_user(&conn, &payload.username).map_err(|e| match e {
            DirectoryError::InvalidUsername => {
                ApiError::BadRequest("username required".to_string())
            }
            DirectoryError::Conflict(_) => {
                ApiError::Conflict("username already exists".to_string())
            }
            other => {
                tracing::error!("failed to create user: {}", other);
                ApiError::InternalServerError("failed to create user".to_string())
            }
        })
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for `GET /user/{username}`.
///
/// Serves the viewer page for a known user; the page itself reads
/// `/initial/{username}` and filters the live stream.
pub async fn user_page_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    if !matches!(state.authenticator, Authenticator::Directory) {
        return Err(ApiError::NotFound("user not found".to_string()));
    }

    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;

        lookup_by_username(&conn, &username).map_err(|e| match e {
            DirectoryError::NotFound(_) => ApiError::NotFound("user not found".to_string()),
            other => {
                tracing::error!("user lookup failed: {}", other);
                ApiError::InternalServerError("database error".to_string())
            }
        })
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))??;

    let index = state.static_dir.join("index.html");
    match ServeFile::new(index).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(never) => match never {},
    }
}
