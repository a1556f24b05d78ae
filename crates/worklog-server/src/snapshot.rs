//! Day-scoped backlog reads.

use crate::api::ApiError;
use crate::AppState;
use worklog_entries::query_today;
use worklog_identity::normalize_username;
use worklog_types::Entry;

/// Returns today's entries oldest first, optionally for one user.
///
/// The username is normalized the same way the directory stores it, so
/// `/initial/alice` and `/initial/ALICE` read the same rows. An unknown user
/// yields an empty list.
///
/// # Errors
///
/// Returns `ApiError::InternalServerError` if the store cannot be read.
pub async fn snapshot(state: &AppState, username: Option<String>) -> Result<Vec<Entry>, ApiError> {
    let username = username
        .map(|name| normalize_username(&name))
        .filter(|name| !name.is_empty());

    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        query_today(&conn, username.as_deref()).map_err(|e| {
            tracing::error!(username = ?username, "snapshot query failed: {}", e);
            ApiError::InternalServerError("database error".to_string())
        })
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}
