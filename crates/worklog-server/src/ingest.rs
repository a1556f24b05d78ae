//! Ingest pipeline: authenticate, validate, persist, publish.
//!
//! Authentication and validation both run before any storage call, so a
//! rejected request never leaves a row behind. The append and the publish run
//! together on a blocking thread, which finishes even if the caller goes away,
//! so every committed entry is offered to live viewers. Publishing never fails
//! the request.

use crate::AppState;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use worklog_entries::{append, normalize_tags, now_timestamp, NewEntry};
use worklog_identity::{lookup_by_token, DirectoryError};
use worklog_types::{Entry, User};

/// How ingest requests prove who they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authenticator {
    /// One secret shared by every client; entries have no owner.
    SharedSecret(String),
    /// Per-user tokens resolved through the user directory.
    Directory,
}

/// Errors produced by [`submit`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or unrecognized token.
    #[error("{0}")]
    Unauthorized(String),
    /// Malformed body or empty message.
    #[error("{0}")]
    Validation(String),
    /// The entry could not be persisted.
    #[error("{0}")]
    Storage(String),
}

/// Body of `POST /update`.
#[derive(Debug, Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Accepts one status update and returns the persisted entry.
///
/// # Errors
///
/// - `IngestError::Unauthorized` if `token` is missing or unknown.
/// - `IngestError::Validation` if the body is not a valid update or the
///   message is empty.
/// - `IngestError::Storage` if the append fails.
pub async fn submit(
    state: &AppState,
    token: Option<&str>,
    body: &[u8],
) -> Result<Entry, IngestError> {
    let owner = authenticate(state, token).await?;

    let request: UpdateRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("rejecting malformed update body: {}", e);
        IngestError::Validation("bad request".to_string())
    })?;

    if request.message.is_empty() {
        return Err(IngestError::Validation("empty message".to_string()));
    }

    let tags = if state.normalize_tags {
        normalize_tags(request.tags)
    } else {
        request.tags.filter(|tags| !tags.is_empty())
    };

    let new_entry = NewEntry {
        message: request.message,
        tags,
        timestamp: now_timestamp(),
        user_id: owner.as_ref().map(|user| user.id),
    };
    let username = owner.map(|user| user.username);

    let pool = state.pool.clone();
    let broadcaster = Arc::clone(&state.broadcaster);
    let entry = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| IngestError::Storage(format!("db connection failed: {}", e)))?;

        let id = append(&conn, &new_entry).map_err(|e| {
            tracing::error!("failed to insert update: {}", e);
            IngestError::Storage("failed to insert update".to_string())
        })?;

        let entry = Entry {
            id,
            username,
            message: new_entry.message,
            tags: new_entry.tags,
            timestamp: new_entry.timestamp,
        };
        tracing::info!(
            entry_id = entry.id,
            username = entry.username.as_deref().unwrap_or("-"),
            "accepted update"
        );

        broadcaster.publish(entry.clone());
        Ok::<_, IngestError>(entry)
    })
    .await
    .map_err(|e| IngestError::Storage(format!("task join error: {}", e)))??;

    Ok(entry)
}

/// Resolves the caller. Shared-secret mode has no owner.
async fn authenticate(state: &AppState, token: Option<&str>) -> Result<Option<User>, IngestError> {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err(IngestError::Unauthorized(
                "authentication token required".to_string(),
            ))
        }
    };

    match &state.authenticator {
        Authenticator::SharedSecret(secret) => {
            if token == secret.as_str() {
                Ok(None)
            } else {
                Err(IngestError::Unauthorized("invalid token".to_string()))
            }
        }
        Authenticator::Directory => {
            let pool = state.pool.clone();
            let token = token.to_string();
            let user = tokio::task::spawn_blocking(move || {
                let conn = pool
                    .get()
                    .map_err(|e| IngestError::Storage(format!("db connection failed: {}", e)))?;
                lookup_by_token(&conn, &token).map_err(|e| match e {
                    DirectoryError::Unauthorized => {
                        IngestError::Unauthorized("invalid token".to_string())
                    }
                    other => IngestError::Storage(other.to_string()),
                })
            })
            .await
            .map_err(|e| IngestError::Storage(format!("task join error: {}", e)))??;
            Ok(Some(user))
        }
    }
}
