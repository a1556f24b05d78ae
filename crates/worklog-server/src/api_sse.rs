//! SSE live entry stream handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::{sse::Event, Sse},
};
use futures_util::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::StreamExt;
use worklog_identity::normalize_username;
use worklog_types::Entry;

/// Handler for `GET /stream`.
///
/// Streams every entry persisted after the connection opened. Earlier
/// entries come from `/initial`.
pub async fn get_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    entry_stream(&state, None)
}

/// Handler for `GET /stream/{username}`.
///
/// Same as `/stream`, restricted to entries owned by `username`.
pub async fn get_user_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(username): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    entry_stream(&state, Some(normalize_username(&username)))
}

fn entry_stream(
    state: &AppState,
    owner: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Dropping the stream on disconnect drops the subscription, which
    // unregisters the mailbox.
    let subscription = state.registry.register();
    tracing::debug!(mailbox_id = subscription.id(), owner = ?owner, "live viewer connected");

    let mapped_stream = subscription.filter_map(move |entry: Entry| {
        if let Some(owner) = &owner {
            if entry.username.as_deref() != Some(owner.as_str()) {
                return None;
            }
        }
        match serde_json::to_string(&entry) {
            Ok(data) => Some(Ok(Event::default().data(data))),
            Err(e) => {
                tracing::error!(entry_id = entry.id, "failed to serialize entry: {}", e);
                None
            }
        }
    });

    Sse::new(mapped_stream).keep_alive(axum::response::sse::KeepAlive::default())
}
