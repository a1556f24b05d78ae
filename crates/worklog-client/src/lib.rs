//! Command-line poster for the worklog server.
//!
//! Builds one `POST /update` request from a message and an optional
//! comma-separated tag list and sends it with the bearer token.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use worklog_types::AUTH_HEADER;

/// Whole-request timeout, connect included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable consulted when `--token` is not given.
pub const TOKEN_ENV: &str = "AUTH_TOKEN";

const USER_AGENT: &str = concat!("worklog-client/", env!("CARGO_PKG_VERSION"));

/// Errors produced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("token must be provided via --token or the AUTH_TOKEN environment variable")]
    MissingToken,
    #[error("message cannot be empty, provide it with -m")]
    EmptyMessage,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Body of `POST /update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateRequest {
    /// Validates the message and splits `tags`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::EmptyMessage` for an empty message.
    pub fn new(message: String, tags: Option<&str>) -> Result<Self, ClientError> {
        if message.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        Ok(Self {
            message,
            tags: tags.and_then(split_tags),
        })
    }
}

/// Splits a comma-separated tag list, trimming each tag and skipping blanks.
///
/// Returns `None` when nothing is left.
pub fn split_tags(raw: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();
    (!tags.is_empty()).then_some(tags)
}

/// Picks the explicit token, else the environment value. Blank counts as unset.
///
/// # Errors
///
/// Returns `ClientError::MissingToken` when neither is set.
pub fn resolve_token(flag: Option<String>, env: Option<String>) -> Result<String, ClientError> {
    flag.filter(|t| !t.is_empty())
        .or_else(|| env.filter(|t| !t.is_empty()))
        .ok_or(ClientError::MissingToken)
}

/// `http://{addr}/update`. A bare `:port` targets localhost.
pub fn update_url(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("http://localhost{}/update", addr)
    } else {
        format!("http://{}/update", addr)
    }
}

/// Response from the server, status plus raw body text.
#[derive(Debug, Clone)]
pub struct UpdateResponse {
    pub status: reqwest::StatusCode,
    pub body: String,
}

/// Sends one update.
///
/// Non-2xx responses are returned, not turned into errors, so the caller
/// can report the server's message.
///
/// # Errors
///
/// Returns `ClientError::Http` on connection failure or timeout.
pub async fn send_update(
    addr: &str,
    token: &str,
    request: &UpdateRequest,
) -> Result<UpdateResponse, ClientError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;

    let url = update_url(addr);
    tracing::debug!(%url, "posting update");

    let response = client
        .post(&url)
        .header(AUTH_HEADER, token)
        .json(request)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    Ok(UpdateResponse { status, body })
}
