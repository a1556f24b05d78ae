//! User directory for the multi-user worklog.
//!
//! Maps opaque bearer tokens to users. A user is created once through
//! [`create_user`], which is also the only time its token is ever returned;
//! after that the directory answers lookups by token (for ingest
//! authentication) and by username (for per-user views).
//!
//! Usernames are normalized (trimmed, uppercased) on every entry point, so
//! `"alice"` and `" ALICE "` name the same user.

mod directory;
mod token;

pub use directory::{create_user, lookup_by_token, lookup_by_username, normalize_username};
pub use token::{generate_token, TOKEN_BYTES};

use thiserror::Error;

/// Errors produced by user directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The username is empty after normalization.
    #[error("username required")]
    InvalidUsername,
    /// A user with the same normalized username already exists.
    #[error("username already exists: {0}")]
    Conflict(String),
    /// No user holds the presented token.
    #[error("invalid token")]
    Unauthorized,
    /// No user has the requested username.
    #[error("user not found: {0}")]
    NotFound(String),
    /// The store failed for a reason not classified above.
    #[error("directory storage error: {0}")]
    Database(#[from] rusqlite::Error),
}
