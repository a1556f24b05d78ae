//! Shared types and constants for the worklog service.
//!
//! This crate holds the records that cross crate boundaries: the persisted
//! [`Entry`] that flows from the store to the broadcaster and out to viewers,
//! and the [`User`] record issued by the user directory. It has no storage or
//! runtime dependencies so every other crate can depend on it.

use serde::{Deserialize, Serialize};

/// Store-assigned identity of a persisted entry.
pub type EntryId = i64;

/// Header carrying the bearer token on ingest requests.
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Maximum number of entries returned by a day snapshot.
pub const SNAPSHOT_LIMIT: usize = 500;

/// Default capacity of a single viewer's mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

/// Default depth of the broadcaster intake queue.
pub const DEFAULT_INTAKE_CAPACITY: usize = 32;

/// One persisted status update.
///
/// Entries are immutable once stored. Copies are handed by value to the
/// broadcaster and to every viewer mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Monotonically increasing identity assigned by the store.
    pub id: EntryId,
    /// Display name of the owning user, if the entry has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Message text. Never empty.
    pub message: String,
    /// Normalized tags in submission order. Absent rather than empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// RFC 3339 creation time with second precision.
    pub timestamp: String,
}

/// A registered user.
///
/// The token is only populated on the record returned from registration;
/// lookups never expose it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Normalized (trimmed, uppercase) username.
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
