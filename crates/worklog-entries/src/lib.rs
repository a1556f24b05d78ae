//! Append-only entry log for the worklog service.
//!
//! Every status update is written once through [`append`] and read back
//! through the day-scoped queries [`query_today`] and [`query_day`]. Rows are
//! never updated or deleted.
//!
//! Tags travel as an ordered list in memory and as a single comma-joined
//! column on disk. An empty column reads back as absent tags, never as an
//! empty list.
//!
//! ```rust,ignore
//! use worklog_entries::{append, normalize_tags, query_today, NewEntry};
//!
//! let id = append(&conn, &NewEntry {
//!     message: "shipped the release".into(),
//!     tags: normalize_tags(Some(vec!["  release notes ".into()])),
//!     timestamp: worklog_entries::now_timestamp(),
//!     user_id: Some(user.id),
//! })?;
//! let today = query_today(&conn, None)?;
//! ```

mod error;
mod store;
mod tags;

pub use error::EntryError;
pub use store::{append, count_entries, now_timestamp, query_day, query_today, NewEntry};
pub use tags::{decode_tags, encode_tags, normalize_tags};
