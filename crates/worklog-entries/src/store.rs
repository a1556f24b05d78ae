//! Persistence operations for the entry log.
//!
//! All writes go through [`append`], a single INSERT that either stores the
//! row and returns its id or fails without leaving anything behind. Reads go
//! through [`query_day`], bounded to one calendar day and
//! [`SNAPSHOT_LIMIT`] rows.

use chrono::{Local, NaiveDate, SecondsFormat};
use rusqlite::{params, Connection, Row};
use worklog_types::{Entry, EntryId, SNAPSHOT_LIMIT};

use crate::error::EntryError;
use crate::tags::{decode_tags, encode_tags};

/// A new entry ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub message: String,
    /// Already-normalized tags.
    pub tags: Option<Vec<String>>,
    /// RFC 3339 timestamp, see [`now_timestamp`].
    pub timestamp: String,
    /// Owning user, if any.
    pub user_id: Option<i64>,
}

/// Current local time as an RFC 3339 string with second precision.
///
/// The first ten characters are the local calendar date, which is what the
/// day queries match on.
pub fn now_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Persists one entry and returns its assigned id.
///
/// Ids come from an AUTOINCREMENT key, so they increase across the whole
/// store and are never reused, even after rows are removed out of band.
///
/// # Errors
///
/// Returns `EntryError::Storage` on constraint violation (for example an
/// unknown `user_id`) or I/O failure.
pub fn append(conn: &Connection, entry: &NewEntry) -> Result<EntryId, EntryError> {
    let id = conn.query_row(
        "INSERT INTO log_entries (user_id, message, tags, ts)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id",
        params![
            entry.user_id,
            entry.message,
            encode_tags(entry.tags.as_deref()),
            entry.timestamp,
        ],
        |row| row.get(0),
    )?;

    tracing::debug!(entry_id = id, user_id = ?entry.user_id, "appended entry");
    Ok(id)
}

/// Returns today's entries (local calendar day), oldest first.
///
/// See [`query_day`] for filtering and limits.
///
/// # Errors
///
/// Returns `EntryError::Storage` on SQL failure.
pub fn query_today(conn: &Connection, username: Option<&str>) -> Result<Vec<Entry>, EntryError> {
    query_day(conn, Local::now().date_naive(), username)
}

/// Returns the entries stamped on `day`, oldest first, capped at
/// [`SNAPSHOT_LIMIT`] rows.
///
/// With `username`, only that user's entries are returned (inner join on
/// `users`; ownerless entries are excluded). Without it, all entries are
/// returned and ownerless ones carry no username. The username is matched
/// exactly; callers normalize it first.
///
/// # Errors
///
/// Returns `EntryError::Storage` on SQL failure.
pub fn query_day(
    conn: &Connection,
    day: NaiveDate,
    username: Option<&str>,
) -> Result<Vec<Entry>, EntryError> {
    let day = day.format("%Y-%m-%d").to_string();
    let limit = SNAPSHOT_LIMIT as i64;

    let entries = match username {
        Some(username) => {
            let mut stmt = conn.prepare_cached(
                "SELECT le.id, u.username, le.message, le.tags, le.ts
                 FROM log_entries le
                 JOIN users u ON le.user_id = u.id
                 WHERE u.username = ?1 AND substr(le.ts, 1, 10) = ?2
                 ORDER BY le.ts ASC, le.id ASC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![username, day, limit], map_row_to_entry)?;
            let entries = rows.collect::<Result<Vec<_>, _>>()?;
            entries
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT le.id, u.username, le.message, le.tags, le.ts
                 FROM log_entries le
                 LEFT JOIN users u ON le.user_id = u.id
                 WHERE substr(le.ts, 1, 10) = ?1
                 ORDER BY le.ts ASC, le.id ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![day, limit], map_row_to_entry)?;
            let entries = rows.collect::<Result<Vec<_>, _>>()?;
            entries
        }
    };

    Ok(entries)
}

/// Total number of persisted entries.
///
/// # Errors
///
/// Returns `EntryError::Storage` on SQL failure.
pub fn count_entries(conn: &Connection) -> Result<i64, EntryError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))?)
}

fn map_row_to_entry(row: &Row) -> rusqlite::Result<Entry> {
    let tags: Option<String> = row.get(3)?;
    Ok(Entry {
        id: row.get(0)?,
        username: row.get(1)?,
        message: row.get(2)?,
        tags: decode_tags(tags.as_deref()),
        timestamp: row.get(4)?,
    })
}
