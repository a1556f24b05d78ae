//! User creation and lookup against the `users` table.

use chrono::{Local, SecondsFormat};
use rusqlite::{ffi, params, Connection, OptionalExtension};
use worklog_types::User;

use crate::token::generate_token;
use crate::DirectoryError;

/// Trims surrounding whitespace and uppercases.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Creates a user and returns it together with its freshly generated token.
///
/// The returned token is the caller's only copy; later lookups never expose
/// it. Duplicate usernames are detected by the table's UNIQUE constraint at
/// insert time rather than by a prior SELECT, so two concurrent registrations
/// of the same name cannot both succeed.
///
/// # Errors
///
/// - `DirectoryError::InvalidUsername` if the name is blank.
/// - `DirectoryError::Conflict` if the normalized name is taken.
/// - `DirectoryError::Database` for any other storage failure.
pub fn create_user(conn: &Connection, username: &str) -> Result<User, DirectoryError> {
    let username = normalize_username(username);
    if username.is_empty() {
        return Err(DirectoryError::InvalidUsername);
    }

    let token = generate_token();
    let created_at = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let id = conn
        .query_row(
            "INSERT INTO users (username, token, created_at)
             VALUES (?1, ?2, ?3)
             RETURNING id",
            params![username, token, created_at],
            |row| row.get(0),
        )
        .map_err(|e| {
            if is_username_conflict(&e) {
                DirectoryError::Conflict(username.clone())
            } else {
                DirectoryError::Database(e)
            }
        })?;

    tracing::info!(user_id = id, username = %username, "created user");

    Ok(User {
        id,
        username,
        token: Some(token),
    })
}

/// Resolves the user holding `token`.
///
/// # Errors
///
/// Returns `DirectoryError::Unauthorized` when no user matches.
pub fn lookup_by_token(conn: &Connection, token: &str) -> Result<User, DirectoryError> {
    conn.query_row(
        "SELECT id, username FROM users WHERE token = ?1",
        [token],
        map_row_to_user,
    )
    .optional()?
    .ok_or(DirectoryError::Unauthorized)
}

/// Resolves a user by name. The name is normalized first.
///
/// # Errors
///
/// Returns `DirectoryError::NotFound` when no user matches.
pub fn lookup_by_username(conn: &Connection, username: &str) -> Result<User, DirectoryError> {
    let username = normalize_username(username);
    let user = conn
        .query_row(
            "SELECT id, username FROM users WHERE username = ?1",
            [username.as_str()],
            map_row_to_user,
        )
        .optional()?;
    user.ok_or(DirectoryError::NotFound(username))
}

fn map_row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        token: None,
    })
}

fn is_username_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                && message
                    .as_deref()
                    .is_some_and(|m| m.contains("users.username"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_username("  alice "), "ALICE");
        assert_eq!(normalize_username("Bob"), "BOB");
        assert_eq!(normalize_username("   "), "");
    }
}
