//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run sequentially
//! on startup, tracked by the `_worklog_migrations` table, and each one runs
//! exactly once.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_users",
        sql: include_str!("migrations/000_users.sql"),
    },
    Migration {
        name: "001_log_entries",
        sql: include_str!("migrations/001_log_entries.sql"),
    },
    Migration {
        name: "002_log_entries_day_index",
        sql: include_str!("migrations/002_log_entries_day_index.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations against the given connection.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// tracking table cannot be queried. A failed migration is rolled back
/// together with its tracking row.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn execution_failed(name: &str) -> impl FnOnce(rusqlite::Error) -> MigrationError {
    let name = name.to_string();
    move |source| MigrationError::ExecutionFailed { name, source }
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _worklog_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(execution_failed("_worklog_migrations_bootstrap"))?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _worklog_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(migration = migration.name, "migration already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let tx = conn
            .unchecked_transaction()
            .map_err(execution_failed(migration.name))?;
        tx.execute_batch(migration.sql)
            .map_err(execution_failed(migration.name))?;
        tx.execute(
            "INSERT INTO _worklog_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(execution_failed(migration.name))?;
        tx.commit().map_err(execution_failed(migration.name))?;

        applied += 1;
    }

    Ok(applied)
}
