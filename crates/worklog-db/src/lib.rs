//! Database layer for the worklog service.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. The `users` and `log_entries` tables are
//! created through versioned migrations managed by this crate.
//!
//! WAL mode lets snapshot readers proceed while an ingest request writes,
//! and SQLite's own transactions are the only synchronization around the
//! entry table: no in-process lock is held across a storage call.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
