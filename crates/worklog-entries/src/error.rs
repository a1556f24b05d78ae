//! Error types for the entry log.

/// Errors that can occur during entry log operations.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    /// A database operation failed (I/O, constraint, or query failure).
    #[error("entry storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
