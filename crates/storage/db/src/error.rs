use thiserror::Error;

/// Errors surfaced by a key-value store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// A point read failed.
    #[error("database read failed: {0}")]
    Read(String),
    /// A batch write failed.
    #[error("database write failed: {0}")]
    Write(String),
    /// The backend is unavailable.
    #[error("database backend error: {0}")]
    Backend(String),
}
