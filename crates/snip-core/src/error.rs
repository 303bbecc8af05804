use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The original URL already has a live mapping. Carries the existing short id.
    #[error("url is already shortened as {0}")]
    Conflict(String),
    /// The proposed short id is already in use; the caller should generate another one.
    #[error("short id already exists: {0}")]
    ShortIdTaken(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage initialization failed: {0}")]
    Initialization(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}
