use snip_core::StorageError;
use snip_deleter::DeleteError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("url is already shortened as {0}")]
    UrlConflict(String),
    #[error("no free id after {attempts} attempts")]
    IdExhausted { attempts: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("short url has been deleted: {0}")]
    Gone(String),
    #[error("delete queue error: {0}")]
    Queue(#[from] DeleteError),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(short_id) => Self::UrlConflict(short_id),
            StorageError::NotFound(message) => Self::NotFound(message),
            other => Self::Storage(other),
        }
    }
}
