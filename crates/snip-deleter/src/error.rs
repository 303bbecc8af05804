use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeleteError {
    #[error("delete queue is full")]
    Full,
    #[error("delete manager has stopped")]
    Closed,
}
