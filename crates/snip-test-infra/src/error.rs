use std::result::Result as StdResult;
use thiserror::Error;

/// Errors raised while starting or reaching test containers.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("Container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}

pub type Result<T> = StdResult<T, TestInfraError>;
