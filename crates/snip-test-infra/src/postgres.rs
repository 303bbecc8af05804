use crate::{Result, TestInfraError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const POSTGRES_PORT: u16 = 5432;

#[derive(Debug, Clone, TypedBuilder)]
pub struct PostgresConfig {
    #[builder(default = "snip".to_string())]
    database: String,
    #[builder(default = "snip".to_string())]
    username: String,
    #[builder(default = "snip".to_string())]
    password: String,
    #[builder(default = "16-alpine".to_string())]
    tag: String,
    /// Attempts made by [`PostgresServer::connect`] before giving up.
    #[builder(default = 20)]
    connect_attempts: usize,
    #[builder(default = Duration::from_millis(500))]
    connect_backoff: Duration,
}

/// A disposable PostgreSQL server, stopped when dropped.
pub struct PostgresServer {
    container: ContainerAsync<GenericImage>,
    config: PostgresConfig,
}

impl PostgresServer {
    /// Starts a PostgreSQL container.
    ///
    /// The server prints its ready message once during bootstrap and again
    /// after the internal restart, so [`connect`](Self::connect) retries.
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let container = GenericImage::new("postgres", config.tag.as_str())
            .with_exposed_port(POSTGRES_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_DB", config.database.as_str())
            .with_env_var("POSTGRES_USER", config.username.as_str())
            .with_env_var("POSTGRES_PASSWORD", config.password.as_str())
            .start()
            .await?;

        Ok(Self { container, config })
    }

    pub async fn database_url(&self) -> Result<String> {
        let host = self.container.get_host().await?;
        let port = self.container.get_host_port_ipv4(POSTGRES_PORT).await?;
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.config.username, self.config.password, host, port, self.config.database
        ))
    }

    /// Opens a small pool, retrying until the server accepts connections.
    pub async fn connect(&self) -> Result<PgPool> {
        let url = self.database_url().await?;
        let mut attempts = self.config.connect_attempts.max(1);

        loop {
            match PgPoolOptions::new().max_connections(5).connect(&url).await {
                Ok(pool) => return Ok(pool),
                Err(err) if attempts <= 1 => return Err(TestInfraError::Postgres(err)),
                Err(_) => {
                    attempts -= 1;
                    tokio::time::sleep(self.config.connect_backoff).await;
                }
            }
        }
    }
}
