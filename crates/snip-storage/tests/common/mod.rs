use snip_storage::{PostgresStorage, Storage};
use snip_test_infra::postgres::{PostgresConfig, PostgresServer};

/// Starts a fresh server with the schema in place. Keep the server alive for
/// as long as the storage is used.
pub async fn start_postgres() -> (PostgresServer, PostgresStorage) {
    let postgres = PostgresServer::new(PostgresConfig::builder().build())
        .await
        .expect("start postgres");
    let pool = postgres.connect().await.expect("connect postgres");

    let storage = PostgresStorage::new(pool);
    storage.init().await.expect("create schema");
    (postgres, storage)
}
