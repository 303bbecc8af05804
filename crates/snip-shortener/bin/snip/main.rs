mod cli;

use crate::cli::{LogFormatArg, StorageBackendArg, CLI};
use anyhow::Context;
use clap::Parser;
use snip_deleter::{DeleteManager, DeleteManagerHandle};
use snip_generator::RandomGenerator;
use snip_shortener::ShortenerService;
use snip_storage::{FileStorage, MemoryStorage, PostgresStorage, Storage};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        base_url = %config.base_url,
        "starting snip shortener"
    );

    match config.storage {
        StorageBackendArg::Memory => run(MemoryStorage::new(), &config).await,
        StorageBackendArg::File => {
            run(FileStorage::new(&config.file_storage_path), &config).await
        }
        StorageBackendArg::Postgres => {
            let dsn = config
                .database_dsn
                .as_deref()
                .context("database dsn is required when storage backend is postgres")?;
            let storage = PostgresStorage::connect(dsn)
                .await
                .context("failed to connect to postgres")?;
            run(storage, &config).await
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormatArg::Pretty => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

async fn run<S: Storage>(storage: S, config: &CLI) -> anyhow::Result<()> {
    storage
        .init()
        .await
        .context("failed to initialize storage")?;
    let storage = Arc::new(storage);

    let (manager, deletes) = DeleteManager::new(Arc::clone(&storage), config.delete_settings());
    let mut handle = manager.start(shutdown_signal());

    let service = ShortenerService::new(
        Arc::clone(&storage),
        RandomGenerator::default(),
        deletes,
        config.shortener_settings(),
    );

    service.ping().await.context("storage is not reachable")?;
    let stats = service.stats().await.context("failed to read statistics")?;
    info!(urls = stats.urls, users = stats.users, "storage is ready");

    let result = supervise(&mut handle).await;

    if let Err(err) = service.close().await {
        warn!(error = %err, "failed to close storage");
    }
    info!("snip shortener stopped");

    result
}

/// Waits for the delete manager to drain; its first reported error is fatal.
async fn supervise(handle: &mut DeleteManagerHandle) -> anyhow::Result<()> {
    tokio::select! {
        Some(err) = handle.errors.recv() => {
            error!(error = %err, "delete manager reported a storage failure");
            return Err(anyhow::Error::new(err).context("delete flush failed"));
        }
        joined = &mut handle.done => joined.context("delete manager task failed")?,
    }

    if let Ok(err) = handle.errors.try_recv() {
        error!(error = %err, "final delete flush failed");
        return Err(anyhow::Error::new(err).context("final delete flush failed"));
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutting down, draining delete queue");
}
