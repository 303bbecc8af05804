use clap::{Parser, ValueEnum};
use snip_deleter::DeleteSettings;
use snip_shortener::ShortenerSettings;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";
pub const FLUSH_INTERVAL_ENV: &str = "SNIP_DELETE_FLUSH_INTERVAL_SECS";
pub const DELETE_QUEUE_CAPACITY_ENV: &str = "SNIP_DELETE_QUEUE_CAPACITY";
pub const ID_ATTEMPTS_ENV: &str = "SNIP_ID_ATTEMPTS";

pub const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/short-url-db.json";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "memory")]
    Memory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Memory => write!(f, "memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip-shortener", version)]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::File
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, default_value = DEFAULT_FILE_STORAGE_PATH)]
    pub file_storage_path: PathBuf,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Seconds between delete flushes.
    #[arg(
        long,
        env = FLUSH_INTERVAL_ENV,
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub flush_interval_secs: u64,

    #[arg(long, env = DELETE_QUEUE_CAPACITY_ENV, default_value_t = 256)]
    pub delete_queue_capacity: usize,

    /// Attempts at finding a free short id before failing.
    #[arg(long, env = ID_ATTEMPTS_ENV, default_value_t = 5)]
    pub id_attempts: usize,
}

impl CLI {
    pub fn delete_settings(&self) -> DeleteSettings {
        DeleteSettings::builder()
            .flush_interval(Duration::from_secs(self.flush_interval_secs))
            .queue_capacity(self.delete_queue_capacity)
            .build()
    }

    pub fn shortener_settings(&self) -> ShortenerSettings {
        ShortenerSettings::builder()
            .base_url(self.base_url.clone())
            .max_attempts(self.id_attempts)
            .build()
    }
}
