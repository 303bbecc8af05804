//! Persistence backends implementing the [`Storage`] contract.
//!
//! - [`MemoryStorage`]: a mutex-guarded vector, for tests and development.
//! - [`FileStorage`]: newline-delimited JSON, rewritten in full on delete.
//! - [`PostgresStorage`]: a single table with database-enforced uniqueness.

mod insert;
pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use snip_core::{DeleteTask, Result, SavedUrl, Stats, Storage, StorageError};
