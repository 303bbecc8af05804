//! Deferred batch deletion.
//!
//! Request handlers push [`DeleteTask`](snip_core::DeleteTask)s into a
//! [`DeleteQueue`] and return immediately. A single background task owned by
//! the [`DeleteManager`] accumulates them and soft-deletes them in bulk on a
//! fixed interval, and once more when the process shuts down.

pub mod error;
pub mod manager;

pub use error::DeleteError;
pub use manager::{DeleteManager, DeleteManagerHandle, DeleteQueue, DeleteSettings};
