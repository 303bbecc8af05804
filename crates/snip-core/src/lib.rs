//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the persisted data model and the [`Storage`] contract
//! shared by every backend, the delete manager and the shortener service.

pub mod error;
pub mod model;
pub mod storage;

pub use error::{Result, StorageError};
pub use model::{DeleteTask, SavedUrl, Stats};
pub use storage::Storage;
