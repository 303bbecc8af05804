//! URL shortener service.
//!
//! [`ShortenerService`] turns domain requests (shorten, batch-shorten, list a
//! user's URLs, delete) into [`Storage`](snip_core::Storage) calls and
//! delete-queue submissions. [`OwnerIdGenerator`] hands out ids for new users.

pub mod error;
pub mod owner;
pub mod service;

pub use error::ShortenerError;
pub use owner::OwnerIdGenerator;
pub use service::{
    BatchItem, BatchShortened, ShortenOutcome, ShortenerService, ShortenerSettings, UserUrl,
};
