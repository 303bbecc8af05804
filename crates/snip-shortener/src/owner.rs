use crate::error::ShortenerError;
use snip_core::Storage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Random bytes behind every owner id.
pub const OWNER_ID_BYTES: usize = 24;

/// Hands out owner ids that no stored row uses yet.
///
/// Ids are base58 over [`OWNER_ID_BYTES`] random bytes. A collision with a
/// known owner is retried a bounded number of times.
pub struct OwnerIdGenerator<S: ?Sized> {
    storage: Arc<S>,
    max_attempts: usize,
}

impl<S: ?Sized> Clone for OwnerIdGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            max_attempts: self.max_attempts,
        }
    }
}

impl<S: Storage + ?Sized> OwnerIdGenerator<S> {
    pub fn new(storage: Arc<S>, max_attempts: usize) -> Self {
        Self {
            storage,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn generate(&self) -> Result<String, ShortenerError> {
        for attempt in 1..=self.max_attempts {
            let owner_id = bs58::encode(rand::random::<[u8; OWNER_ID_BYTES]>()).into_string();

            if !self.storage.is_owner_known(&owner_id).await? {
                return Ok(owner_id);
            }
            debug!(attempt, "owner id already in use, regenerating");
        }

        warn!(attempts = self.max_attempts, "could not find a free owner id");
        Err(ShortenerError::IdExhausted {
            attempts: self.max_attempts,
        })
    }
}
