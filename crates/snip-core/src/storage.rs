use crate::error::Result;
use crate::model::{DeleteTask, SavedUrl, Stats};
use async_trait::async_trait;

/// The behavioral contract every persistence backend implements.
///
/// Backends differ in durability and locking strategy only. For any backend:
///
/// - at most one live (non-deleted) row exists per original URL;
/// - short ids are unique at insertion time, tombstones included;
/// - a [`DeleteTask`] only affects a row whose short id *and* owner match;
/// - deleting is idempotent and never removes the physical row.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Prepares the medium (table, file, map). Calling it again is a no-op.
    ///
    /// Fails with [`StorageError::Initialization`](crate::StorageError::Initialization)
    /// if the medium is unreachable or its existing content is inconsistent.
    async fn init(&self) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Inserts a new mapping.
    ///
    /// If the original URL already has a live mapping, nothing is written and
    /// `Err(Conflict(existing_short_id))` is returned. If the short id is
    /// already used, `Err(ShortIdTaken)` is returned.
    async fn save(&self, url: &SavedUrl) -> Result<()>;

    /// Inserts several mappings.
    ///
    /// The relational backend commits all rows or none. The memory and file
    /// backends check the whole batch for conflicts before writing, but an I/O
    /// failure in the middle of a file write is not rolled back.
    async fn save_array(&self, urls: &[SavedUrl]) -> Result<()>;

    /// Returns the row for `short_id`, tombstoned or not.
    async fn get(&self, short_id: &str) -> Result<SavedUrl>;

    /// Returns every row owned by `owner_id`, tombstoned or not, in no
    /// particular order.
    ///
    /// An owner without rows is reported as `Err(NotFound)`.
    async fn get_by_user(&self, owner_id: &str) -> Result<Vec<SavedUrl>>;

    /// Soft-deletes the rows matched by `tasks`. Tasks that match nothing are ignored.
    async fn delete(&self, tasks: &[DeleteTask]) -> Result<()>;

    /// Returns `true` if any row, tombstoned or not, belongs to `owner_id`.
    async fn is_owner_known(&self, owner_id: &str) -> Result<bool>;

    /// Counts live URLs and the distinct owners among them.
    async fn get_stats(&self) -> Result<Stats>;

    /// Physically removes every row. Intended for tests and first-run bootstrap.
    async fn clean(&self) -> Result<()>;

    /// Releases the underlying resources. Later calls fail with `Unavailable`.
    async fn close(&self) -> Result<()>;
}
