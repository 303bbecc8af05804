use snip_core::{Result, SavedUrl, StorageError};

/// Checks that every row in `batch` can be appended to `existing`.
///
/// Rows earlier in the batch count as existing for the rows after them, so a
/// batch that repeats a URL or a short id is rejected as a whole. A live URL
/// match wins over a short-id collision.
pub(crate) fn check_insertable(existing: &[SavedUrl], batch: &[SavedUrl]) -> Result<()> {
    for (index, candidate) in batch.iter().enumerate() {
        let earlier = move || existing.iter().chain(&batch[..index]);

        if let Some(live) = earlier()
            .find(|row| !row.is_deleted && row.original_url == candidate.original_url)
        {
            return Err(StorageError::Conflict(live.short_id.clone()));
        }
        if earlier().any(|row| row.short_id == candidate.short_id) {
            return Err(StorageError::ShortIdTaken(candidate.short_id.clone()));
        }
    }
    Ok(())
}
