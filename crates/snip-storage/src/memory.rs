use crate::insert::check_insertable;
use async_trait::async_trait;
use parking_lot::Mutex;
use snip_core::{DeleteTask, Result, SavedUrl, Stats, Storage, StorageError};

/// In-memory implementation of the [`Storage`] contract.
///
/// Rows live in an ordered `Vec` behind a single coarse lock held for the
/// whole call. Uniqueness is checked by linear scan. Deleted rows are marked,
/// never removed. `None` means the table was never initialized or was closed.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    rows: Mutex<Option<Vec<SavedUrl>>>,
}

impl MemoryStorage {
    /// Creates an uninitialized storage; call [`Storage::init`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_rows<T>(&self, f: impl FnOnce(&mut Vec<SavedUrl>) -> Result<T>) -> Result<T> {
        let mut guard = self.rows.lock();
        let rows = guard.as_mut().ok_or_else(not_initialized)?;
        f(rows)
    }
}

fn not_initialized() -> StorageError {
    StorageError::Unavailable("memory storage is not initialized".to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        self.rows.lock().get_or_insert_with(Vec::new);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.with_rows(|_| Ok(()))
    }

    async fn save(&self, url: &SavedUrl) -> Result<()> {
        self.with_rows(|rows| {
            check_insertable(rows, std::slice::from_ref(url))?;
            rows.push(url.clone());
            Ok(())
        })
    }

    async fn save_array(&self, urls: &[SavedUrl]) -> Result<()> {
        self.with_rows(|rows| {
            check_insertable(rows, urls)?;
            rows.extend_from_slice(urls);
            Ok(())
        })
    }

    async fn get(&self, short_id: &str) -> Result<SavedUrl> {
        self.with_rows(|rows| {
            rows.iter()
                .find(|row| row.short_id == short_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(short_id.to_string()))
        })
    }

    async fn get_by_user(&self, owner_id: &str) -> Result<Vec<SavedUrl>> {
        self.with_rows(|rows| {
            let owned: Vec<SavedUrl> = rows
                .iter()
                .filter(|row| row.owner_id == owner_id)
                .cloned()
                .collect();
            if owned.is_empty() {
                return Err(StorageError::NotFound(format!("no urls for owner {owner_id}")));
            }
            Ok(owned)
        })
    }

    async fn delete(&self, tasks: &[DeleteTask]) -> Result<()> {
        self.with_rows(|rows| {
            for row in rows.iter_mut() {
                if tasks.iter().any(|task| row.is_targeted_by(task)) {
                    row.is_deleted = true;
                }
            }
            Ok(())
        })
    }

    async fn is_owner_known(&self, owner_id: &str) -> Result<bool> {
        self.with_rows(|rows| Ok(rows.iter().any(|row| row.owner_id == owner_id)))
    }

    async fn get_stats(&self) -> Result<Stats> {
        self.with_rows(|rows| Ok(Stats::from_rows(rows.iter())))
    }

    async fn clean(&self) -> Result<()> {
        self.with_rows(|rows| {
            rows.clear();
            Ok(())
        })
    }

    async fn close(&self) -> Result<()> {
        self.rows.lock().take();
        Ok(())
    }
}
