use crate::insert::check_insertable;
use async_trait::async_trait;
use snip_core::{DeleteTask, Result, SavedUrl, Stats, Storage, StorageError};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Append-only file implementation of the [`Storage`] contract.
///
/// Each row is one JSON object per line. Conflict detection scans the whole
/// file before appending, and delete rewrites the whole file because the
/// format has no in-place update. One mutex serializes every operation since
/// the file offset is shared mutable state.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileStorage {
    /// Creates a storage backed by `path`. Nothing is opened until [`Storage::init`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> StorageError {
        StorageError::Unavailable(format!("{}: {err}", self.path.display()))
    }

    async fn read_rows(&self, file: &mut File) -> Result<Vec<SavedUrl>> {
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| self.io_error(e))?;

        let mut lines = BufReader::new(&mut *file).lines();
        let mut rows = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.map_err(|e| self.io_error(e))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|e| {
                StorageError::InvalidData(format!(
                    "{} line {line_no}: {e}",
                    self.path.display()
                ))
            })?;
            rows.push(row);
        }

        Ok(rows)
    }

    async fn append_rows(&self, file: &mut File, rows: &[SavedUrl]) -> Result<()> {
        let buf = encode_rows(rows)?;
        file.seek(SeekFrom::End(0))
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&buf).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))
    }

    async fn truncate(&self, file: &mut File) -> Result<()> {
        file.set_len(0).await.map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

fn encode_rows(rows: &[SavedUrl]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, row)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        buf.push(b'\n');
    }
    Ok(buf)
}

fn not_open() -> StorageError {
    StorageError::Unavailable("file storage is not open".to_string())
}

#[async_trait]
impl Storage for FileStorage {
    async fn init(&self) -> Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::Initialization(format!("{}: {e}", dir.display()))
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(|e| {
                StorageError::Initialization(format!("{}: {e}", self.path.display()))
            })?;

        let rows = self
            .read_rows(&mut file)
            .await
            .map_err(|e| StorageError::Initialization(e.to_string()))?;

        info!(path = %self.path.display(), rows = rows.len(), "opened file storage");
        *guard = Some(file);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let guard = self.file.lock().await;
        if guard.is_none() {
            return Err(not_open());
        }
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        if !exists {
            return Err(StorageError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn save(&self, url: &SavedUrl) -> Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        let rows = self.read_rows(file).await?;
        check_insertable(&rows, std::slice::from_ref(url))?;
        self.append_rows(file, std::slice::from_ref(url)).await
    }

    async fn save_array(&self, urls: &[SavedUrl]) -> Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        let rows = self.read_rows(file).await?;
        check_insertable(&rows, urls)?;
        self.append_rows(file, urls).await
    }

    async fn get(&self, short_id: &str) -> Result<SavedUrl> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        self.read_rows(file)
            .await?
            .into_iter()
            .find(|row| row.short_id == short_id)
            .ok_or_else(|| StorageError::NotFound(short_id.to_string()))
    }

    async fn get_by_user(&self, owner_id: &str) -> Result<Vec<SavedUrl>> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        let owned: Vec<SavedUrl> = self
            .read_rows(file)
            .await?
            .into_iter()
            .filter(|row| row.owner_id == owner_id)
            .collect();
        if owned.is_empty() {
            return Err(StorageError::NotFound(format!("no urls for owner {owner_id}")));
        }
        Ok(owned)
    }

    async fn delete(&self, tasks: &[DeleteTask]) -> Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        let mut rows = self.read_rows(file).await?;
        let mut flipped = 0usize;
        for row in rows.iter_mut() {
            if !row.is_deleted && tasks.iter().any(|task| row.is_targeted_by(task)) {
                row.is_deleted = true;
                flipped += 1;
            }
        }

        if flipped == 0 {
            debug!(tasks = tasks.len(), "no rows matched delete tasks");
            return Ok(());
        }

        // No in-place update: rewrite the whole file.
        self.truncate(file).await?;
        self.append_rows(file, &rows).await?;
        debug!(tasks = tasks.len(), flipped, "rewrote file storage after delete");
        Ok(())
    }

    async fn is_owner_known(&self, owner_id: &str) -> Result<bool> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        Ok(self
            .read_rows(file)
            .await?
            .iter()
            .any(|row| row.owner_id == owner_id))
    }

    async fn get_stats(&self) -> Result<Stats> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;

        let rows = self.read_rows(file).await?;
        Ok(Stats::from_rows(&rows))
    }

    async fn clean(&self) -> Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(not_open)?;
        self.truncate(file).await
    }

    async fn close(&self) -> Result<()> {
        let Some(mut file) = self.file.lock().await.take() else {
            return Ok(());
        };
        file.flush().await.map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))
    }
}
