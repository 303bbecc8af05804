use crate::error::DeleteError;
use snip_core::{DeleteTask, Storage, StorageError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

/// Tuning for a [`DeleteManager`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct DeleteSettings {
    /// How often accumulated tasks are flushed to storage.
    #[builder(default = Duration::from_secs(5))]
    pub flush_interval: Duration,
    /// Capacity of the task queue; producers wait when it is full.
    #[builder(default = 256)]
    pub queue_capacity: usize,
    /// Capacity of the error channel. Errors that do not fit are logged and dropped.
    #[builder(default = 16)]
    pub error_capacity: usize,
}

impl Default for DeleteSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Producer side of the delete pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeleteQueue {
    sender: mpsc::Sender<DeleteTask>,
}

impl DeleteQueue {
    /// Submits a task, waiting for space while the queue is full.
    ///
    /// Fails with [`DeleteError::Closed`] once the manager has stopped.
    pub async fn enqueue(&self, task: DeleteTask) -> Result<(), DeleteError> {
        self.sender.send(task).await.map_err(|_| DeleteError::Closed)
    }

    /// Submits a task without waiting.
    pub fn try_enqueue(&self, task: DeleteTask) -> Result<(), DeleteError> {
        self.sender.try_send(task).map_err(|err| match err {
            TrySendError::Full(_) => DeleteError::Full,
            TrySendError::Closed(_) => DeleteError::Closed,
        })
    }
}

/// Handle to a running [`DeleteManager`].
#[derive(Debug)]
pub struct DeleteManagerHandle {
    /// Completes after the final flush has been attempted.
    pub done: JoinHandle<()>,
    /// Flush failures, in order. Closed when the manager stops.
    pub errors: mpsc::Receiver<StorageError>,
}

impl DeleteManagerHandle {
    /// Waits for the manager to finish draining, discarding unread errors.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.done.await
    }
}

/// Accumulates delete tasks off the request path and flushes them in bulk.
///
/// The background loop has three states:
///
/// - **accumulating**: each received task is appended to the pending list;
/// - **flushing**: on every tick with a non-empty pending list, the whole list
///   is handed to [`Storage::delete`]. On success the list is cleared; on
///   failure it is kept for the next tick and the error is reported;
/// - **draining**: once the shutdown future resolves, tasks still queued are
///   collected and flushed one last time, then the error channel is closed.
pub struct DeleteManager<S: ?Sized> {
    storage: Arc<S>,
    tasks: mpsc::Receiver<DeleteTask>,
    settings: DeleteSettings,
}

impl<S: Storage + ?Sized> DeleteManager<S> {
    /// Creates a manager and the queue that feeds it.
    pub fn new(storage: Arc<S>, settings: DeleteSettings) -> (Self, DeleteQueue) {
        let (sender, tasks) = mpsc::channel(settings.queue_capacity.max(1));
        let manager = Self {
            storage,
            tasks,
            settings,
        };
        (manager, DeleteQueue { sender })
    }

    /// Spawns the background loop.
    ///
    /// `shutdown` plays the role of the process lifetime: when it resolves the
    /// manager drains. The final flush runs after `shutdown` has completed, so
    /// it is never cut short by the same signal.
    pub fn start<F>(self, shutdown: F) -> DeleteManagerHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (errors_tx, errors) = mpsc::channel(self.settings.error_capacity.max(1));
        let done = tokio::spawn(self.run(shutdown, errors_tx));
        DeleteManagerHandle { done, errors }
    }

    async fn run<F>(mut self, shutdown: F, errors: mpsc::Sender<StorageError>)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.settings.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tokio::pin!(shutdown);
        let mut pending = Vec::new();

        info!(
            flush_interval = ?self.settings.flush_interval,
            "delete manager started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(task) = self.tasks.recv() => pending.push(task),
                _ = ticker.tick() => {
                    if !pending.is_empty() {
                        self.flush(&mut pending, &errors).await;
                    }
                }
            }
        }

        self.tasks.close();
        while let Ok(task) = self.tasks.try_recv() {
            pending.push(task);
        }

        if !pending.is_empty() {
            debug!(tasks = pending.len(), "final delete flush");
            self.flush(&mut pending, &errors).await;
            if !pending.is_empty() {
                error!(tasks = pending.len(), "delete tasks lost on shutdown");
            }
        }

        info!("delete manager stopped");
    }

    async fn flush(&self, pending: &mut Vec<DeleteTask>, errors: &mpsc::Sender<StorageError>) {
        match self.storage.delete(pending).await {
            Ok(()) => {
                debug!(tasks = pending.len(), "flushed delete tasks");
                pending.clear();
            }
            Err(err) => {
                warn!(
                    error = %err,
                    tasks = pending.len(),
                    "delete flush failed, keeping tasks for the next tick"
                );
                report(errors, err);
            }
        }
    }
}

fn report(errors: &mpsc::Sender<StorageError>, err: StorageError) {
    match errors.try_send(err) {
        Ok(()) => {}
        Err(TrySendError::Full(err)) => {
            error!(error = %err, "delete error channel is full, dropping error");
        }
        Err(TrySendError::Closed(err)) => {
            error!(error = %err, "nobody is listening for delete errors");
        }
    }
}
