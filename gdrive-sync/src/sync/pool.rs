use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{error, info, warn};

use super::backoff::Backoff;
use super::queue::{TaskQueue, UploadTask};
use super::remote::{RemoteError, RemoteStore};
use super::state::{DoneLog, StateError};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("local file vanished: {0}")]
    LocalFileMissing(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("failed to record upload: {0}")]
    DoneLog(#[from] StateError),
}

impl TaskError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskError::Remote(err) if err.is_transient())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Uploaded { remote_id: String },
    /// A same-named object of identical size already exists under the parent.
    AlreadyPresent { remote_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub rel_path: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub uploaded: usize,
    pub already_present: usize,
    pub failed: Vec<FailedTask>,
    /// Re-enqueues scheduled after transient errors.
    pub retries: usize,
    /// Tasks never dispatched because the run was cancelled.
    pub undispatched: usize,
    /// Worker tasks that panicked; their files stay in todo.
    pub aborted: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub backoff: Backoff,
}

/// Bounded set of concurrent uploads draining one FIFO queue.
pub struct WorkerPool<R: ?Sized> {
    remote: Arc<R>,
    done_log: Arc<DoneLog>,
    config: PoolConfig,
}

impl<R: RemoteStore + ?Sized + 'static> WorkerPool<R> {
    pub fn new(remote: Arc<R>, done_log: Arc<DoneLog>, config: PoolConfig) -> Self {
        Self {
            remote,
            done_log,
            config,
        }
    }

    /// Drains `queue` until every task is done or failed, or until `cancel`
    /// fires. Cancellation stops dispatching and drops scheduled retries;
    /// uploads already running are awaited.
    pub async fn run(&self, mut queue: TaskQueue, cancel: CancellationToken) -> PoolReport {
        let workers = self.config.workers.max(1);
        let mut in_flight: JoinSet<(UploadTask, Result<TaskOutcome, TaskError>)> = JoinSet::new();
        let mut delayed: DelayQueue<UploadTask> = DelayQueue::new();
        let mut report = PoolReport::default();

        loop {
            while !cancel.is_cancelled() && in_flight.len() < workers {
                let Some(task) = queue.dequeue() else {
                    break;
                };
                let remote = Arc::clone(&self.remote);
                let done_log = Arc::clone(&self.done_log);
                in_flight.spawn(async move {
                    let result = execute_task(remote.as_ref(), &done_log, &task).await;
                    (task, result)
                });
            }

            let idle = queue.is_empty() && delayed.is_empty();
            if in_flight.is_empty() && (idle || cancel.is_cancelled()) {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancel.is_cancelled() => {
                    info!(
                        queued = queue.len(),
                        scheduled = delayed.len(),
                        running = in_flight.len(),
                        "cancellation requested; waiting for running uploads"
                    );
                }
                Some(joined) = in_flight.join_next() => match joined {
                    Ok((task, result)) => self.settle(task, result, &mut delayed, &mut report),
                    Err(err) => {
                        error!(error = %err, "upload worker aborted");
                        report.aborted += 1;
                    }
                },
                Some(expired) = delayed.next(), if !delayed.is_empty() => {
                    queue.enqueue(expired.into_inner());
                }
                else => break,
            }
        }

        report.undispatched = queue.len() + delayed.len();
        report
    }

    fn settle(
        &self,
        mut task: UploadTask,
        result: Result<TaskOutcome, TaskError>,
        delayed: &mut DelayQueue<UploadTask>,
        report: &mut PoolReport,
    ) {
        match result {
            Ok(TaskOutcome::Uploaded { remote_id }) => {
                info!(path = %task.rel_path, id = %remote_id, "uploaded");
                report.uploaded += 1;
            }
            Ok(TaskOutcome::AlreadyPresent { remote_id }) => {
                info!(path = %task.rel_path, id = %remote_id, "skipped, already present");
                report.already_present += 1;
            }
            Err(err) if err.is_transient() && task.retries < self.config.max_retries => {
                task.retries += 1;
                let delay = self.config.backoff.delay(task.retries);
                warn!(
                    path = %task.rel_path,
                    attempt = task.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upload failed, retrying"
                );
                report.retries += 1;
                delayed.insert(task, delay);
            }
            Err(err) => {
                let attempts = task.retries + 1;
                if matches!(err, TaskError::LocalFileMissing(_)) {
                    warn!(path = %task.rel_path, "skipped, file vanished before upload");
                } else {
                    error!(path = %task.rel_path, attempts, error = %err, "upload failed");
                }
                report.failed.push(FailedTask {
                    rel_path: task.rel_path,
                    attempts,
                    error: err.to_string(),
                });
            }
        }
    }
}

/// One upload attempt: short-circuits when an object with the same name and
/// size already exists, otherwise streams the file. Records success in the
/// done log before returning.
pub async fn execute_task<R: RemoteStore + ?Sized>(
    remote: &R,
    done_log: &DoneLog,
    task: &UploadTask,
) -> Result<TaskOutcome, TaskError> {
    let local_size = match tokio::fs::metadata(&task.local_path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Err(TaskError::LocalFileMissing(task.local_path.clone())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(TaskError::LocalFileMissing(task.local_path.clone()));
        }
        Err(err) => return Err(err.into()),
    };

    let name = task.file_name();
    let existing = remote.list_children(&task.parent_id, Some(name)).await?;
    let outcome = match existing
        .into_iter()
        .find(|entry| !entry.is_folder() && entry.name == name && entry.size == Some(local_size))
    {
        Some(entry) => TaskOutcome::AlreadyPresent {
            remote_id: entry.id,
        },
        None => TaskOutcome::Uploaded {
            remote_id: remote
                .upload_file(&task.local_path, name, &task.parent_id)
                .await?,
        },
    };

    done_log.append(&task.rel_path).await?;
    Ok(outcome)
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
