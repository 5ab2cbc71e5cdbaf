use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::paths::{PathError, local_path_for, parent_dir};
use super::queue::{TaskQueue, UploadTask};
use super::remote::{RemoteError, RemoteStore};
use super::resolver::FolderResolver;

#[derive(Debug, Error)]
pub enum TaskBuildError {
    #[error("todo log not found: {0}")]
    MissingTodoLog(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid todo entry {entry:?}: {source}")]
    InvalidEntry { entry: String, source: PathError },
    #[error("failed to resolve remote folder for {dir:?}: {source}")]
    Folder { dir: String, source: RemoteError },
}

#[derive(Debug, Default)]
pub struct BuiltTasks {
    pub queue: TaskQueue,
    /// Todo entries whose local file disappeared since the scan.
    pub skipped_missing: usize,
    /// Todo entries left unqueued because the run was cancelled.
    pub unresolved: usize,
}

/// Turns the todo log into upload tasks, resolving (and creating) every
/// remote parent folder up front. Stops resolving once `cancel` fires; the
/// remaining entries are counted in `unresolved`.
pub async fn build_tasks<R: RemoteStore + ?Sized>(
    sync_root: &Path,
    resolver: &mut FolderResolver<'_, R>,
    todo_log: &Path,
    cancel: &CancellationToken,
) -> Result<BuiltTasks, TaskBuildError> {
    let file = match tokio::fs::File::open(todo_log).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(TaskBuildError::MissingTodoLog(todo_log.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    let mut built = BuiltTasks::default();
    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines.next_line().await? {
        let rel_path = line.trim_end_matches('\r');
        if rel_path.trim().is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            built.unresolved += 1;
            continue;
        }

        let local_path =
            local_path_for(sync_root, rel_path).map_err(|source| TaskBuildError::InvalidEntry {
                entry: rel_path.to_string(),
                source,
            })?;
        if !is_file(&local_path).await {
            warn!(path = %local_path.display(), "skipping missing file");
            built.skipped_missing += 1;
            continue;
        }

        let dir = parent_dir(rel_path);
        let parent_id = match resolver.ensure_folder(dir).await {
            Ok(id) => id,
            Err(_) if cancel.is_cancelled() => {
                built.unresolved += 1;
                continue;
            }
            Err(source) => {
                return Err(TaskBuildError::Folder {
                    dir: dir.to_string(),
                    source,
                });
            }
        };
        debug!(path = rel_path, parent = %parent_id, "queued upload");
        built
            .queue
            .enqueue(UploadTask::new(local_path, rel_path, parent_id));
    }

    if built.unresolved > 0 {
        info!(
            queued = built.queue.len(),
            unresolved = built.unresolved,
            "cancelled while resolving folders"
        );
    }
    Ok(built)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
