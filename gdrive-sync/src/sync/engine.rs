use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SyncConfig;

use super::backoff::Backoff;
use super::pool::{FailedTask, PoolConfig, WorkerPool};
use super::remote::RemoteStore;
use super::resolver::FolderResolver;
use super::state::{StateError, StateStore};
use super::tasks::{TaskBuildError, build_tasks};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("task build error: {0}")]
    Build(#[from] TaskBuildError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Files on disk at scan time.
    pub total: usize,
    /// Files not yet in the done log at scan time.
    pub todo: usize,
    pub queued: usize,
    pub skipped_missing: usize,
    pub uploaded: usize,
    pub already_present: usize,
    pub failed: Vec<FailedTask>,
    pub retries: usize,
    /// Left for the next run because the run was cancelled or a worker aborted.
    pub undispatched: usize,
    /// Remote folders resolved this run, including the root.
    pub folders_resolved: usize,
}

impl SyncSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.undispatched == 0
    }
}

/// Scan, resolve folders, then upload: one mirror run of a local root.
pub struct SyncEngine<R: ?Sized> {
    remote: Arc<R>,
    config: SyncConfig,
}

impl<R: RemoteStore + ?Sized + 'static> SyncEngine<R> {
    pub fn new(remote: Arc<R>, config: SyncConfig) -> Self {
        Self { remote, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::new(&self.config.local_root, &self.config.cache_root)
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<SyncSummary, EngineError> {
        let store = self.state_store();
        let scan = store.clone();
        let reconciliation = tokio::task::spawn_blocking(move || scan.reconcile()).await??;
        info!(
            total = reconciliation.total,
            todo = reconciliation.todo_count(),
            todo_log = %reconciliation.todo_log.display(),
            done_log = %reconciliation.done_log.display(),
            "scanned local root"
        );

        let backoff = Backoff::new(self.config.base_delay, self.config.max_delay);
        let mut resolver = FolderResolver::new(self.remote.as_ref(), &self.config.remote_root_id)
            .with_retry(self.config.max_retries, backoff)
            .with_cancellation(cancel.clone());
        let built = build_tasks(
            &self.config.local_root,
            &mut resolver,
            &reconciliation.todo_log,
            &cancel,
        )
        .await?;
        let folders_resolved = resolver.cache().len();
        let queued = built.queue.len();
        info!(
            queued,
            skipped_missing = built.skipped_missing,
            folders = folders_resolved,
            "built upload tasks; starting upload"
        );

        let done_log = Arc::new(store.open_done_log().await?);
        let pool = WorkerPool::new(
            Arc::clone(&self.remote),
            done_log,
            PoolConfig {
                workers: self.config.workers,
                max_retries: self.config.max_retries,
                backoff,
            },
        );
        let report = pool.run(built.queue, cancel).await;

        Ok(SyncSummary {
            total: reconciliation.total,
            todo: reconciliation.todo_count(),
            queued,
            skipped_missing: built.skipped_missing,
            uploaded: report.uploaded,
            already_present: report.already_present,
            failed: report.failed,
            retries: report.retries,
            undispatched: built.unresolved + report.undispatched + report.aborted,
            folders_resolved,
        })
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
