use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::remote::{RemoteError, RemoteStore};

/// Relative directory path -> remote folder ID, for one run.
#[derive(Debug, Clone, Default)]
pub struct FolderCache {
    entries: HashMap<String, String>,
}

impl FolderCache {
    pub fn get(&self, rel_dir: &str) -> Option<&str> {
        self.entries.get(rel_dir).map(String::as_str)
    }

    pub fn insert(&mut self, rel_dir: impl Into<String>, folder_id: impl Into<String>) {
        self.entries.insert(rel_dir.into(), folder_id.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps local directories onto remote folders, creating missing ones.
///
/// Not meant to be shared: all folders are resolved from the driving task
/// before uploads are dispatched, so two workers can never race to create
/// the same folder.
pub struct FolderResolver<'a, R: ?Sized> {
    remote: &'a R,
    root_id: String,
    cache: FolderCache,
    max_retries: u32,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<'a, R: RemoteStore + ?Sized> FolderResolver<'a, R> {
    pub fn new(remote: &'a R, root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut cache = FolderCache::default();
        cache.insert("", root_id.clone());
        Self {
            remote,
            root_id,
            cache,
            max_retries: 0,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(60)),
            cancel: CancellationToken::new(),
        }
    }

    /// Retries transient lookup/create failures up to `max_retries` times.
    pub fn with_retry(mut self, max_retries: u32, backoff: Backoff) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Cuts retry waits short once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn cache(&self) -> &FolderCache {
        &self.cache
    }

    /// Remote folder ID for `rel_dir` ("", "." or "a/b/c").
    pub async fn ensure_folder(&mut self, rel_dir: &str) -> Result<String, RemoteError> {
        let segments: Vec<&str> = rel_dir
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.is_empty() {
            return Ok(self.root_id.clone());
        }

        let normalized = segments.join("/");
        if let Some(id) = self.cache.get(&normalized) {
            return Ok(id.to_string());
        }

        let mut parent_id = self.root_id.clone();
        let mut prefix = String::new();
        for segment in segments {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            if let Some(id) = self.cache.get(&prefix) {
                parent_id = id.to_string();
                continue;
            }
            let folder_id = self.find_or_create_with_retry(segment, &parent_id).await?;
            self.cache.insert(prefix.clone(), folder_id.clone());
            parent_id = folder_id;
        }
        Ok(parent_id)
    }

    async fn find_or_create_with_retry(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<String, RemoteError> {
        let mut retries = 0;
        loop {
            match self.find_or_create(name, parent_id).await {
                Err(err) if err.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.backoff.delay(retries);
                    warn!(
                        folder = name,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "folder lookup failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(err),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    async fn find_or_create(&self, name: &str, parent_id: &str) -> Result<String, RemoteError> {
        let existing = self.remote.list_children(parent_id, Some(name)).await?;
        if let Some(folder) = existing
            .into_iter()
            .find(|entry| entry.is_folder() && entry.name == name)
        {
            debug!(folder = name, id = %folder.id, "reusing remote folder");
            return Ok(folder.id);
        }
        let id = self.remote.create_folder(name, parent_id).await?;
        info!(folder = name, parent = parent_id, id = %id, "created remote folder");
        Ok(id)
    }
}
