//! In-memory `RemoteStore` used by the engine, pool and resolver tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gdrive_core::FOLDER_MIME_TYPE;

use super::remote::{RemoteEntry, RemoteError, RemoteStore};

#[derive(Debug, Clone)]
struct FakeObject {
    id: String,
    parent: String,
    name: String,
    size: Option<u64>,
    mime_type: String,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    objects: Vec<FakeObject>,
    list_calls: Vec<(String, Option<String>)>,
    create_calls: Vec<(String, String)>,
    upload_calls: Vec<String>,
    upload_failures: HashMap<String, VecDeque<RemoteError>>,
    create_failures: HashMap<String, RemoteError>,
    create_failures_once: HashMap<String, VecDeque<RemoteError>>,
}

#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
    upload_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    pub fn add_file(&self, parent: &str, name: &str, size: u64) -> String {
        self.insert(parent, name, Some(size), "application/octet-stream")
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, None, FOLDER_MIME_TYPE)
    }

    /// Queues errors returned by successive uploads of files named `name`.
    pub fn fail_uploads(&self, name: &str, errors: Vec<RemoteError>) {
        self.state
            .lock()
            .unwrap()
            .upload_failures
            .insert(name.to_string(), errors.into());
    }

    pub fn fail_create(&self, name: &str, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .insert(name.to_string(), error);
    }

    /// Queues errors returned by successive creates of folders named `name`.
    pub fn fail_create_once(&self, name: &str, errors: Vec<RemoteError>) {
        self.state
            .lock()
            .unwrap()
            .create_failures_once
            .insert(name.to_string(), errors.into());
    }

    /// Names of uploaded files, in call order (including failed attempts).
    pub fn upload_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().upload_calls.clone()
    }

    pub fn list_calls(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn create_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().create_calls.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Folders named `name` directly under `parent`.
    pub fn folders_named(&self, parent: &str, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .filter(|o| o.parent == parent && o.name == name && o.mime_type == FOLDER_MIME_TYPE)
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn file_size(&self, parent: &str, name: &str) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .find(|o| o.parent == parent && o.name == name && o.mime_type != FOLDER_MIME_TYPE)
            .and_then(|o| o.size)
    }

    fn insert(&self, parent: &str, name: &str, size: Option<u64>, mime_type: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("id-{}", state.next_id);
        state.objects.push(FakeObject {
            id: id.clone(),
            parent: parent.to_string(),
            name: name.to_string(),
            size,
            mime_type: mime_type.to_string(),
        });
        id
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list_children(
        &self,
        parent_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state
            .list_calls
            .push((parent_id.to_string(), name.map(str::to_string)));
        Ok(state
            .objects
            .iter()
            .filter(|o| o.parent == parent_id && name.is_none_or(|n| n == o.name))
            .map(|o| RemoteEntry {
                id: o.id.clone(),
                name: o.name.clone(),
                size: o.size,
                mime_type: o.mime_type.clone(),
            })
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, RemoteError> {
        {
            let mut state = self.state.lock().unwrap();
            state
                .create_calls
                .push((name.to_string(), parent_id.to_string()));
            if let Some(err) = state.create_failures.get(name) {
                return Err(err.clone());
            }
            if let Some(err) = state
                .create_failures_once
                .get_mut(name)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
        }
        Ok(self.add_folder(parent_id, name))
    }

    async fn upload_file(
        &self,
        source: &Path,
        name: &str,
        parent_id: &str,
    ) -> Result<String, RemoteError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        let result = {
            let mut state = self.state.lock().unwrap();
            state.upload_calls.push(name.to_string());
            state
                .upload_failures
                .get_mut(name)
                .and_then(VecDeque::pop_front)
        };
        let result = match result {
            Some(err) => Err(err),
            None => match std::fs::metadata(source) {
                Ok(meta) => Ok(self.insert(
                    parent_id,
                    name,
                    Some(meta.len()),
                    "application/octet-stream",
                )),
                Err(err) => Err(RemoteError::permanent(format!("read failed: {err}"))),
            },
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
