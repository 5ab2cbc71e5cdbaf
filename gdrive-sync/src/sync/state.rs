use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::paths::{PathError, cache_dir_for, relative_posix};

pub const TODO_LOG_NAME: &str = "files_todo.tmp";
pub const DONE_LOG_NAME: &str = "files_done.tmp";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to walk sync root: {0}")]
    Walk(#[from] jwalk::Error),
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

/// Result of comparing the files on disk with the done log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub todo: Vec<String>,
    pub total: usize,
    pub todo_log: PathBuf,
    pub done_log: PathBuf,
}

impl Reconciliation {
    pub fn todo_count(&self) -> usize {
        self.todo.len()
    }
}

/// Todo/done bookkeeping for one sync root.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
    cache_dir: PathBuf,
}

impl StateStore {
    pub fn new(sync_root: &Path, cache_root: &Path) -> Self {
        Self {
            root: sync_root.to_path_buf(),
            cache_dir: cache_dir_for(cache_root, sync_root),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn todo_log_path(&self) -> PathBuf {
        self.cache_dir.join(TODO_LOG_NAME)
    }

    pub fn done_log_path(&self) -> PathBuf {
        self.cache_dir.join(DONE_LOG_NAME)
    }

    /// Recomputes `todo = files on disk - done` and overwrites the todo log.
    /// Blocking; run it off the async executor.
    pub fn reconcile(&self) -> Result<Reconciliation, StateError> {
        self.check_root()?;
        fs::create_dir_all(&self.cache_dir)?;

        let done = self.load_done()?;
        let current = self.scan()?;
        let total = current.len();
        let todo: Vec<String> = current
            .into_iter()
            .filter(|rel| !done.contains(rel))
            .collect();

        let todo_log = self.todo_log_path();
        write_path_log(&todo_log, &todo)?;
        debug!(
            root = %self.root.display(),
            total,
            done = done.len(),
            todo = todo.len(),
            "reconciled sync root"
        );

        Ok(Reconciliation {
            todo,
            total,
            todo_log,
            done_log: self.done_log_path(),
        })
    }

    /// Paths recorded in the done log; a missing log is an empty set.
    pub fn load_done(&self) -> Result<HashSet<String>, StateError> {
        match fs::File::open(self.done_log_path()) {
            Ok(file) => Ok(read_path_lines(BufReader::new(file))?.into_iter().collect()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn check_root(&self) -> Result<(), StateError> {
        if fs::metadata(&self.root)?.is_dir() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "sync root {} is not a directory",
                self.root.display()
            ))
            .into())
        }
    }

    /// Every regular file under the root as a relative POSIX path, in walk
    /// order. Symlinks to files count as files; symlinked directories are not
    /// descended. An unreadable directory fails the scan.
    pub fn scan(&self) -> Result<Vec<String>, StateError> {
        self.check_root()?;

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .skip_hidden(false)
            .follow_links(false)
        {
            let mut entry = entry?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                // jwalk yields the directory itself and parks the read error on it.
                if let Some(err) = entry.read_children_error.take() {
                    return Err(StateError::Walk(err));
                }
                continue;
            }
            let path = entry.path();
            let is_file = if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) => meta.is_file(),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping dangling symlink");
                        false
                    }
                }
            } else {
                file_type.is_file()
            };
            if !is_file {
                continue;
            }
            match relative_posix(&self.root, &path) {
                Ok(rel) => files.push(rel),
                Err(PathError::Unrepresentable) => {
                    warn!(path = %path.display(), "skipping file whose name cannot be logged");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(files)
    }

    pub async fn open_done_log(&self) -> Result<DoneLog, StateError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        DoneLog::open(self.done_log_path()).await
    }
}

/// Append-only record of confirmed uploads, shared by all workers.
#[derive(Debug)]
pub struct DoneLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl DoneLog {
    pub async fn open(path: PathBuf) -> Result<Self, StateError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one path and syncs it to disk before returning.
    pub async fn append(&self, rel_path: &str) -> Result<(), StateError> {
        let line = format!("{rel_path}\n");
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

pub fn read_path_lines<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        out.push(line.to_string());
    }
    Ok(out)
}

fn write_path_log(path: &Path, entries: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for entry in entries {
        writer.write_all(entry.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()
}
