use std::collections::VecDeque;
use std::path::PathBuf;

use super::paths::file_name;

/// One file waiting to be uploaded into an already-resolved remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub rel_path: String,
    pub parent_id: String,
    pub retries: u32,
}

impl UploadTask {
    pub fn new(local_path: PathBuf, rel_path: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            local_path,
            rel_path: rel_path.into(),
            parent_id: parent_id.into(),
            retries: 0,
        }
    }

    /// Remote object name: the last segment of the relative path.
    pub fn file_name(&self) -> &str {
        file_name(&self.rel_path)
    }
}

/// Pending uploads in dispatch order. Retried tasks rejoin at the back.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: VecDeque<UploadTask>,
}

impl TaskQueue {
    pub fn enqueue(&mut self, task: UploadTask) {
        self.inner.push_back(task);
    }

    pub fn dequeue(&mut self) -> Option<UploadTask> {
        self.inner.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadTask> {
        self.inner.iter()
    }
}

impl FromIterator<UploadTask> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = UploadTask>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(rel: &str, parent: &str) -> UploadTask {
        UploadTask::new(PathBuf::from("/sync").join(rel), rel, parent)
    }

    #[test]
    fn dispatches_in_todo_order_then_drains() {
        let mut queue: TaskQueue = [task("a.txt", "root"), task("sub/b.txt", "sub-id")]
            .into_iter()
            .collect();

        assert_eq!(queue.len(), 2);
        let first = queue.dequeue().unwrap();
        assert_eq!(first.rel_path, "a.txt");
        assert_eq!(first.retries, 0);
        let second = queue.dequeue().unwrap();
        assert_eq!(second.file_name(), "b.txt");
        assert_eq!(second.parent_id, "sub-id");
        assert!(queue.dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn requeued_task_keeps_its_retry_count_and_goes_last() {
        let mut queue: TaskQueue = [task("a.txt", "root"), task("b.txt", "root")]
            .into_iter()
            .collect();

        let mut retried = queue.dequeue().unwrap();
        retried.retries += 1;
        queue.enqueue(retried);

        let order: Vec<_> = queue.iter().map(|t| (t.rel_path.as_str(), t.retries)).collect();
        assert_eq!(order, vec![("b.txt", 0), ("a.txt", 1)]);
    }
}
