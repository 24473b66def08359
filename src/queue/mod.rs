//! Persistent, priority-ordered task queue.
//!
//! Tasks are held in memory, indexed by id, with a separate min-priority
//! heap (lowest priority number first, FIFO tie-break on creation order)
//! driving `claim_next`. Every creation and status transition is appended to
//! a JSONL journal so a restart can reconstruct all non-terminal tasks —
//! the same append-only-log idea the teacher used for request history,
//! generalized here to task lifecycle events.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use chrono::Utc;

use crate::config::AdapterConfig;
use crate::models::{Paper, PageCursor, SearchQuery, Task, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task {0} not found")]
    NotFound(u64),

    #[error("task {0} is in terminal state {1:?} and cannot transition")]
    InvalidTransition(u64, TaskStatus),

    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// One journaled lifecycle event, replayed on restart to reconstruct the
/// set of non-terminal tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum JournalEvent {
    Created { task: Task },
    StatusChanged { task_id: u64, status: TaskStatus },
    CursorAdvanced { task_id: u64, cursor: PageCursor },
}

struct PendingKey {
    priority: i32,
    seq: u64,
    task_id: u64,
}

impl PartialEq for PendingKey {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for PendingKey {}

impl PartialOrd for PendingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingKey {
    // BinaryHeap is a max-heap; invert priority and sequence so `pop()`
    // yields the lowest priority number, FIFO among ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A priority-ordered, journaled set of fetch tasks.
pub struct TaskQueue {
    tasks: RwLock<HashMap<u64, Task>>,
    results: RwLock<HashMap<u64, Vec<Paper>>>,
    errors: RwLock<HashMap<u64, String>>,
    cancel_flags: RwLock<HashMap<u64, Arc<AtomicBool>>>,
    pending: Mutex<BinaryHeap<PendingKey>>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
    notify: Notify,
    journal: Option<Mutex<File>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.tasks.read().expect("RwLock poisoned").len())
            .finish()
    }
}

impl TaskQueue {
    /// Create an in-memory queue with no journal (used by tests and dry runs).
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
            cancel_flags: RwLock::new(HashMap::new()),
            pending: Mutex::new(BinaryHeap::new()),
            next_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
            notify: Notify::new(),
            journal: None,
        }
    }

    /// Open (or create) a journal file at `path`, replaying any existing
    /// entries. Any task still `Running` at the end of the journal is reset
    /// to `Pending`, per the crash-recovery rule: at most one worker may
    /// hold a task `Running`, and a crash releases that hold.
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut queue = Self::new();

        if path.exists() {
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let event: JournalEvent = serde_json::from_str(&line)?;
                queue.apply_replayed(event);
            }
        }

        for task in queue.tasks.write().expect("RwLock poisoned").values_mut() {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
            }
        }
        let pending_ids: Vec<(i32, u64)> = queue
            .tasks
            .read()
            .expect("RwLock poisoned")
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| (t.priority, t.id))
            .collect();
        {
            let mut heap = queue.pending.lock().expect("mutex poisoned");
            for (priority, task_id) in pending_ids {
                let seq = queue.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
                heap.push(PendingKey { priority, seq, task_id });
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        queue.journal = Some(Mutex::new(file));
        Ok(queue)
    }

    fn apply_replayed(&mut self, event: JournalEvent) {
        match event {
            JournalEvent::Created { task } => {
                self.next_id.fetch_max(task.id + 1, AtomicOrdering::SeqCst);
                self.tasks.write().expect("RwLock poisoned").insert(task.id, task);
            }
            JournalEvent::StatusChanged { task_id, status } => {
                if let Some(task) = self.tasks.write().expect("RwLock poisoned").get_mut(&task_id) {
                    task.status = status;
                }
            }
            JournalEvent::CursorAdvanced { task_id, cursor } => {
                if let Some(task) = self.tasks.write().expect("RwLock poisoned").get_mut(&task_id) {
                    task.cursor = cursor;
                }
            }
        }
    }

    fn append_journal(&self, event: &JournalEvent) -> QueueResult<()> {
        if let Some(journal) = &self.journal {
            let mut file = journal.lock().expect("mutex poisoned");
            let line = serde_json::to_string(event)?;
            writeln!(file, "{}", line)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Enqueue a new task in `Pending` status. Returns its id.
    pub fn enqueue(
        &self,
        source: impl Into<String>,
        query: SearchQuery,
        priority: i32,
        adapter_config: &AdapterConfig,
    ) -> QueueResult<u64> {
        let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
        let task = Task::new(id, source, query, priority, adapter_config);

        self.append_journal(&JournalEvent::Created { task: task.clone() })?;

        self.tasks.write().expect("RwLock poisoned").insert(id, task);
        self.cancel_flags
            .write()
            .expect("RwLock poisoned")
            .insert(id, Arc::new(AtomicBool::new(false)));

        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        self.pending.lock().expect("mutex poisoned").push(PendingKey { priority, seq, task_id: id });
        self.notify.notify_one();

        Ok(id)
    }

    /// Atomically claim the highest-priority pending task, marking it
    /// `Running`. Suspends the caller until a task becomes available.
    pub async fn claim_next(&self) -> Task {
        loop {
            let claimed = {
                let mut heap = self.pending.lock().expect("mutex poisoned");
                loop {
                    let Some(entry) = heap.pop() else {
                        break None;
                    };
                    let mut tasks = self.tasks.write().expect("RwLock poisoned");
                    if let Some(task) = tasks.get_mut(&entry.task_id) {
                        if task.status == TaskStatus::Pending {
                            task.status = TaskStatus::Running;
                            task.started_at = Some(Utc::now());
                            break Some(task.clone());
                        }
                        // stale entry (task was cancelled while pending); drop and keep scanning
                    }
                }
            };

            if let Some(task) = claimed {
                let _ = self.append_journal(&JournalEvent::StatusChanged {
                    task_id: task.id,
                    status: TaskStatus::Running,
                });
                return task;
            }

            self.notify.notified().await;
        }
    }

    fn set_terminal_status(&self, task_id: u64, status: TaskStatus, error: Option<&str>) -> QueueResult<()> {
        {
            let mut tasks = self.tasks.write().expect("RwLock poisoned");
            let task = tasks.get_mut(&task_id).ok_or(QueueError::NotFound(task_id))?;
            if task.status.is_terminal() {
                return Err(QueueError::InvalidTransition(task_id, task.status));
            }
            task.status = status;
            task.finished_at = Some(Utc::now());
            if let Some(error) = error {
                task.error = Some(error.to_string());
            }
        }
        self.append_journal(&JournalEvent::StatusChanged { task_id, status })
    }

    /// Mark a task completed and record its fetched papers.
    pub fn complete(&self, task_id: u64, papers: Vec<Paper>) -> QueueResult<()> {
        self.set_terminal_status(task_id, TaskStatus::Completed, None)?;
        self.results.write().expect("RwLock poisoned").insert(task_id, papers);
        Ok(())
    }

    /// Mark a task failed with a descriptive error.
    pub fn fail(&self, task_id: u64, error: impl Into<String>) -> QueueResult<()> {
        let error = error.into();
        self.set_terminal_status(task_id, TaskStatus::Failed, Some(&error))?;
        self.errors.write().expect("RwLock poisoned").insert(task_id, error);
        Ok(())
    }

    /// Cancel a task. If it is still `Pending`, it is removed directly; if
    /// `Running`, its cancel flag is set for the owning worker to observe
    /// between pages.
    pub fn cancel(&self, task_id: u64) -> QueueResult<()> {
        let was_pending = {
            let mut tasks = self.tasks.write().expect("RwLock poisoned");
            let task = tasks.get_mut(&task_id).ok_or(QueueError::NotFound(task_id))?;
            if task.status.is_terminal() {
                return Err(QueueError::InvalidTransition(task_id, task.status));
            }
            let was_pending = task.status == TaskStatus::Pending;
            task.status = TaskStatus::Cancelled;
            task.finished_at = Some(Utc::now());
            was_pending
        };

        if !was_pending {
            if let Some(flag) = self.cancel_flags.read().expect("RwLock poisoned").get(&task_id) {
                flag.store(true, AtomicOrdering::SeqCst);
            }
        }

        self.append_journal(&JournalEvent::StatusChanged {
            task_id,
            status: TaskStatus::Cancelled,
        })
    }

    /// The cancel flag a worker should poll between pages while running this task.
    pub fn cancel_flag(&self, task_id: u64) -> Option<Arc<AtomicBool>> {
        self.cancel_flags.read().expect("RwLock poisoned").get(&task_id).cloned()
    }

    /// Record the pagination cursor a worker has advanced to, for
    /// observability and journal replay (the cache remains the source of
    /// truth for resumption).
    pub fn advance_cursor(&self, task_id: u64, cursor: PageCursor) -> QueueResult<()> {
        {
            let mut tasks = self.tasks.write().expect("RwLock poisoned");
            let task = tasks.get_mut(&task_id).ok_or(QueueError::NotFound(task_id))?;
            task.cursor = cursor.clone();
        }
        self.append_journal(&JournalEvent::CursorAdvanced { task_id, cursor })
    }

    /// Record a retry attempt against a task's current page.
    pub fn record_attempt(&self, task_id: u64) -> QueueResult<u32> {
        let mut tasks = self.tasks.write().expect("RwLock poisoned");
        let task = tasks.get_mut(&task_id).ok_or(QueueError::NotFound(task_id))?;
        task.attempts += 1;
        Ok(task.attempts)
    }

    pub fn status(&self, task_id: u64) -> Option<TaskStatus> {
        self.tasks.read().expect("RwLock poisoned").get(&task_id).map(|t| t.status)
    }

    pub fn get(&self, task_id: u64) -> Option<Task> {
        self.tasks.read().expect("RwLock poisoned").get(&task_id).cloned()
    }

    pub fn results_for(&self, task_id: u64) -> Option<Vec<Paper>> {
        self.results.read().expect("RwLock poisoned").get(&task_id).cloned()
    }

    pub fn error_for(&self, task_id: u64) -> Option<String> {
        self.errors.read().expect("RwLock poisoned").get(&task_id).cloned()
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        self.tasks.read().expect("RwLock poisoned").values().cloned().collect()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .read()
            .expect("RwLock poisoned")
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Number of tasks still waiting to be claimed. Counts by status rather
    /// than the raw heap length, since a cancelled pending task's
    /// `PendingKey` is left in the heap as a stale entry for `claim_next` to
    /// lazily drop rather than removed eagerly here.
    pub fn queue_size(&self) -> usize {
        self.tasks
            .read()
            .expect("RwLock poisoned")
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Whether every task has reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.tasks.read().expect("RwLock poisoned").values().all(|t| t.status.is_terminal())
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchQuery;

    #[tokio::test]
    async fn test_enqueue_and_claim_next() {
        let queue = TaskQueue::new();
        let id = queue.enqueue("arxiv", SearchQuery::new("neural nets"), 0, &AdapterConfig::default()).unwrap();

        let task = queue.claim_next().await;
        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(queue.status(id), Some(TaskStatus::Running));
    }

    #[tokio::test]
    async fn test_claim_next_respects_priority_then_fifo() {
        let queue = TaskQueue::new();
        let low_priority = queue.enqueue("arxiv", SearchQuery::new("a"), 5, &AdapterConfig::default()).unwrap();
        let high_priority = queue.enqueue("arxiv", SearchQuery::new("b"), 1, &AdapterConfig::default()).unwrap();
        let also_high_priority = queue.enqueue("arxiv", SearchQuery::new("c"), 1, &AdapterConfig::default()).unwrap();

        assert_eq!(queue.claim_next().await.id, high_priority);
        assert_eq!(queue.claim_next().await.id, also_high_priority);
        assert_eq!(queue.claim_next().await.id, low_priority);
    }

    #[tokio::test]
    async fn test_complete_records_results() {
        let queue = TaskQueue::new();
        let id = queue.enqueue("arxiv", SearchQuery::new("q"), 0, &AdapterConfig::default()).unwrap();
        queue.claim_next().await;

        let paper = crate::models::PaperBuilder::new("T", "arxiv", "q", chrono::Utc::now())
            .year(2020)
            .build()
            .unwrap();
        queue.complete(id, vec![paper]).unwrap();

        assert_eq!(queue.status(id), Some(TaskStatus::Completed));
        assert_eq!(queue.results_for(id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_records_error_and_is_terminal() {
        let queue = TaskQueue::new();
        let id = queue.enqueue("arxiv", SearchQuery::new("q"), 0, &AdapterConfig::default()).unwrap();
        queue.claim_next().await;
        queue.fail(id, "boom").unwrap();

        assert_eq!(queue.status(id), Some(TaskStatus::Failed));
        assert_eq!(queue.error_for(id).as_deref(), Some("boom"));
        assert!(queue.complete(id, Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_cancel_pending_task_directly() {
        let queue = TaskQueue::new();
        let id = queue.enqueue("arxiv", SearchQuery::new("q"), 0, &AdapterConfig::default()).unwrap();
        queue.cancel(id).unwrap();
        assert_eq!(queue.status(id), Some(TaskStatus::Cancelled));
        assert_eq!(queue.queue_size(), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_task_sets_flag() {
        let queue = TaskQueue::new();
        let id = queue.enqueue("arxiv", SearchQuery::new("q"), 0, &AdapterConfig::default()).unwrap();
        queue.claim_next().await;
        queue.cancel(id).unwrap();

        let flag = queue.cancel_flag(id).unwrap();
        assert!(flag.load(AtomicOrdering::SeqCst));
    }

    #[tokio::test]
    async fn test_journal_replay_resets_running_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        {
            let queue = TaskQueue::open(&path).unwrap();
            let id = queue.enqueue("arxiv", SearchQuery::new("q"), 0, &AdapterConfig::default()).unwrap();
            let task = queue.claim_next().await;
            assert_eq!(task.id, id);
        }

        let reopened = TaskQueue::open(&path).unwrap();
        assert_eq!(reopened.tasks_by_status(TaskStatus::Pending).len(), 1);
        assert_eq!(reopened.queue_size(), 1);
    }
}
