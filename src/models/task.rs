//! Task queue records: one task per (source, query) pagination job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::{PageCursor, QueryIdentity, SearchQuery};
use crate::config::AdapterConfig;

/// Lifecycle state of a [`Task`]. Transitions: `Pending -> Running ->
/// {Completed, Failed, Cancelled}`. `Running -> Pending` happens when a
/// worker requeues a task after a retryable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// A unit of work: fetch the next page of one source's results for one query.
///
/// Accumulated papers are not carried inline here — they live in the page
/// cache and the queue's result table, keyed by this task's identity, so a
/// completed task's record stays small regardless of how many papers it
/// fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub source: String,
    pub query: SearchQuery,
    pub identity: QueryIdentity,
    pub cursor: PageCursor,
    pub priority: i32,
    pub status: TaskStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: u64,
        source: impl Into<String>,
        query: SearchQuery,
        priority: i32,
        adapter_config: &AdapterConfig,
    ) -> Self {
        Self::with_created_at(id, source, query, priority, Utc::now(), adapter_config)
    }

    /// Construct with an explicit creation timestamp, for journal replay
    /// where `Utc::now()` would not reproduce the original record.
    pub fn with_created_at(
        id: u64,
        source: impl Into<String>,
        query: SearchQuery,
        priority: i32,
        created_at: DateTime<Utc>,
        adapter_config: &AdapterConfig,
    ) -> Self {
        let source = source.into();
        let identity = QueryIdentity::new(source.clone(), &query, adapter_config);
        Self {
            id,
            source,
            query,
            identity,
            cursor: PageCursor::Start,
            priority,
            status: TaskStatus::Pending,
            attempts: 0,
            error: None,
            created_at,
            started_at: None,
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_task_new_starts_pending_at_start_cursor() {
        let task = Task::new(1, "arxiv", SearchQuery::new("q"), 0, &AdapterConfig::default());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.cursor, PageCursor::Start);
        assert_eq!(task.attempts, 0);
    }
}
