//! The public façade: composes the task queue, worker pool, page cache,
//! source registry, rate limiters, circuit breakers, and progress tracker
//! into a single entry point for running searches to completion.
//!
//! Mirrors the teacher's top-level composition style — construct the
//! registries once, hand out `Arc`-shared clones to whatever drains them —
//! generalized from "one server holding one registry" to "one manager
//! holding a queue, a pool, and a cache".

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::config::EngineConfig;
use crate::models::{DuplicateCluster, Paper, SearchQuery, Task, TaskStatus};
use crate::queue::{QueueError, TaskQueue};
use crate::sources::SourceRegistry;
use crate::utils::{deduplicate_papers, CacheError, CacheService, CircuitBreakerManager, ProgressTracker, RateLimiterRegistry};
use crate::workers::{WorkerDeps, WorkerPool};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// A snapshot of overall run progress, returned by [`QueueManager::run_all`]'s
/// periodic progress callback and available at any time via [`QueueManager::task_status`].
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub queue_size: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub running: usize,
    pub papers_found: usize,
}

/// The deduplicated output of a run: canonical papers, the duplicate→canonical
/// map, and the clusters that produced it. See [`crate::utils::deduplicate_papers`].
#[derive(Debug, Clone)]
pub struct CorpusResult {
    pub canonical_papers: Vec<Paper>,
    pub clusters: Vec<DuplicateCluster>,
    pub duplicate_map: std::collections::HashMap<String, String>,
}

/// The façade composing C1–C8: queue, workers, cache, source registry, rate
/// limiters, circuit breakers, and progress tracker. Construct once per run;
/// `run_all` owns the worker pool's lifecycle for the duration of the call,
/// shutting it down on every exit path — success, queue exhaustion, or a
/// propagated error — so no worker or cache handle ever leaks past it.
pub struct QueueManager {
    queue: Arc<TaskQueue>,
    cache: Arc<tokio::sync::Mutex<CacheService>>,
    sources: Arc<SourceRegistry>,
    rate_limiters: Arc<RateLimiterRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    progress: Arc<ProgressTracker>,
    config: Arc<EngineConfig>,
}

impl QueueManager {
    /// Build a manager backed by an on-disk cache and journal at `cache_path`,
    /// configuring rate limiters and circuit breakers from `config`'s
    /// per-source overrides (falling back to the published defaults).
    pub fn open(cache_path: impl AsRef<Path>, config: EngineConfig) -> ManagerResult<Self> {
        let cache = CacheService::open(cache_path)?;
        Ok(Self::assemble(cache, TaskQueue::new(), config))
    }

    /// Build a manager with a journaled queue, resuming any non-terminal
    /// tasks left over from a previous run.
    pub fn open_with_journal(
        cache_path: impl AsRef<Path>,
        journal_path: impl AsRef<Path>,
        config: EngineConfig,
    ) -> ManagerResult<Self> {
        let cache = CacheService::open(cache_path)?;
        let queue = TaskQueue::open(journal_path)?;
        Ok(Self::assemble(cache, queue, config))
    }

    /// Build an entirely in-memory manager, for tests and dry runs.
    pub fn in_memory(config: EngineConfig) -> ManagerResult<Self> {
        let cache = CacheService::open_in_memory()?;
        Ok(Self::assemble(cache, TaskQueue::new(), config))
    }

    fn assemble(cache: CacheService, queue: TaskQueue, config: EngineConfig) -> Self {
        let sources = SourceRegistry::default();
        let rate_limiters = RateLimiterRegistry::new();
        let breakers = CircuitBreakerManager::new();

        for id in sources.ids() {
            rate_limiters.configure(id, config.rate_limit_for(id));
            breakers.configure(id, config.breaker_for(id));
        }

        Self {
            queue: Arc::new(queue),
            cache: Arc::new(tokio::sync::Mutex::new(cache)),
            sources: Arc::new(sources),
            rate_limiters: Arc::new(rate_limiters),
            breakers: Arc::new(breakers),
            progress: Arc::new(ProgressTracker::new()),
            config: Arc::new(config),
        }
    }

    /// Register another source alongside the four contractual adapters
    /// (e.g. a test double), configuring its rate limit and breaker from
    /// the manager's config.
    pub fn register_source(&mut self, source: Arc<dyn crate::sources::Source>) {
        let id = source.id().to_string();
        self.rate_limiters.configure(&id, self.config.rate_limit_for(&id));
        self.breakers.configure(&id, self.config.breaker_for(&id));
        Arc::get_mut(&mut self.sources)
            .expect("register_source must be called before run_all shares the registry")
            .register(source);
    }

    /// Enqueue one search task. Returns its id.
    pub fn add_search(&self, source: impl Into<String>, query: SearchQuery, priority: i32) -> ManagerResult<u64> {
        let source = source.into();
        let adapter_config = self.config.adapter(&source);
        Ok(self.queue.enqueue(source, query, priority, &adapter_config)?)
    }

    /// Enqueue several search tasks at once, in order, returning their ids.
    pub fn add_multiple(&self, tasks: Vec<(String, SearchQuery, i32)>) -> ManagerResult<Vec<u64>> {
        tasks
            .into_iter()
            .map(|(source, query, priority)| self.add_search(source, query, priority))
            .collect()
    }

    fn deps(&self) -> WorkerDeps {
        WorkerDeps {
            queue: Arc::clone(&self.queue),
            cache: Arc::clone(&self.cache),
            sources: Arc::clone(&self.sources),
            rate_limiters: Arc::clone(&self.rate_limiters),
            breakers: Arc::clone(&self.breakers),
            progress: Arc::clone(&self.progress),
            config: Arc::clone(&self.config),
        }
    }

    /// Spawn the configured worker pool and block until every submitted
    /// task reaches a terminal status. If `show_progress` is set, emits a
    /// [`RunSnapshot`] every `interval` to the given callback. The pool is
    /// always shut down before returning, including when called with an
    /// already-empty queue.
    pub async fn run_all(&self, show_progress: bool, interval_duration: Duration, mut on_progress: impl FnMut(RunSnapshot)) {
        let pool = WorkerPool::spawn(self.config.workers.worker_count, self.deps());
        let mut ticker = interval(interval_duration);

        loop {
            if self.queue.all_tasks().is_empty() || self.queue.all_terminal() {
                break;
            }
            ticker.tick().await;
            if show_progress {
                on_progress(self.snapshot());
            }
        }

        pool.shutdown().await;
    }

    /// Current snapshot of queue and progress-tracker counters.
    pub fn snapshot(&self) -> RunSnapshot {
        let tasks = self.queue.all_tasks();
        RunSnapshot {
            queue_size: self.queue.queue_size(),
            completed: tasks.iter().filter(|t| t.status == TaskStatus::Completed).count(),
            failed: tasks.iter().filter(|t| t.status == TaskStatus::Failed).count(),
            cancelled: tasks.iter().filter(|t| t.status == TaskStatus::Cancelled).count(),
            running: tasks.iter().filter(|t| t.status == TaskStatus::Running).count(),
            papers_found: self.progress.papers_found(),
        }
    }

    /// The papers fetched by one completed task, if it has terminated with results.
    pub fn get_results(&self, task_id: u64) -> Option<Vec<Paper>> {
        self.queue.results_for(task_id)
    }

    /// All papers fetched across every completed task, pooled without deduplication.
    pub fn get_all_results(&self) -> Vec<Paper> {
        self.queue
            .all_tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| self.queue.results_for(t.id))
            .flatten()
            .collect()
    }

    /// Deduplicate every completed task's results into a canonical corpus.
    /// Also records the deduplicated-paper delta against the progress tracker.
    pub fn deduplicate_all(&self) -> CorpusResult {
        let pooled = self.get_all_results();
        let input_count = pooled.len();
        let outcome = deduplicate_papers(pooled);
        self.progress.record_deduplicated(input_count.saturating_sub(outcome.papers.len()));
        CorpusResult {
            canonical_papers: outcome.papers,
            clusters: outcome.clusters,
            duplicate_map: outcome.duplicate_map,
        }
    }

    /// Cancel a task: removed directly if still pending, flagged for the
    /// owning worker to observe between pages if running.
    pub fn cancel(&self, task_id: u64) -> ManagerResult<()> {
        Ok(self.queue.cancel(task_id)?)
    }

    /// Number of tasks still waiting to be claimed.
    pub fn queue_size(&self) -> usize {
        self.queue.queue_size()
    }

    /// Current status of one task.
    pub fn task_status(&self, task_id: u64) -> Option<TaskStatus> {
        self.queue.status(task_id)
    }

    /// Full record for one task, including its error (if failed) and timestamps.
    pub fn task(&self, task_id: u64) -> Option<Task> {
        self.queue.get(task_id)
    }

    /// Prometheus-style text exposition of the progress tracker's counters.
    pub fn metrics_text(&self) -> String {
        self.progress.metrics_text()
    }

    /// Flush the cache's current state. The cache commits each page
    /// transactionally as it is written, so this is a convenience hook for
    /// callers who want an explicit sync point rather than a correctness
    /// requirement.
    pub async fn flush(&self) -> ManagerResult<()> {
        let cache = self.cache.lock().await;
        let _ = cache.stats()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageCursor;
    use crate::sources::MockSource;

    fn paper(title: &str) -> Paper {
        crate::models::PaperBuilder::new(title, "mock", "q", chrono::Utc::now())
            .year(2020)
            .build()
            .unwrap()
    }

    fn manager_with_mock() -> (QueueManager, Arc<MockSource>) {
        let mut manager = QueueManager::in_memory(EngineConfig::default()).unwrap();
        let mock = Arc::new(MockSource::new("mock"));
        manager.register_source(mock.clone());
        (manager, mock)
    }

    #[tokio::test]
    async fn test_run_all_completes_single_task_and_returns_results() {
        let (manager, mock) = manager_with_mock();
        mock.push_page(vec![paper("A"), paper("B")], PageCursor::End);

        let id = manager.add_search("mock", SearchQuery::new("q"), 0).unwrap();
        manager.run_all(false, Duration::from_millis(5), |_| {}).await;

        assert_eq!(manager.task_status(id), Some(TaskStatus::Completed));
        assert_eq!(manager.get_results(id).unwrap().len(), 2);
        assert_eq!(manager.get_all_results().len(), 2);
    }

    #[tokio::test]
    async fn test_add_multiple_enqueues_in_order() {
        let (manager, mock) = manager_with_mock();
        mock.push_page(vec![paper("A")], PageCursor::End);
        mock.push_page(vec![paper("B")], PageCursor::End);

        let ids = manager
            .add_multiple(vec![
                ("mock".to_string(), SearchQuery::new("q1"), 0),
                ("mock".to_string(), SearchQuery::new("q2"), 0),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);

        manager.run_all(false, Duration::from_millis(5), |_| {}).await;
        assert_eq!(manager.get_all_results().len(), 2);
    }

    #[tokio::test]
    async fn test_deduplicate_all_merges_shared_doi() {
        let (manager, mock) = manager_with_mock();
        let mut a = paper("Same Paper");
        a.doi = Some("10.1/x".to_string());
        let mut b = paper("Same Paper (preprint)");
        b.doi = Some("10.1/x".to_string());
        mock.push_page(vec![a], PageCursor::End);
        mock.push_page(vec![b], PageCursor::End);

        manager.add_search("mock", SearchQuery::new("q1"), 0).unwrap();
        manager.add_search("mock", SearchQuery::new("q2"), 0).unwrap();
        manager.run_all(false, Duration::from_millis(5), |_| {}).await;

        let corpus = manager.deduplicate_all();
        assert_eq!(corpus.canonical_papers.len(), 1);
        assert_eq!(corpus.clusters[0].size(), 2);
        assert_eq!(corpus.duplicate_map.len(), 2);
        let canonical_id = corpus.canonical_papers[0].paper_id.clone();
        assert!(corpus.duplicate_map.values().all(|v| *v == canonical_id));
    }

    #[tokio::test]
    async fn test_cancel_pending_task_before_run() {
        let (manager, _mock) = manager_with_mock();
        let id = manager.add_search("mock", SearchQuery::new("q"), 0).unwrap();
        manager.cancel(id).unwrap();
        assert_eq!(manager.task_status(id), Some(TaskStatus::Cancelled));
        assert_eq!(manager.queue_size(), 0);
    }

    #[tokio::test]
    async fn test_run_all_with_empty_queue_returns_immediately() {
        let (manager, _mock) = manager_with_mock();
        manager.run_all(false, Duration::from_millis(5), |_| {}).await;
        assert_eq!(manager.get_all_results().len(), 0);
    }

    #[tokio::test]
    async fn test_metrics_text_reports_completed_task() {
        let (manager, mock) = manager_with_mock();
        mock.push_page(vec![paper("A")], PageCursor::End);
        manager.add_search("mock", SearchQuery::new("q"), 0).unwrap();
        manager.run_all(false, Duration::from_millis(5), |_| {}).await;

        let metrics = manager.metrics_text();
        assert!(metrics.contains("litreview_tasks_completed_total 1"));
    }
}
