//! Bounded-concurrency worker pool draining the task queue.
//!
//! Each worker is a long-lived tokio task running the same loop: claim a
//! task, resolve it against the page cache, then page through the source
//! until the query ends, is cancelled, or exhausts its retry budget. Workers
//! share one `RateLimiterRegistry`/`CircuitBreakerManager`/`CacheService`
//! instance via `Arc`, mirroring the teacher's `Arc<HttpClient>` sharing
//! pattern across source adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{AdapterConfig, EngineConfig};
use crate::models::{DateRange, PageCursor, Paper, Task};
use crate::queue::TaskQueue;
use crate::sources::{SearchPage, Source, SourceError, SourceRegistry};
use crate::utils::{
    api_retry_config, classify_error, with_retry_detailed, CacheService, CircuitBreaker, CircuitBreakerManager,
    ErrorKind, ProgressTracker, RateLimiter, RateLimiterRegistry, RetryConfig, RetryResult,
};

/// Everything a worker needs to run a task, shared across the pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<TaskQueue>,
    pub cache: Arc<tokio::sync::Mutex<CacheService>>,
    pub sources: Arc<SourceRegistry>,
    pub rate_limiters: Arc<RateLimiterRegistry>,
    pub breakers: Arc<CircuitBreakerManager>,
    pub progress: Arc<ProgressTracker>,
    pub config: Arc<EngineConfig>,
}

/// A fixed pool of N long-lived workers, each draining `deps.queue` until
/// told to shut down.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: broadcast::Sender<()>,
}

impl WorkerPool {
    /// Spawn `count` workers against the given dependencies.
    pub fn spawn(count: usize, deps: WorkerDeps) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let deps = deps.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            tracing::debug!(worker_id = id, "worker shutting down");
                            break;
                        }
                        task = deps.queue.claim_next() => {
                            run_task(&deps, task).await;
                        }
                    }
                }
            }));
        }

        Self {
            handles,
            shutdown: shutdown_tx,
        }
    }

    /// Signal every worker to stop after its current task and wait for them
    /// to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

fn cancelled(flag: &Option<Arc<AtomicBool>>) -> bool {
    flag.as_ref().map(|f| f.load(Ordering::SeqCst)).unwrap_or(false)
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::RateLimit => "rate_limit",
        ErrorKind::Network => "network",
        ErrorKind::Api => "api",
        ErrorKind::Parse => "parse",
        ErrorKind::Validation => "validation",
        ErrorKind::Permanent => "permanent",
        ErrorKind::CircuitOpen => "circuit_open",
    }
}

fn complete_task(deps: &WorkerDeps, task_id: u64, papers: Vec<Paper>) {
    let count = papers.len();
    if deps.queue.complete(task_id, papers).is_ok() {
        deps.progress.record_task_completed();
        tracing::info!(task_id, papers = count, "task completed");
    }
}

/// Mark a task failed and record it against `kind_label` in the progress
/// tracker. Callers choose the label, since only some failures originate
/// from a classified [`SourceError`].
fn fail_task(deps: &WorkerDeps, task_id: u64, kind_label: &str, error: impl Into<String>) {
    let error = error.into();
    deps.progress.record_task_failed(kind_label);
    if deps.queue.fail(task_id, &error).is_ok() {
        tracing::warn!(task_id, %error, "task failed");
    }
}

/// Fetch one page: acquire a rate-limit token, call the adapter, and record
/// the outcome against the circuit breaker. A `RATE_LIMIT` response also
/// forces the limiter empty until the server's requested (or a default)
/// cooldown elapses.
async fn fetch_page(
    source: &dyn Source,
    breaker: &CircuitBreaker,
    limiter: &RateLimiter,
    adapter_config: &AdapterConfig,
    query_text: &str,
    date_range: DateRange,
    limit: usize,
    cursor: &PageCursor,
) -> Result<SearchPage, SourceError> {
    limiter.acquire().await;

    match source.search(query_text, date_range, limit, adapter_config, cursor).await {
        Ok(page) => {
            breaker.record_success();
            Ok(page)
        }
        Err(err) => {
            breaker.record_failure();
            if matches!(classify_error(&err), ErrorKind::RateLimit) {
                let retry_after = match &err {
                    SourceError::RateLimitAfter(secs) => Duration::from_secs(*secs),
                    _ => Duration::from_secs(30),
                };
                limiter.reset_after(retry_after);
            }
            Err(err)
        }
    }
}

/// Run one claimed task to a terminal status: `Completed`, `Failed`, or
/// `Cancelled`. Implements the worker loop of the design: register with the
/// cache, short-circuit if already complete, then page through the source
/// with classified retry until the query ends.
async fn run_task(deps: &WorkerDeps, task: Task) {
    let query_key = task.identity.key();
    let cancel_flag = deps.queue.cancel_flag(task.id);

    let source = match deps.sources.get_required(&task.source) {
        Ok(s) => Arc::clone(s),
        Err(err) => {
            fail_task(deps, task.id, "permanent", err.to_string());
            return;
        }
    };

    let resume_result = {
        let cache = deps.cache.lock().await;
        cache.resume_cursor(&query_key, &task.source, &task.identity.normalized_text)
    };
    let mut cursor = match resume_result {
        Ok(c) => c,
        Err(err) => {
            fail_task(deps, task.id, "cache", format!("cache error: {err}"));
            return;
        }
    };

    let already_done = {
        let cache = deps.cache.lock().await;
        cache.is_completed(&query_key)
    };
    match already_done {
        Ok(true) => {
            let papers = {
                let cache = deps.cache.lock().await;
                cache.papers_for(&query_key).unwrap_or_default()
            };
            complete_task(deps, task.id, papers);
            return;
        }
        Ok(false) => {}
        Err(err) => {
            fail_task(deps, task.id, "cache", format!("cache error: {err}"));
            return;
        }
    }

    let mut page_index = {
        let cache = deps.cache.lock().await;
        cache.page_count(&query_key).unwrap_or(0)
    };

    let adapter_config = deps.config.adapter(&task.source);
    let max_retries = deps.config.max_retries_for(&task.source);
    let breaker = deps.breakers.get(&task.source);
    let limiter = deps.rate_limiters.get(&task.source);

    loop {
        if cancelled(&cancel_flag) {
            let _ = deps.queue.cancel(task.id);
            return;
        }

        let retry_config = RetryConfig {
            max_attempts: max_retries,
            ..api_retry_config()
        };

        let mut operation = || {
            fetch_page(
                source.as_ref(),
                breaker.as_ref(),
                limiter.as_ref(),
                &adapter_config,
                &task.query.text,
                task.query.date_range,
                task.query.limit,
                &cursor,
            )
        };

        match with_retry_detailed(retry_config, Some(breaker.as_ref()), &mut operation).await {
            RetryResult::Success(page) => {
                let store_result = {
                    let mut cache = deps.cache.lock().await;
                    cache.store_page(&query_key, page_index, &page.raw_blob, &page.papers, &page.next_cursor)
                };
                if let Err(err) = store_result {
                    fail_task(deps, task.id, "cache", format!("cache write failed: {err}"));
                    return;
                }

                deps.progress.record_papers_found(&task.source, page.papers.len());
                page_index += 1;
                let _ = deps.queue.advance_cursor(task.id, page.next_cursor.clone());

                if page.is_last_page() {
                    let papers = {
                        let cache = deps.cache.lock().await;
                        cache.papers_for(&query_key).unwrap_or_default()
                    };
                    complete_task(deps, task.id, papers);
                    return;
                }

                cursor = page.next_cursor;
            }
            RetryResult::TransientFailure(err, kind, attempts) => {
                fail_task(deps, task.id, kind_label(kind), format!("exhausted {attempts} attempts: {err}"));
                return;
            }
            RetryResult::PermanentFailure(err) => {
                let kind = classify_error(&err);
                fail_task(deps, task.id, kind_label(kind), err.to_string());
                return;
            }
        }
    }
}
