//! Progress and metrics accounting for long-running runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Engine-wide progress and metrics accounting: counts tasks and papers by
/// outcome, broken down per source and per error kind, and renders a
/// Prometheus-style text export.
#[derive(Debug)]
pub struct ProgressTracker {
    start_time: Instant,
    papers_found: AtomicUsize,
    papers_deduplicated: AtomicUsize,
    tasks_completed: AtomicUsize,
    tasks_failed: AtomicUsize,
    errors_by_kind: std::sync::RwLock<std::collections::HashMap<String, usize>>,
    papers_by_source: std::sync::RwLock<std::collections::HashMap<String, usize>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            papers_found: AtomicUsize::new(0),
            papers_deduplicated: AtomicUsize::new(0),
            tasks_completed: AtomicUsize::new(0),
            tasks_failed: AtomicUsize::new(0),
            errors_by_kind: std::sync::RwLock::new(std::collections::HashMap::new()),
            papers_by_source: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn record_papers_found(&self, source: &str, count: usize) {
        self.papers_found.fetch_add(count, Ordering::SeqCst);
        let mut guard = self.papers_by_source.write().expect("RwLock poisoned");
        *guard.entry(source.to_string()).or_insert(0) += count;
    }

    pub fn record_deduplicated(&self, count: usize) {
        self.papers_deduplicated.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_task_failed(&self, error_kind: &str) {
        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.errors_by_kind.write().expect("RwLock poisoned");
        *guard.entry(error_kind.to_string()).or_insert(0) += 1;
    }

    pub fn papers_found(&self) -> usize {
        self.papers_found.load(Ordering::SeqCst)
    }

    pub fn tasks_completed(&self) -> usize {
        self.tasks_completed.load(Ordering::SeqCst)
    }

    pub fn tasks_failed(&self) -> usize {
        self.tasks_failed.load(Ordering::SeqCst)
    }

    /// Throughput in papers found per minute of wall-clock since creation.
    pub fn papers_per_minute(&self) -> f64 {
        let minutes = self.start_time.elapsed().as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        self.papers_found() as f64 / minutes
    }

    /// Render a Prometheus text-exposition snapshot of current counters.
    pub fn metrics_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# TYPE litreview_papers_found_total counter\n");
        out.push_str(&format!("litreview_papers_found_total {}\n", self.papers_found()));
        out.push_str("# TYPE litreview_papers_deduplicated_total counter\n");
        out.push_str(&format!(
            "litreview_papers_deduplicated_total {}\n",
            self.papers_deduplicated.load(Ordering::SeqCst)
        ));
        out.push_str("# TYPE litreview_tasks_completed_total counter\n");
        out.push_str(&format!("litreview_tasks_completed_total {}\n", self.tasks_completed()));
        out.push_str("# TYPE litreview_tasks_failed_total counter\n");
        out.push_str(&format!("litreview_tasks_failed_total {}\n", self.tasks_failed()));

        out.push_str("# TYPE litreview_errors_total counter\n");
        for (kind, count) in self.errors_by_kind.read().expect("RwLock poisoned").iter() {
            out.push_str(&format!("litreview_errors_total{{kind=\"{}\"}} {}\n", kind, count));
        }

        out.push_str("# TYPE litreview_papers_by_source_total counter\n");
        for (source, count) in self.papers_by_source.read().expect("RwLock poisoned").iter() {
            out.push_str(&format!("litreview_papers_by_source_total{{source=\"{}\"}} {}\n", source, count));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_counts() {
        let tracker = ProgressTracker::new();
        tracker.record_papers_found("arxiv", 10);
        tracker.record_papers_found("openalex", 5);
        tracker.record_deduplicated(3);
        tracker.record_task_completed();
        tracker.record_task_failed("network");

        assert_eq!(tracker.papers_found(), 15);
        assert_eq!(tracker.tasks_completed(), 1);
        assert_eq!(tracker.tasks_failed(), 1);
    }

    #[test]
    fn test_progress_tracker_metrics_text_contains_counters() {
        let tracker = ProgressTracker::new();
        tracker.record_papers_found("arxiv", 4);
        tracker.record_task_failed("rate_limit");

        let text = tracker.metrics_text();
        assert!(text.contains("litreview_papers_found_total 4"));
        assert!(text.contains("litreview_papers_by_source_total{source=\"arxiv\"} 4"));
        assert!(text.contains("litreview_errors_total{kind=\"rate_limit\"} 1"));
    }
}
