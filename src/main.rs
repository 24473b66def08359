//! Thin demonstration binary driving [`litreview_engine::QueueManager`].
//!
//! The CLI surface proper — subcommands, interactive review workflows,
//! export formats — is an external collaborator's concern; this binary only
//! exercises the library end-to-end: submit one query against one or more
//! sources, run it to completion, and print the deduplicated result.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use litreview_engine::config::{self, EngineConfig};
use litreview_engine::manager::QueueManager;
use litreview_engine::models::SearchQuery;

#[derive(Parser, Debug)]
#[command(name = "litreview-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent, resumable multi-source literature acquisition engine", long_about = None)]
struct Args {
    /// Free-text search query.
    query: String,

    /// Comma-separated source ids to search (arxiv, openalex, semantic, crossref).
    #[arg(long, value_delimiter = ',', default_values_t = [
        "arxiv".to_string(), "openalex".to_string(), "semantic".to_string(), "crossref".to_string(),
    ])]
    sources: Vec<String>,

    /// Maximum records to fetch per source.
    #[arg(long, default_value_t = 100)]
    limit: usize,

    /// Path to the on-disk cache database. Defaults to the platform cache dir.
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Path to a TOML config file, layered over the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a progress line every `progress_interval_secs` seconds while running.
    #[arg(long, default_value_t = false)]
    progress: bool,

    #[arg(long, default_value_t = 5)]
    progress_interval_secs: u64,

    /// Enable verbose logging.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = if args.verbose {
        tracing::level_filters::LevelFilter::DEBUG
    } else {
        tracing::level_filters::LevelFilter::INFO
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("litreview_engine={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("litreview-engine v{}", env!("CARGO_PKG_VERSION"));

    let engine_config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::find_config_file().map(|p| config::load_config(&p)).transpose()?.unwrap_or_else(EngineConfig::default),
    };

    let cache_path = args.cache_path.unwrap_or_else(config::default_cache_path);
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = QueueManager::open(&cache_path, engine_config)?;

    let query = SearchQuery::new(args.query.clone()).limit(args.limit);
    let task_ids = manager.add_multiple(args.sources.iter().map(|s| (s.clone(), query.clone(), 0)).collect())?;
    tracing::info!(tasks = task_ids.len(), query = %args.query, "submitted search");

    manager
        .run_all(args.progress, Duration::from_secs(args.progress_interval_secs), |snapshot| {
            tracing::info!(
                queue_size = snapshot.queue_size,
                running = snapshot.running,
                completed = snapshot.completed,
                failed = snapshot.failed,
                papers_found = snapshot.papers_found,
                "progress"
            );
        })
        .await;

    for &task_id in &task_ids {
        if let Some(task) = manager.task(task_id) {
            if task.status == litreview_engine::models::TaskStatus::Failed {
                tracing::warn!(task_id, source = %task.source, error = ?task.error, "task failed");
            }
        }
    }

    let corpus = manager.deduplicate_all();
    tracing::info!(
        canonical_papers = corpus.canonical_papers.len(),
        clusters = corpus.clusters.len(),
        "deduplication complete"
    );

    let output = serde_json::json!({
        "query": args.query,
        "sources": args.sources,
        "canonical_paper_count": corpus.canonical_papers.len(),
        "duplicate_cluster_count": corpus.clusters.iter().filter(|c| !c.is_singleton()).count(),
        "papers": corpus.canonical_papers,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
