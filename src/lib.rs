//! # litreview-engine
//!
//! A concurrent, resumable, multi-source literature acquisition engine for
//! systematic reviews: fan a query out across arXiv, OpenAlex, Semantic
//! Scholar, and CrossRef, page through results with durable resume state,
//! and deduplicate the merged corpus into a canonical paper set.
//!
//! ## Architecture
//!
//! - [`models`]: core data structures (`Paper`, `SearchQuery`, `Task`, ...)
//! - [`sources`]: the four contractual source adapters behind one trait
//! - [`queue`]: the persistent, resumable task queue
//! - [`workers`]: the bounded-concurrency worker pool draining the queue
//! - [`manager`]: the façade composing queue, workers, cache, and registry
//! - [`utils`]: HTTP client, rate limiting, circuit breaking, retry,
//!   deduplication, page cache, and progress tracking
//! - [`config`]: configuration loading and layering

pub mod config;
pub mod manager;
pub mod models;
pub mod queue;
pub mod sources;
pub mod utils;
pub mod workers;

// Re-export commonly used types
pub use manager::QueueManager;
pub use models::Paper;
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
