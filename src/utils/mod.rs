//! Utility modules supporting the acquisition engine.
//!
//! - [`identifiers`]: DOI/arXiv normalization, title hashing, `paper_id` derivation
//! - [`RateLimiterRegistry`]: per-source token bucket rate limiting
//! - [`CircuitBreakerManager`]: per-source failure isolation
//! - [`with_retry`]: backoff + jitter retry loop classified by [`ErrorKind`]
//! - [`CacheService`]: durable, resumable page cache backed by SQLite
//! - [`deduplicate_papers`]: three-pass union-find deduplication
//! - [`ProgressTracker`]: per-task progress and metrics accounting
//! - [`HttpClient`]: shared HTTP client used by source adapters

mod cache;
mod circuit_breaker;
mod dedup;
mod http;
mod identifiers;
mod progress;
mod rate_limiter;
mod retry;
mod validate;

pub use cache::{CacheError, CacheResult, CacheService, CacheStats, CachedPage};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
pub use dedup::{deduplicate_papers, DedupOutcome};
pub use http::{HttpClient, RateLimitedRequestBuilder};
pub use identifiers::{derive_paper_id, normalize_arxiv_id, normalize_doi, normalize_title, parse_year, title_hash};
pub use progress::ProgressTracker;
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateLimiterRegistry};
pub use retry::{api_retry_config, wait_for_circuit, with_retry, with_retry_detailed, ErrorKind, RetryConfig, RetryResult};
pub use validate::{sanitize_filename, sanitize_paper_id, validate_doi, validate_url, ValidationError};
