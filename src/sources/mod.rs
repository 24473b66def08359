//! Source adapters: one module per upstream API, all implementing the
//! same pagination contract so the worker pool can drive them uniformly.
//!
//! Unlike a feature-gated plugin surface with dozens of optional sources,
//! this crate ships exactly four contractual adapters (arXiv, OpenAlex,
//! Semantic Scholar, CrossRef). Each is always compiled in and registered
//! with the [`SourceRegistry`].

mod arxiv;
mod crossref;
#[cfg(any(test, feature = "test-util"))]
mod mock;
mod openalex;
mod registry;
mod semantic;

pub use registry::SourceRegistry;

use async_trait::async_trait;

use crate::config::AdapterConfig;
use crate::models::{DateRange, PageCursor, Paper};

/// One page of results from a source, plus the raw response body (stored
/// verbatim in the page cache so a resumed run never needs to re-request
/// it) and the cursor for the next page.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub papers: Vec<Paper>,
    pub next_cursor: PageCursor,
    pub raw_blob: String,
}

impl SearchPage {
    pub fn is_last_page(&self) -> bool {
        matches!(self.next_cursor, PageCursor::End)
    }
}

/// A source adapter: given a free-text query, a year range, a page size,
/// and a cursor, fetch the next page of matching papers.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (e.g. "arxiv").
    fn id(&self) -> &str;

    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch one page of search results.
    async fn search(
        &self,
        query_text: &str,
        date_range: DateRange,
        limit: usize,
        config: &AdapterConfig,
        cursor: &PageCursor,
    ) -> Result<SearchPage, SourceError>;
}

/// Errors that can occur when interacting with a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Operation not implemented for this source")]
    NotImplemented,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Rate limit exceeded, retry after {0}s")]
    RateLimitAfter(u64),

    #[error("Circuit open for source")]
    CircuitOpen,

    #[error("Paper not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SourceError::Network(format!("timeout: {}", err));
        }
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return SourceError::RateLimit;
            }
        }
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockSource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_page_is_last_page() {
        let page = SearchPage {
            papers: Vec::new(),
            next_cursor: PageCursor::End,
            raw_blob: String::new(),
        };
        assert!(page.is_last_page());

        let page = SearchPage {
            papers: Vec::new(),
            next_cursor: PageCursor::Token("x".to_string()),
            raw_blob: String::new(),
        };
        assert!(!page.is_last_page());
    }
}
