//! Query-shaped types: the search request contract and its cache identity.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::AdapterConfig;

/// Inclusive year range filter. `None` on either end means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct DateRange {
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
}

impl DateRange {
    pub fn new(from_year: Option<i32>, to_year: Option<i32>) -> Self {
        Self { from_year, to_year }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.from_year.map_or(true, |from| year >= from) && self.to_year.map_or(true, |to| year <= to)
    }
}

/// A request to search one source for papers matching free-text terms,
/// optionally bounded by year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub date_range: DateRange,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            date_range: DateRange::default(),
            limit: 100,
        }
    }

    pub fn date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Stable identity for a query against a particular source, used as the
/// cache key for resumable pagination and to avoid scheduling the same
/// search twice. Incorporates `limit` and the resolved adapter config (via
/// `config_hash`) alongside text and date range, since two otherwise-identical
/// queries with a different page limit or a different API key/page size are
/// not the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryIdentity {
    pub source: String,
    pub normalized_text: String,
    pub date_range: DateRange,
    pub limit: usize,
    pub config_hash: u64,
}

impl QueryIdentity {
    pub fn new(source: impl Into<String>, query: &SearchQuery, adapter_config: &AdapterConfig) -> Self {
        Self {
            source: source.into(),
            normalized_text: crate::utils::identifiers::normalize_title(&query.text),
            date_range: query.date_range,
            limit: query.limit,
            config_hash: hash_adapter_config(adapter_config),
        }
    }

    /// A short, stable key suitable for use as a cache table primary key.
    pub fn key(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("{}:{:016x}", self.source, hasher.finish())
    }
}

/// Hash the adapter options that can change what a source actually returns
/// (page size, credential, contact email, retry override), so two tasks
/// differing only in these fields never collide on the same cache entry.
fn hash_adapter_config(config: &AdapterConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.page_size.hash(&mut hasher);
    config.timeout_seconds.hash(&mut hasher);
    config.api_key.hash(&mut hasher);
    config.polite_email.hash(&mut hasher);
    config.max_retries.hash(&mut hasher);
    hasher.finish()
}

/// Cursor marking progress through a source's paginated result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageCursor {
    /// Start from the beginning.
    Start,
    /// Continue from an opaque, source-defined cursor/offset token.
    Token(String),
    /// No more pages remain.
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_contains() {
        let range = DateRange::new(Some(2015), Some(2020));
        assert!(range.contains(2017));
        assert!(!range.contains(2021));
        assert!(!range.contains(2014));
    }

    #[test]
    fn test_date_range_unbounded() {
        let range = DateRange::default();
        assert!(range.contains(1500));
        assert!(range.contains(2100));
    }

    #[test]
    fn test_query_identity_key_stable() {
        let q1 = SearchQuery::new("Machine Learning!");
        let q2 = SearchQuery::new("machine   learning");
        let config = AdapterConfig::default();
        let id1 = QueryIdentity::new("arxiv", &q1, &config);
        let id2 = QueryIdentity::new("arxiv", &q2, &config);
        assert_eq!(id1.key(), id2.key());
    }

    #[test]
    fn test_query_identity_differs_by_source() {
        let q = SearchQuery::new("transformers");
        let config = AdapterConfig::default();
        let id1 = QueryIdentity::new("arxiv", &q, &config);
        let id2 = QueryIdentity::new("openalex", &q, &config);
        assert_ne!(id1.key(), id2.key());
    }

    #[test]
    fn test_query_identity_differs_by_limit() {
        let config = AdapterConfig::default();
        let id1 = QueryIdentity::new("arxiv", &SearchQuery::new("q").limit(10), &config);
        let id2 = QueryIdentity::new("arxiv", &SearchQuery::new("q").limit(100), &config);
        assert_ne!(id1.key(), id2.key());
    }

    #[test]
    fn test_query_identity_differs_by_adapter_config() {
        let q = SearchQuery::new("q");
        let plain = AdapterConfig::default();
        let with_key = AdapterConfig {
            api_key: Some("secret".to_string()),
            ..AdapterConfig::default()
        };
        let id1 = QueryIdentity::new("semantic", &q, &plain);
        let id2 = QueryIdentity::new("semantic", &q, &with_key);
        assert_ne!(id1.key(), id2.key());
    }
}
