//! In-memory source for exercising the worker pool and manager without
//! making network calls.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::AdapterConfig;
use crate::models::{DateRange, PageCursor, Paper};
use crate::sources::{SearchPage, Source, SourceError};

/// A scripted source: each call to [`search`](Source::search) pops the next
/// queued page (or error) regardless of the arguments passed in.
#[derive(Debug, Default)]
pub struct MockSource {
    id: String,
    pages: Mutex<VecDeque<Result<SearchPage, SourceError>>>,
}

impl MockSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pages: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a page of results to be returned by the next `search` call.
    pub fn push_page(&self, papers: Vec<Paper>, next_cursor: PageCursor) {
        let mut guard = self.pages.lock().expect("mock source mutex poisoned");
        guard.push_back(Ok(SearchPage {
            papers,
            next_cursor,
            raw_blob: String::new(),
        }));
    }

    /// Queue an error to be returned by the next `search` call.
    pub fn push_error(&self, error: SourceError) {
        let mut guard = self.pages.lock().expect("mock source mutex poisoned");
        guard.push_back(Err(error));
    }

    /// Number of scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.pages.lock().expect("mock source mutex poisoned").len()
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn search(
        &self,
        _query_text: &str,
        _date_range: DateRange,
        _limit: usize,
        _config: &AdapterConfig,
        _cursor: &PageCursor,
    ) -> Result<SearchPage, SourceError> {
        let mut guard = self.pages.lock().expect("mock source mutex poisoned");
        guard
            .pop_front()
            .unwrap_or_else(|| Ok(SearchPage {
                papers: Vec::new(),
                next_cursor: PageCursor::End,
                raw_blob: String::new(),
            }))
    }
}
