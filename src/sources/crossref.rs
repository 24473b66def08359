//! CrossRef adapter: cursor-paginated search over the REST `/works` API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AdapterConfig;
use crate::models::{Author, DateRange, PageCursor, Paper, PaperBuilder};
use crate::sources::{SearchPage, Source, SourceError};
use crate::utils::HttpClient;

const CROSSREF_API_BASE: &str = "https://api.crossref.org/works";

#[derive(Debug)]
pub struct CrossRefSource {
    client: Arc<HttpClient>,
}

impl CrossRefSource {
    pub fn new() -> Self {
        Self {
            client: Arc::new(HttpClient::without_rate_limit("litreview-engine").expect("HTTP client init")),
        }
    }

    #[allow(dead_code)]
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    fn build_filter(date_range: DateRange) -> Option<String> {
        match (date_range.from_year, date_range.to_year) {
            (Some(from), Some(to)) => Some(format!("from-pub-date:{}-01-01,until-pub-date:{}-12-31", from, to)),
            (Some(from), None) => Some(format!("from-pub-date:{}-01-01", from)),
            (None, Some(to)) => Some(format!("until-pub-date:{}-12-31", to)),
            (None, None) => None,
        }
    }

    fn parse_paper(item: &CrItem) -> Result<Paper, SourceError> {
        let title = item.title.as_ref().and_then(|t| t.first()).cloned().unwrap_or_default();

        let authors = item
            .author
            .iter()
            .flatten()
            .map(|a| {
                let mut author = Author::new(a.family.clone().unwrap_or_default());
                if let Some(given) = &a.given {
                    author = author.given(given.clone());
                }
                author
            })
            .collect();

        let year = item
            .published
            .as_ref()
            .or(item.published_print.as_ref())
            .or(item.published_online.as_ref())
            .and_then(|p| p.date_parts.first())
            .and_then(|parts| parts.first())
            .copied();

        let mut builder = PaperBuilder::new(title, "crossref", "", chrono::Utc::now()).authors(authors);

        if let Some(doi) = &item.doi {
            builder = builder.doi(doi.clone());
        }
        if let Some(year) = year {
            builder = builder.year(year);
        }
        if let Some(count) = item.is_referenced_by_count {
            builder = builder.citation_count(count.max(0) as u32);
        }
        if let Some(venue) = item.container_title.as_ref().and_then(|v| v.first()) {
            if !venue.is_empty() {
                builder = builder.venue(venue.clone());
            }
        }
        if let Some(url) = &item.url {
            builder = builder.pdf_url(url.clone());
        }

        builder.build().map_err(|e| SourceError::Parse(e.to_string()))
    }
}

impl Default for CrossRefSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    async fn search(
        &self,
        query_text: &str,
        date_range: DateRange,
        limit: usize,
        config: &AdapterConfig,
        cursor: &PageCursor,
    ) -> Result<SearchPage, SourceError> {
        let cursor_token = match cursor {
            PageCursor::Start => "*".to_string(),
            PageCursor::Token(token) => token.clone(),
            PageCursor::End => return Err(SourceError::InvalidRequest("already at end".to_string())),
        };

        let rows = limit.clamp(1, 1000);
        let mut url = format!(
            "{}?query={}&rows={}&cursor={}",
            CROSSREF_API_BASE,
            urlencoding::encode(query_text),
            rows,
            urlencoding::encode(&cursor_token),
        );

        if let Some(filter) = Self::build_filter(date_range) {
            url.push_str(&format!("&filter={}", urlencoding::encode(&filter)));
        }
        if let Some(email) = &config.polite_email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimit);
        }
        if !status.is_success() {
            return Err(SourceError::Api(format!("CrossRef API returned status: {}", status)));
        }
        if !content_type.contains("json") {
            // CrossRef answers throttled requests with an HTML body rather
            // than a machine-readable error; treat it as a soft rate limit.
            return Err(SourceError::RateLimit);
        }

        let raw_blob = response.text().await.map_err(|e| SourceError::Network(e.to_string()))?;
        let data: CrResponse = serde_json::from_str(&raw_blob)?;

        let papers: Result<Vec<Paper>, SourceError> = data.message.items.iter().map(Self::parse_paper).collect();
        let papers = papers?;

        let next_cursor = match data.message.next_cursor {
            Some(token) if !papers.is_empty() => PageCursor::Token(token),
            _ => PageCursor::End,
        };

        Ok(SearchPage {
            papers,
            next_cursor,
            raw_blob,
        })
    }
}

// ===== CrossRef API response types =====

#[derive(Debug, Deserialize)]
struct CrResponse {
    message: CrMessage,
}

#[derive(Debug, Deserialize)]
struct CrMessage {
    items: Vec<CrItem>,
    #[serde(rename = "next-cursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrDateParts {
    #[serde(rename = "date-parts")]
    date_parts: Vec<Vec<i32>>,
}

#[derive(Debug, Deserialize)]
struct CrAuthor {
    family: Option<String>,
    given: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CrAuthor>>,
    published: Option<CrDateParts>,
    #[serde(rename = "published-print")]
    published_print: Option<CrDateParts>,
    #[serde(rename = "published-online")]
    published_online: Option<CrDateParts>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<i64>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    #[serde(rename = "URL")]
    url: Option<String>,
}
