//! arXiv adapter: Atom feed search via the public arXiv API.

use async_trait::async_trait;
use feed_rs::parser;
use std::sync::Arc;

use crate::config::AdapterConfig;
use crate::models::{DateRange, PageCursor, Paper, PaperBuilder};
use crate::sources::{SearchPage, Source, SourceError};
use crate::utils::HttpClient;

const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

#[derive(Debug)]
pub struct ArxivSource {
    client: Arc<HttpClient>,
}

impl ArxivSource {
    pub fn new() -> Self {
        Self {
            client: Arc::new(HttpClient::without_rate_limit("litreview-engine").expect("HTTP client init")),
        }
    }

    #[allow(dead_code)]
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// Normalize an arXiv identifier from any of its common textual forms.
    pub fn parse_id(id: &str) -> Result<String, SourceError> {
        let id = id.trim().to_lowercase();

        if let Some(abs_pos) = id.find("/abs/") {
            let after = &id[abs_pos + 5..];
            let after = after.split('/').next().unwrap_or(after);
            return Ok(after.split('v').next().unwrap_or(after).to_string());
        }

        let id = id.strip_prefix("arxiv:").unwrap_or(&id);
        let id = id.split('v').next().unwrap_or(id);

        if id.is_empty() {
            return Err(SourceError::InvalidRequest("empty arXiv ID".to_string()));
        }

        Ok(id.to_string())
    }

    fn build_search_query(query_text: &str, date_range: DateRange) -> String {
        let mut parts = Vec::new();
        if !query_text.is_empty() {
            parts.push(format!("all:{}", query_text));
        }

        match (date_range.from_year, date_range.to_year) {
            (Some(from), Some(to)) => parts.push(format!("submittedDate:[{}0101 TO {}1231]", from, to)),
            (Some(from), None) => parts.push(format!("submittedDate:[{}0101 TO *]", from)),
            (None, Some(to)) => parts.push(format!("submittedDate:[* TO {}1231]", to)),
            (None, None) => {}
        }

        if parts.is_empty() {
            "all:*".to_string()
        } else {
            parts.join(" AND ")
        }
    }

    fn parse_entry(entry: &feed_rs::model::Entry) -> Result<Paper, SourceError> {
        let arxiv_id = entry
            .id
            .split("/abs/")
            .next_back()
            .and_then(|s| s.split('v').next())
            .ok_or_else(|| SourceError::Parse("missing paper id".to_string()))?
            .to_string();

        let title = entry.title.as_ref().map(|t| t.content.as_str()).unwrap_or("").trim().to_string();

        let authors = entry
            .authors
            .iter()
            .map(|a| crate::models::Author::new(a.name.clone()))
            .collect();

        let year = entry.published.map(|d| chrono::Datelike::year(&d));

        let mut builder = PaperBuilder::new(title, "arxiv", "", chrono::Utc::now())
            .arxiv_id(arxiv_id.clone())
            .authors(authors)
            .pdf_url(format!("{}/{}.pdf", ARXIV_PDF_URL, arxiv_id));

        if let Some(summary) = entry.summary.as_ref() {
            builder = builder.abstract_text(summary.content.trim());
        }
        if let Some(year) = year {
            builder = builder.year(year);
        }

        builder.build().map_err(|e| SourceError::Parse(e.to_string()))
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    async fn search(
        &self,
        query_text: &str,
        date_range: DateRange,
        limit: usize,
        _config: &AdapterConfig,
        cursor: &PageCursor,
    ) -> Result<SearchPage, SourceError> {
        let start = match cursor {
            PageCursor::Start => 0,
            PageCursor::Token(token) => token.parse::<usize>().unwrap_or(0),
            PageCursor::End => return Err(SourceError::InvalidRequest("already at end".to_string())),
        };

        let search_query = Self::build_search_query(query_text, date_range);
        let page_size = limit.clamp(1, 200);

        let url = format!(
            "{}?search_query={}&start={}&max_results={}&sortBy=submittedDate&sortOrder=descending",
            ARXIV_API_URL,
            urlencoding::encode(&search_query),
            start,
            page_size,
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/atom+xml")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!("arXiv API returned status: {}", response.status())));
        }

        let raw_blob = response.text().await.map_err(|e| SourceError::Network(e.to_string()))?;
        let feed = parser::parse(raw_blob.as_bytes()).map_err(|e| SourceError::Parse(e.to_string()))?;

        let papers: Result<Vec<Paper>, SourceError> = feed.entries.iter().map(Self::parse_entry).collect();
        let papers = papers?;

        let next_cursor = if papers.len() < page_size {
            PageCursor::End
        } else {
            PageCursor::Token((start + papers.len()).to_string())
        };

        Ok(SearchPage {
            papers,
            next_cursor,
            raw_blob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_basic_formats() {
        assert_eq!(ArxivSource::parse_id("2301.12345").unwrap(), "2301.12345");
        assert_eq!(ArxivSource::parse_id("arxiv:2301.12345").unwrap(), "2301.12345");
        assert_eq!(ArxivSource::parse_id("https://arxiv.org/abs/2301.12345v1").unwrap(), "2301.12345");
        assert_eq!(ArxivSource::parse_id("ARXIV:2301.12345").unwrap(), "2301.12345");
    }

    #[test]
    fn test_parse_id_rejects_empty() {
        assert!(ArxivSource::parse_id("").is_err());
    }

    #[test]
    fn test_build_search_query_with_date_range() {
        let range = DateRange::new(Some(2020), Some(2022));
        let query = ArxivSource::build_search_query("neural networks", range);
        assert!(query.contains("all:neural networks"));
        assert!(query.contains("20200101"));
        assert!(query.contains("20221231"));
    }

    #[test]
    fn test_build_search_query_empty_terms_still_valid() {
        let query = ArxivSource::build_search_query("", DateRange::default());
        assert_eq!(query, "all:*");
    }

    #[test]
    fn test_parse_entry_from_atom_feed() {
        let mock_response = r#"<?xml version="1.0" encoding="UTF-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
            <entry>
                <id>http://arxiv.org/abs/2301.12345</id>
                <title>Test Paper Title</title>
                <summary>Test abstract</summary>
                <published>2023-01-15T10:00:00Z</published>
                <author><name>Test Author</name></author>
            </entry>
        </feed>"#;

        let feed = feed_rs::parser::parse(mock_response.as_bytes()).unwrap();
        let paper = ArxivSource::parse_entry(&feed.entries[0]).unwrap();
        assert_eq!(paper.arxiv_id.as_deref(), Some("2301.12345"));
        assert_eq!(paper.title, "Test Paper Title");
        assert_eq!(paper.year, Some(2023));
    }
}
