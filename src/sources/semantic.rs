//! Semantic Scholar adapter: offset-paginated search over the Graph API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AdapterConfig;
use crate::models::{Author, DateRange, PageCursor, Paper, PaperBuilder};
use crate::sources::{SearchPage, Source, SourceError};
use crate::utils::HttpClient;

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "title,abstract,year,citationCount,authors,externalIds,openAccessPdf,venue";

#[derive(Debug)]
pub struct SemanticScholarSource {
    client: Arc<HttpClient>,
}

impl SemanticScholarSource {
    pub fn new() -> Self {
        Self {
            client: Arc::new(HttpClient::without_rate_limit("litreview-engine").expect("HTTP client init")),
        }
    }

    #[allow(dead_code)]
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    fn parse_paper(data: &S2Paper) -> Result<Paper, SourceError> {
        let authors = data
            .authors
            .iter()
            .filter_map(|a| a.name.clone())
            .map(Author::new)
            .collect();

        let doi = data.external_ids.as_ref().and_then(|ids| ids.doi.clone());
        let pdf_url = data.open_access_pdf.as_ref().and_then(|p| p.url.clone());

        let mut builder = PaperBuilder::new(data.title.clone().unwrap_or_default(), "semantic", "", chrono::Utc::now())
            .authors(authors);

        if let Some(paper_id) = &data.paper_id {
            builder = builder.external_id("semantic", paper_id.clone());
        }
        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }
        if let Some(year) = data.year {
            builder = builder.year(year);
        }
        if let Some(count) = data.citation_count {
            builder = builder.citation_count(count.max(0) as u32);
        }
        if let Some(abstract_text) = &data.r#abstract {
            builder = builder.abstract_text(abstract_text.clone());
        }
        if let Some(venue) = &data.venue {
            if !venue.is_empty() {
                builder = builder.venue(venue.clone());
            }
        }
        if let Some(pdf_url) = pdf_url {
            builder = builder.pdf_url(pdf_url);
        }

        builder.build().map_err(|e| SourceError::Parse(e.to_string()))
    }
}

impl Default for SemanticScholarSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    async fn search(
        &self,
        query_text: &str,
        date_range: DateRange,
        limit: usize,
        config: &AdapterConfig,
        cursor: &PageCursor,
    ) -> Result<SearchPage, SourceError> {
        let offset = match cursor {
            PageCursor::Start => 0,
            PageCursor::Token(token) => token.parse::<usize>().unwrap_or(0),
            PageCursor::End => return Err(SourceError::InvalidRequest("already at end".to_string())),
        };

        let page_size = limit.clamp(1, 100);
        let mut url = format!(
            "{}?query={}&offset={}&limit={}&fields={}",
            SEMANTIC_API_BASE,
            urlencoding::encode(query_text),
            offset,
            page_size,
            FIELDS,
        );

        if let (Some(from), Some(to)) = (date_range.from_year, date_range.to_year) {
            url.push_str(&format!("&year={}-{}", from, to));
        } else if let Some(from) = date_range.from_year {
            url.push_str(&format!("&year={}-", from));
        } else if let Some(to) = date_range.to_year {
            url.push_str(&format!("&year=-{}", to));
        }

        let mut request = self.client.get(&url);
        if let Some(key) = &config.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimit);
        }
        if !response.status().is_success() {
            return Err(SourceError::Api(format!("Semantic Scholar API returned status: {}", response.status())));
        }

        let raw_blob = response.text().await.map_err(|e| SourceError::Network(e.to_string()))?;
        let data: S2SearchResponse = serde_json::from_str(&raw_blob)?;

        let papers: Result<Vec<Paper>, SourceError> = data.data.iter().map(Self::parse_paper).collect();
        let papers = papers?;

        let next_cursor = match data.next {
            Some(next) if !papers.is_empty() => PageCursor::Token(next.to_string()),
            _ => PageCursor::End,
        };

        Ok(SearchPage {
            papers,
            next_cursor,
            raw_blob,
        })
    }
}

// ===== Semantic Scholar API types =====

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Paper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    r#abstract: Option<String>,
    year: Option<i32>,
    #[serde(rename = "citationCount")]
    citation_count: Option<i32>,
    authors: Vec<S2Author>,
    #[serde(rename = "externalIds")]
    external_ids: Option<S2ExternalIds>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<S2OpenAccessPdf>,
    venue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2SearchResponse {
    #[serde(default)]
    next: Option<u64>,
    data: Vec<S2Paper>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paper_with_doi_and_year() {
        let paper = S2Paper {
            paper_id: Some("abc123".to_string()),
            title: Some("Deep Learning Survey".to_string()),
            r#abstract: Some("A survey.".to_string()),
            year: Some(2019),
            citation_count: Some(500),
            authors: vec![S2Author {
                name: Some("Ada Lovelace".to_string()),
            }],
            external_ids: Some(S2ExternalIds {
                doi: Some("10.1234/survey".to_string()),
            }),
            open_access_pdf: None,
            venue: Some("NeurIPS".to_string()),
        };
        let result = SemanticScholarSource::parse_paper(&paper).unwrap();
        assert_eq!(result.doi.as_deref(), Some("10.1234/survey"));
        assert_eq!(result.citation_count, Some(500));
        assert_eq!(result.venue.as_deref(), Some("NeurIPS"));
    }

    #[test]
    fn test_parse_paper_without_doi_needs_title_and_year() {
        let paper = S2Paper {
            paper_id: Some("xyz".to_string()),
            title: Some("Untitled Work".to_string()),
            r#abstract: None,
            year: Some(2021),
            citation_count: None,
            authors: Vec::new(),
            external_ids: None,
            open_access_pdf: None,
            venue: None,
        };
        let result = SemanticScholarSource::parse_paper(&paper);
        assert!(result.is_ok());
    }
}
