//! OpenAlex adapter: cursor-paginated search over the OpenAlex `/works` API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AdapterConfig;
use crate::models::{Author, DateRange, PageCursor, Paper, PaperBuilder};
use crate::sources::{SearchPage, Source, SourceError};
use crate::utils::HttpClient;

const OPENALEX_API_BASE: &str = "https://api.openalex.org/works";

#[derive(Debug)]
pub struct OpenAlexSource {
    client: Arc<HttpClient>,
}

impl OpenAlexSource {
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
            (Some(from), Some(to)) => Some(format!("publication_year:{}-{}", from, to)),
            (Some(from), None) => Some(format!("from_publication_date:{}-01-01", from)),
            (None, Some(to)) => Some(format!("to_publication_date:{}-12-31", to)),
            (None, None) => None,
        }
    }

    fn parse_paper(data: &OaWork) -> Result<Paper, SourceError> {
        let authors = data
            .authorships
            .iter()
            .filter_map(|a| a.author.display_name.clone())
            .map(Author::new)
            .collect();

        let doi = data.doi.as_deref().map(|d| d.trim_start_matches("https://doi.org/").to_string());
        let pdf_url = data.best_oa_location.as_ref().and_then(|l| l.pdf_url.clone());

        let mut builder = PaperBuilder::new(data.title.clone().unwrap_or_default(), "openalex", "", chrono::Utc::now())
            .authors(authors)
            .external_id("openalex", data.id.clone().unwrap_or_default());

        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }
        if let Some(year) = data.publication_year {
            builder = builder.year(year);
        }
        if let Some(count) = data.cited_by_count {
            builder = builder.citation_count(count as u32);
        }
        if let Some(venue) = data.primary_location.as_ref().and_then(|l| l.source.as_ref()).and_then(|s| s.display_name.clone()) {
            builder = builder.venue(venue);
        }
        if let Some(pdf_url) = pdf_url {
            builder = builder.pdf_url(pdf_url);
        }
        if let Some(abstract_text) = data.abstract_from_inverted_index() {
            builder = builder.abstract_text(abstract_text);
        }

        builder.build().map_err(|e| SourceError::Parse(e.to_string()))
    }
}

impl Default for OpenAlexSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
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

        let per_page = limit.clamp(1, 200);
        let mut url = format!(
            "{}?search={}&per-page={}&cursor={}",
            OPENALEX_API_BASE,
            urlencoding::encode(query_text),
            per_page,
            urlencoding::encode(&cursor_token),
        );

        if let Some(filter) = Self::build_filter(date_range) {
            url.push_str(&format!("&filter={}", urlencoding::encode(&filter)));
        }
        if let Some(email) = &config.polite_email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!("OpenAlex API returned status: {}", response.status())));
        }

        let raw_blob = response.text().await.map_err(|e| SourceError::Network(e.to_string()))?;
        let data: WorksResponse = serde_json::from_str(&raw_blob)?;

        let papers: Result<Vec<Paper>, SourceError> = data.results.iter().map(Self::parse_paper).collect();
        let papers = papers?;

        let next_cursor = match data.meta.next_cursor {
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

// ===== OpenAlex API response types =====

#[derive(Debug, Deserialize)]
struct WorksResponse {
    results: Vec<OaWork>,
    meta: OaMeta,
}

#[derive(Debug, Deserialize)]
struct OaMeta {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaWork {
    id: Option<String>,
    title: Option<String>,
    publication_year: Option<i32>,
    cited_by_count: Option<i64>,
    doi: Option<String>,
    authorships: Vec<OaAuthorship>,
    primary_location: Option<OaLocation>,
    best_oa_location: Option<OaLocation>,
    abstract_inverted_index: Option<std::collections::HashMap<String, Vec<u32>>>,
}

impl OaWork {
    fn abstract_from_inverted_index(&self) -> Option<String> {
        let index = self.abstract_inverted_index.as_ref()?;
        let mut positions: Vec<(u32, &str)> = index
            .iter()
            .flat_map(|(word, positions)| positions.iter().map(move |p| (*p, word.as_str())))
            .collect();
        positions.sort_by_key(|(pos, _)| *pos);
        let text = positions.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct OaAuthorship {
    author: OaAuthor,
}

#[derive(Debug, Deserialize)]
struct OaAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    pdf_url: Option<String>,
    source: Option<OaSource>,
}

#[derive(Debug, Deserialize)]
struct OaSource {
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_year_range() {
        let filter = OpenAlexSource::build_filter(DateRange::new(Some(2018), Some(2022))).unwrap();
        assert_eq!(filter, "publication_year:2018-2022");
    }

    #[test]
    fn test_build_filter_unbounded_is_none() {
        assert!(OpenAlexSource::build_filter(DateRange::default()).is_none());
    }

    #[test]
    fn test_abstract_from_inverted_index_reorders_words() {
        let mut index = std::collections::HashMap::new();
        index.insert("world".to_string(), vec![1]);
        index.insert("Hello".to_string(), vec![0]);
        let work = OaWork {
            id: None,
            title: None,
            publication_year: None,
            cited_by_count: None,
            doi: None,
            authorships: Vec::new(),
            primary_location: None,
            best_oa_location: None,
            abstract_inverted_index: Some(index),
        };
        assert_eq!(work.abstract_from_inverted_index().unwrap(), "Hello world");
    }

    #[test]
    fn test_parse_paper_minimal() {
        let work = OaWork {
            id: Some("https://openalex.org/W123".to_string()),
            title: Some("A Study".to_string()),
            publication_year: Some(2021),
            cited_by_count: Some(10),
            doi: Some("https://doi.org/10.1234/x".to_string()),
            authorships: vec![OaAuthorship {
                author: OaAuthor {
                    display_name: Some("Jane Doe".to_string()),
                },
            }],
            primary_location: None,
            best_oa_location: None,
            abstract_inverted_index: None,
        };
        let paper = OpenAlexSource::parse_paper(&work).unwrap();
        assert_eq!(paper.doi.as_deref(), Some("10.1234/x"));
        assert_eq!(paper.year, Some(2021));
        assert_eq!(paper.citation_count, Some(10));
    }
}
