//! Paper model representing a deduplicated research paper record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::identifiers;

/// An author's structured name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub surname: String,
    pub given: Option<String>,
    pub orcid: Option<String>,
}

impl Author {
    pub fn new(surname: impl Into<String>) -> Self {
        Self {
            surname: surname.into(),
            given: None,
            orcid: None,
        }
    }

    pub fn given(mut self, given: impl Into<String>) -> Self {
        self.given = Some(given.into());
        self
    }

    pub fn orcid(mut self, orcid: impl Into<String>) -> Self {
        self.orcid = Some(orcid.into());
        self
    }

    pub fn display_name(&self) -> String {
        match &self.given {
            Some(given) => format!("{} {}", given, self.surname),
            None => self.surname.clone(),
        }
    }
}

/// Where and how a paper was retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub query: String,
    pub retrieved_at: DateTime<Utc>,
}

/// Error raised when a paper record violates its identity invariant.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaperError {
    #[error("paper must have at least one of DOI, arXiv id, or (title, year)")]
    MissingIdentity,
}

/// A research paper, normalized to a single schema regardless of source.
///
/// Construction enforces the invariant that at least one of DOI, arXiv id,
/// or (title, year) is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Deterministic identifier derived from the strongest available identity signal.
    pub paper_id: String,

    pub doi: Option<String>,
    pub arxiv_id: Option<String>,

    pub title: String,
    /// Stable hash of the normalized title, used by the fuzzy dedup pass.
    pub title_hash: u64,

    pub authors: Vec<Author>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    pub citation_count: Option<u32>,
    pub pdf_url: Option<String>,

    /// Native id per source, e.g. `{"openalex": "W123", "semantic": "abcd"}`.
    pub external_ids: HashMap<String, String>,

    pub provenance: Provenance,
}

impl Paper {
    /// Build a paper, validating the identity invariant and deriving
    /// `paper_id`/`title_hash` from the other fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        doi: Option<String>,
        arxiv_id: Option<String>,
        title: String,
        authors: Vec<Author>,
        year: Option<i32>,
        provenance: Provenance,
    ) -> Result<Self, PaperError> {
        let doi = doi.map(|d| identifiers::normalize_doi(&d));
        let arxiv_id = arxiv_id.map(|a| identifiers::normalize_arxiv_id(&a));

        if doi.is_none() && arxiv_id.is_none() && (title.trim().is_empty() || year.is_none()) {
            return Err(PaperError::MissingIdentity);
        }

        let title_hash = identifiers::title_hash(&title);
        let paper_id = identifiers::derive_paper_id(doi.as_deref(), arxiv_id.as_deref(), &title, year);

        Ok(Self {
            paper_id,
            doi,
            arxiv_id,
            title,
            title_hash,
            authors,
            year,
            venue: None,
            abstract_text: None,
            keywords: Vec::new(),
            citation_count: None,
            pdf_url: None,
            external_ids: HashMap::new(),
            provenance,
        })
    }

    pub fn has_pdf(&self) -> bool {
        self.pdf_url.is_some()
    }

    /// The strongest available identifier, for display/logging purposes.
    pub fn primary_id(&self) -> &str {
        self.doi
            .as_deref()
            .or(self.arxiv_id.as_deref())
            .unwrap_or(&self.paper_id)
    }
}

/// Builder for constructing [`Paper`] values incrementally, in the style of
/// an adapter assembling a record field-by-field from a JSON/XML response.
pub struct PaperBuilder {
    doi: Option<String>,
    arxiv_id: Option<String>,
    title: String,
    authors: Vec<Author>,
    year: Option<i32>,
    venue: Option<String>,
    abstract_text: Option<String>,
    keywords: Vec<String>,
    citation_count: Option<u32>,
    pdf_url: Option<String>,
    external_ids: HashMap<String, String>,
    provenance: Provenance,
}

impl PaperBuilder {
    pub fn new(title: impl Into<String>, source: impl Into<String>, query: impl Into<String>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            doi: None,
            arxiv_id: None,
            title: title.into(),
            authors: Vec::new(),
            year: None,
            venue: None,
            abstract_text: None,
            keywords: Vec::new(),
            citation_count: None,
            pdf_url: None,
            external_ids: HashMap::new(),
            provenance: Provenance {
                source: source.into(),
                query: query.into(),
                retrieved_at,
            },
        }
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn arxiv_id(mut self, arxiv_id: impl Into<String>) -> Self {
        self.arxiv_id = Some(arxiv_id.into());
        self
    }

    pub fn authors(mut self, authors: Vec<Author>) -> Self {
        self.authors = authors;
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn citation_count(mut self, count: u32) -> Self {
        self.citation_count = Some(count);
        self
    }

    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    pub fn external_id(mut self, source: impl Into<String>, id: impl Into<String>) -> Self {
        self.external_ids.insert(source.into(), id.into());
        self
    }

    pub fn build(self) -> Result<Paper, PaperError> {
        let mut paper = Paper::new(
            self.doi,
            self.arxiv_id,
            self.title,
            self.authors,
            self.year,
            self.provenance,
        )?;
        paper.venue = self.venue;
        paper.abstract_text = self.abstract_text;
        paper.keywords = self.keywords;
        paper.citation_count = self.citation_count;
        // Adapters hand back whatever URL string the upstream API returned;
        // drop it rather than propagate something unfit to ever fetch.
        paper.pdf_url = self.pdf_url.and_then(|url| crate::utils::validate_url(&url).ok());
        paper.external_ids = self.external_ids;
        Ok(paper)
    }
}
