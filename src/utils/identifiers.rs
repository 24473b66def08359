//! Identifier normalization: DOI/arXiv canonicalization, title hashing,
//! `paper_id` derivation, and multi-format date parsing.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

fn doi_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"10\.[0-9]{4,9}/\S+").unwrap())
}

/// Normalize a DOI: strip any `https://doi.org/` / `doi.org/` / `doi:` prefix,
/// lowercase it, and extract the first `10.xxxx/...` match if present.
pub fn normalize_doi(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("dx.doi.org/")
        .trim_start_matches("doi.org/")
        .trim_start_matches("doi:")
        .trim();

    let lowered = stripped.to_lowercase();
    match doi_pattern().find(&lowered) {
        Some(m) => m.as_str().trim_end_matches(['.', ',', ')']).to_string(),
        None => lowered,
    }
}

/// Normalize an arXiv identifier: strip an `arXiv:` prefix and any trailing
/// version suffix (`v1`, `v2`, ...).
pub fn normalize_arxiv_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let no_prefix = trimmed
        .strip_prefix("arXiv:")
        .or_else(|| trimmed.strip_prefix("arxiv:"))
        .or_else(|| trimmed.strip_prefix("ArXiv:"))
        .unwrap_or(trimmed);

    let lowered = no_prefix.to_lowercase();
    match lowered.rfind('v') {
        Some(pos) if lowered[pos + 1..].chars().all(|c| c.is_ascii_digit()) && pos + 1 < lowered.len() => {
            lowered[..pos].to_string()
        }
        _ => lowered,
    }
}

/// Normalize a title for fuzzy comparison: lowercase, strip punctuation,
/// collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable 64-bit hash of a normalized title, used as the fuzzy dedup key.
pub fn title_hash(title: &str) -> u64 {
    let normalized = normalize_title(title);
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

/// Derive a deterministic `paper_id` from the strongest available identity
/// signal: DOI, then arXiv id, then normalized-title+year.
pub fn derive_paper_id(doi: Option<&str>, arxiv_id: Option<&str>, title: &str, year: Option<i32>) -> String {
    if let Some(doi) = doi {
        return format!("doi:{}", doi);
    }
    if let Some(arxiv_id) = arxiv_id {
        return format!("arxiv:{}", arxiv_id);
    }
    let hash = title_hash(title);
    format!("title:{:016x}:{}", hash, year.unwrap_or(0))
}

/// Parse a publication date expressed in one of several common source
/// formats, returning just the year component (the only part the data
/// model retains).
///
/// Supported formats: `YYYY`, `YYYY-MM-DD`, `YYYY-MM`, `YYYY/MM/DD`,
/// `DD-MM-YYYY`, `DD/MM/YYYY`. Anything else is rejected.
pub fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(year) = raw.parse::<i32>() {
        if (1000..=9999).contains(&year) {
            return Some(year);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y/%m/%d") {
        return Some(date.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d-%m-%Y") {
        return Some(date.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(date.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d") {
        return Some(date.year());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi_strips_url_prefix() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1234/Test.ABC"),
            "10.1234/test.abc"
        );
        assert_eq!(normalize_doi("doi:10.1234/test"), "10.1234/test");
        assert_eq!(normalize_doi("10.1234/TEST"), "10.1234/test");
    }

    #[test]
    fn test_normalize_arxiv_id_strips_prefix_and_version() {
        assert_eq!(normalize_arxiv_id("arXiv:2301.12345v2"), "2301.12345");
        assert_eq!(normalize_arxiv_id("2301.12345"), "2301.12345");
        assert_eq!(normalize_arxiv_id("arxiv:2301.12345"), "2301.12345");
    }

    #[test]
    fn test_normalize_title_collapses_punctuation_and_case() {
        assert_eq!(normalize_title("Hello, World!"), "hello world");
        assert_eq!(normalize_title("A  Study:  Part  2"), "a study part 2");
    }

    #[test]
    fn test_title_hash_is_stable_across_formatting() {
        assert_eq!(title_hash("Hello, World!"), title_hash("hello   world"));
        assert_ne!(title_hash("Hello, World!"), title_hash("Goodbye, World!"));
    }

    #[test]
    fn test_derive_paper_id_prefers_doi_then_arxiv_then_title() {
        assert_eq!(derive_paper_id(Some("10.1/x"), Some("2301.1"), "T", Some(2020)), "doi:10.1/x");
        assert_eq!(derive_paper_id(None, Some("2301.1"), "T", Some(2020)), "arxiv:2301.1");
        assert!(derive_paper_id(None, None, "T", Some(2020)).starts_with("title:"));
    }

    #[test]
    fn test_parse_year_handles_all_formats() {
        assert_eq!(parse_year("2021"), Some(2021));
        assert_eq!(parse_year("2021-03-15"), Some(2021));
        assert_eq!(parse_year("2021-03"), Some(2021));
        assert_eq!(parse_year("2021/03/15"), Some(2021));
        assert_eq!(parse_year("15-03-2021"), Some(2021));
        assert_eq!(parse_year("15/03/2021"), Some(2021));
        assert_eq!(parse_year("not a date"), None);
    }

    #[test]
    fn test_parse_year_rejects_non_spec_formats() {
        assert_eq!(parse_year("15 Mar 2021"), None);
        assert_eq!(parse_year("2021-03-15T00:00:00Z"), None);
    }
}
