//! Three-pass union-find deduplication of papers pooled across sources.
//!
//! Pass 1 unions records sharing a normalized DOI. Pass 2 unions records
//! sharing a normalized arXiv id. Pass 3 unions remaining records whose
//! titles are fuzzy-matched (Jaro-Winkler) above threshold and whose years
//! agree. Each resulting cluster picks a canonical record by a scoring
//! tuple and merges metadata from its members onto it.

use std::collections::{HashMap, HashSet};
use strsim::jaro_winkler;

use crate::models::{DuplicateCluster, MatchReason, Paper};

const FUZZY_TITLE_THRESHOLD: f64 = 0.90;

/// Union-find over paper indices, path-compressed and ranked by tree size.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }
}

/// Output of a deduplication pass: the merged canonical papers, the cluster
/// membership that produced each one, and a map from every input paper_id
/// to the paper_id of the canonical record it was folded into (itself, if
/// canonical or a singleton).
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub papers: Vec<Paper>,
    pub clusters: Vec<DuplicateCluster>,
    pub duplicate_map: HashMap<String, String>,
}

/// Deduplicate a pool of papers gathered across sources.
///
/// Runs DOI exact match, then arXiv exact match, then fuzzy title+year
/// match, unioning indices at each pass. Clusters of size 1 pass through
/// untouched; larger clusters are merged into their canonical member.
pub fn deduplicate_papers(papers: Vec<Paper>) -> DedupOutcome {
    let n = papers.len();
    let mut uf = UnionFind::new(n);
    let mut reason: HashMap<(usize, usize), MatchReason> = HashMap::new();

    // Indices unioned by an earlier (higher-confidence) pass. A record
    // already claimed by its DOI or arXiv id never joins a different
    // cluster via fuzzy title match.
    let mut claimed: HashSet<usize> = HashSet::new();

    let mut by_doi: HashMap<&str, usize> = HashMap::new();
    for (i, paper) in papers.iter().enumerate() {
        if let Some(doi) = paper.doi.as_deref() {
            if let Some(&first) = by_doi.get(doi) {
                uf.union(first, i);
                reason.insert((first.min(i), first.max(i)), MatchReason::Doi);
                claimed.insert(first);
                claimed.insert(i);
            } else {
                by_doi.insert(doi, i);
            }
        }
    }

    let mut by_arxiv: HashMap<&str, usize> = HashMap::new();
    for (i, paper) in papers.iter().enumerate() {
        if let Some(arxiv_id) = paper.arxiv_id.as_deref() {
            if let Some(&first) = by_arxiv.get(arxiv_id) {
                uf.union(first, i);
                reason.entry((first.min(i), first.max(i))).or_insert(MatchReason::ArxivId);
                claimed.insert(first);
                claimed.insert(i);
            } else {
                by_arxiv.insert(arxiv_id, i);
            }
        }
    }

    for i in 0..n {
        if claimed.contains(&i) {
            continue;
        }
        for j in (i + 1)..n {
            if claimed.contains(&j) {
                continue;
            }
            if uf.find(i) == uf.find(j) {
                continue;
            }
            if fuzzy_match(&papers[i], &papers[j]) {
                uf.union(i, j);
                reason.entry((i, j)).or_insert(MatchReason::FuzzyTitleYear);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        groups.entry(uf.find(i)).or_default().push(i);
    }

    let mut out_papers = Vec::with_capacity(groups.len());
    let mut clusters = Vec::with_capacity(groups.len());
    let mut duplicate_map = HashMap::with_capacity(n);

    for members in groups.into_values() {
        // Highest score first; ties broken by earliest retrieval then
        // paper_id ascending. The canonical record is the head of this
        // order, and metadata merge scans the rest in the same order.
        let mut ranked = members.clone();
        ranked.sort_by(|&a, &b| {
            score(&papers[b])
                .cmp(&score(&papers[a]))
                .then_with(|| papers[a].provenance.retrieved_at.cmp(&papers[b].provenance.retrieved_at))
                .then_with(|| papers[a].paper_id.cmp(&papers[b].paper_id))
        });
        let canonical_idx = ranked[0];

        let member_ids: Vec<String> = members.iter().map(|&i| papers[i].paper_id.clone()).collect();

        let cluster_reason = members
            .iter()
            .flat_map(|&i| members.iter().map(move |&j| (i.min(j), i.max(j))))
            .find_map(|key| reason.get(&key).copied())
            .unwrap_or(MatchReason::Doi);

        let mut canonical = papers[canonical_idx].clone();
        for &idx in ranked.iter().skip(1) {
            merge_into(&mut canonical, &papers[idx]);
        }

        for member_id in &member_ids {
            duplicate_map.insert(member_id.clone(), canonical.paper_id.clone());
        }

        clusters.push(DuplicateCluster::new(canonical.paper_id.clone(), member_ids, cluster_reason));
        out_papers.push(canonical);
    }

    DedupOutcome {
        papers: out_papers,
        clusters,
        duplicate_map,
    }
}

fn fuzzy_match(a: &Paper, b: &Paper) -> bool {
    match (a.year, b.year) {
        (Some(ya), Some(yb)) if ya != yb => return false,
        _ => {}
    }

    let title_a = crate::utils::identifiers::normalize_title(&a.title);
    let title_b = crate::utils::identifiers::normalize_title(&b.title);
    if title_a.is_empty() || title_b.is_empty() {
        return false;
    }

    jaro_winkler(&title_a, &title_b) >= FUZZY_TITLE_THRESHOLD
}

/// Score used to pick the canonical record within a cluster: a tuple
/// compared lexicographically, higher is better. Has-DOI and has-arXiv-id
/// dominate citation count, which dominates completeness (the count of
/// non-empty fields among abstract, venue, authors, year, PDF url and
/// keywords/fields-of-study).
fn score(paper: &Paper) -> (bool, bool, u32, u32) {
    let has_doi = paper.doi.is_some();
    let has_arxiv_id = paper.arxiv_id.is_some();
    let citation_count = paper.citation_count.unwrap_or(0);
    let completeness = [
        paper.abstract_text.is_some(),
        paper.venue.is_some(),
        !paper.authors.is_empty(),
        paper.year.is_some(),
        paper.pdf_url.is_some(),
        !paper.keywords.is_empty(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count() as u32;

    (has_doi, has_arxiv_id, citation_count, completeness)
}

/// Fold `other`'s metadata into `canonical` wherever `canonical` is missing
/// a field, and union their external id maps.
fn merge_into(canonical: &mut Paper, other: &Paper) {
    if canonical.abstract_text.is_none() {
        canonical.abstract_text = other.abstract_text.clone();
    }
    if canonical.venue.is_none() {
        canonical.venue = other.venue.clone();
    }
    if canonical.pdf_url.is_none() {
        canonical.pdf_url = other.pdf_url.clone();
    }
    canonical.citation_count = match (canonical.citation_count, other.citation_count) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    };
    if canonical.authors.is_empty() {
        canonical.authors = other.authors.clone();
    }
    for keyword in &other.keywords {
        if !canonical.keywords.contains(keyword) {
            canonical.keywords.push(keyword.clone());
        }
    }
    for (source, id) in &other.external_ids {
        canonical.external_ids.entry(source.clone()).or_insert_with(|| id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Author, PaperBuilder};
    use chrono::Utc;

    fn paper(title: &str, source: &str, doi: Option<&str>, year: Option<i32>) -> Paper {
        let mut builder = PaperBuilder::new(title, source, "q", Utc::now());
        if let Some(doi) = doi {
            builder = builder.doi(doi);
        }
        if let Some(year) = year {
            builder = builder.year(year);
        }
        builder.authors(vec![Author::new("Smith")]).build().unwrap()
    }

    #[test]
    fn test_dedup_by_doi_merges_cluster() {
        let papers = vec![
            paper("Deep Learning Survey", "arxiv", Some("10.1/x"), Some(2020)),
            paper("Deep Learning Survey (preprint)", "openalex", Some("10.1/x"), Some(2020)),
        ];
        let outcome = deduplicate_papers(papers);
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.clusters[0].match_reason, MatchReason::Doi);
        assert_eq!(outcome.clusters[0].size(), 2);
    }

    #[test]
    fn test_dedup_distinct_papers_not_merged() {
        let papers = vec![
            paper("Graph Neural Networks", "arxiv", None, Some(2019)),
            paper("Reinforcement Learning Basics", "crossref", None, Some(2021)),
        ];
        let outcome = deduplicate_papers(papers);
        assert_eq!(outcome.papers.len(), 2);
        assert!(outcome.clusters.iter().all(|c| c.is_singleton()));
    }

    #[test]
    fn test_dedup_fuzzy_title_same_year_merges() {
        let papers = vec![
            paper("Attention Is All You Need", "arxiv", None, Some(2017)),
            paper("Attention is all you need.", "semantic", None, Some(2017)),
        ];
        let outcome = deduplicate_papers(papers);
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.clusters[0].match_reason, MatchReason::FuzzyTitleYear);
    }

    #[test]
    fn test_dedup_fuzzy_title_different_year_not_merged() {
        let papers = vec![
            paper("Attention Is All You Need", "arxiv", None, Some(2017)),
            paper("Attention Is All You Need", "semantic", None, Some(2023)),
        ];
        let outcome = deduplicate_papers(papers);
        assert_eq!(outcome.papers.len(), 2);
    }

    #[test]
    fn test_dedup_merges_metadata_from_non_canonical_member() {
        let mut with_doi = paper("Same Paper Title Here", "arxiv", Some("10.1/y"), Some(2018));
        with_doi.abstract_text = None;
        let mut with_abstract = paper("Same Paper Title Here", "openalex", None, Some(2018));
        with_abstract.abstract_text = Some("an abstract".to_string());

        let outcome = deduplicate_papers(vec![with_doi, with_abstract]);
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.papers[0].abstract_text.as_deref(), Some("an abstract"));
    }

    #[test]
    fn test_canonical_selection_prefers_doi_over_completeness() {
        let mut plain = paper("Same Paper Title Here Too", "arxiv", None, Some(2018));
        plain.abstract_text = Some("a".to_string());
        plain.venue = Some("v".to_string());
        plain.pdf_url = Some("http://x".to_string());
        let sparse_with_doi = paper("Same Paper Title Here Too", "openalex", Some("10.1/z"), Some(2018));

        let outcome = deduplicate_papers(vec![plain, sparse_with_doi]);
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.papers[0].doi.as_deref(), Some("10.1/z"));
        // the more complete member's metadata is still folded in
        assert_eq!(outcome.papers[0].abstract_text.as_deref(), Some("a"));
    }

    #[test]
    fn test_merge_into_keeps_max_citation_count() {
        let mut with_doi = paper("Same Paper Title Here", "arxiv", Some("10.1/cite"), Some(2018));
        with_doi.citation_count = Some(10);
        let mut companion = paper("Same Paper Title Here", "openalex", Some("10.1/cite"), Some(2018));
        companion.citation_count = Some(42);

        let outcome = deduplicate_papers(vec![with_doi, companion]);
        assert_eq!(outcome.papers.len(), 1);
        assert_eq!(outcome.papers[0].citation_count, Some(42));
    }

    #[test]
    fn test_doi_claimed_record_does_not_also_fuzzy_match_unrelated_cluster() {
        // Two DOI-linked records share a near-identical title with a third,
        // unrelated record. Without excluding claimed indices, the fuzzy pass
        // would fold the third record into the DOI cluster too.
        let mut a = paper("Neural Scaling Laws", "arxiv", Some("10.1/scale"), Some(2022));
        a.abstract_text = None;
        let b = paper("Neural Scaling Laws", "openalex", Some("10.1/scale"), Some(2022));
        let c = paper("Neural Scaling Laws", "semantic", None, Some(2022));

        let outcome = deduplicate_papers(vec![a, b, c]);
        assert_eq!(outcome.papers.len(), 2);
        let doi_cluster = outcome.clusters.iter().find(|cl| cl.match_reason == MatchReason::Doi).unwrap();
        assert_eq!(doi_cluster.size(), 2);
    }

    #[test]
    fn test_duplicate_map_covers_every_input_id() {
        let papers = vec![
            paper("Deep Learning Survey", "arxiv", Some("10.1/x"), Some(2020)),
            paper("Deep Learning Survey (preprint)", "openalex", Some("10.1/x"), Some(2020)),
            paper("Unrelated Paper", "crossref", None, Some(2022)),
        ];
        let ids: Vec<String> = papers.iter().map(|p| p.paper_id.clone()).collect();

        let outcome = deduplicate_papers(papers);
        assert_eq!(outcome.duplicate_map.len(), ids.len());
        for id in &ids {
            assert!(outcome.duplicate_map.contains_key(id));
        }
        let canonical_id = outcome.papers.iter().find(|p| p.doi.is_some()).unwrap().paper_id.clone();
        assert_eq!(outcome.duplicate_map[&ids[0]], canonical_id);
        assert_eq!(outcome.duplicate_map[&ids[1]], canonical_id);
        assert_eq!(outcome.duplicate_map[&ids[2]], ids[2]);
    }
}
