//! Deduplication output: a cluster of records judged to be the same paper.

use serde::{Deserialize, Serialize};

/// One group of [`Paper`](super::paper::Paper) records the deduplicator has
/// judged to refer to the same underlying work, plus the id of the record
/// chosen as canonical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub canonical_id: String,
    pub member_ids: Vec<String>,
    pub match_reason: MatchReason,
}

impl DuplicateCluster {
    pub fn new(canonical_id: impl Into<String>, member_ids: Vec<String>, match_reason: MatchReason) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            member_ids,
            match_reason,
        }
    }

    pub fn size(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_singleton(&self) -> bool {
        self.member_ids.len() <= 1
    }
}

/// Which pass of the three-pass matcher produced a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchReason {
    Doi,
    ArxivId,
    FuzzyTitleYear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_singleton() {
        let cluster = DuplicateCluster::new("doi:10.1/x", vec!["doi:10.1/x".to_string()], MatchReason::Doi);
        assert!(cluster.is_singleton());
        assert_eq!(cluster.size(), 1);
    }

    #[test]
    fn test_cluster_with_duplicates() {
        let cluster = DuplicateCluster::new(
            "doi:10.1/x",
            vec!["doi:10.1/x".to_string(), "title:abc:2020".to_string()],
            MatchReason::FuzzyTitleYear,
        );
        assert!(!cluster.is_singleton());
        assert_eq!(cluster.size(), 2);
    }
}
