//! Minimal citation reference record.
//!
//! Kept as a data type for a future citation-graph collaborator; the engine
//! itself does not score or traverse references.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub doi: Option<String>,
    pub year: Option<i32>,
}
