//! Registry of the four contractual source adapters.

use std::collections::HashMap;
use std::sync::Arc;

use super::{crossref::CrossRefSource, openalex::OpenAlexSource, semantic::SemanticScholarSource, arxiv::ArxivSource, Source, SourceError};

/// Registry for all available research sources.
#[derive(Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}

impl SourceRegistry {
    /// Create a registry with all four contractual adapters registered.
    pub fn new() -> Self {
        let mut registry = Self {
            sources: HashMap::new(),
        };

        registry.register(Arc::new(ArxivSource::new()));
        registry.register(Arc::new(OpenAlexSource::new()));
        registry.register(Arc::new(SemanticScholarSource::new()));
        registry.register(Arc::new(CrossRefSource::new()));

        registry
    }

    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id).ok_or_else(|| SourceError::NotFound(format!("source '{}' not found", id)))
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
