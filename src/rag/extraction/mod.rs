//! Query entity extraction.
//!
//! Matches a query against the entity dictionary (token phrases, case-insensitive) and
//! detects generic category words by substring containment. Both are pure in-process work;
//! the phrase index is built once at startup and shared read-only by every query.

pub mod dictionary;
pub mod phrase;

use crate::error::RagError;
use crate::rag::domain::{DEFAULT_GENERIC_VOCABULARY, EntityMention, GenericTerm};
use dictionary::EntityDictionary;
use phrase::{PhraseIndex, filter_subspans};
use std::collections::HashSet;
use std::path::Path;

// =============================================================================
// Extraction Result
// =============================================================================

/// Entities and generic terms found in one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Non-overlapping mentions in text order, unique per (text, label).
    pub entities: Vec<EntityMention>,
    /// Matched vocabulary terms in vocabulary order.
    pub generics: Vec<GenericTerm>,
}

impl Extraction {
    /// True when retrieval must fall back to vector search alone.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.generics.is_empty()
    }
}

// =============================================================================
// Entity Extractor
// =============================================================================

/// Dictionary-backed entity and generic-term extractor.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    index: PhraseIndex,
    vocabulary: Vec<String>,
}

impl EntityExtractor {
    /// Build the phrase index from a loaded dictionary.
    pub fn new(dictionary: &EntityDictionary) -> Self {
        let index = PhraseIndex::build(dictionary);
        tracing::info!(phrases = index.len(), "Entity phrase index built");
        Self {
            index,
            vocabulary: DEFAULT_GENERIC_VOCABULARY
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Load the dictionary at `path` and build the extractor. Fails if the dictionary is
    /// missing, malformed or empty.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let dictionary = EntityDictionary::load(path)?;
        Ok(Self::new(&dictionary))
    }

    /// Replace the generic-term vocabulary.
    #[must_use]
    pub fn with_vocabulary<I, S>(mut self, vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.vocabulary = vocabulary
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Extract entities and generic terms from a query.
    pub fn extract(&self, query: &str) -> Extraction {
        let extraction = Extraction {
            entities: self.extract_entities(query),
            generics: self.extract_generics(query),
        };

        tracing::debug!(
            entities = extraction.entities.len(),
            generics = extraction.generics.len(),
            "Query extraction complete"
        );
        extraction
    }

    /// Dictionary entities in the query, longest match winning over contained spans.
    pub fn extract_entities(&self, query: &str) -> Vec<EntityMention> {
        let mut seen = HashSet::new();
        filter_subspans(self.index.find_all(query))
            .into_iter()
            .filter(|m| seen.insert((m.text.to_lowercase(), m.label)))
            .map(|m| {
                EntityMention::new(m.text, m.label)
                    .with_variants(m.variants)
                    .with_span(m.bytes.start, m.bytes.end)
            })
            .collect()
    }

    /// Vocabulary terms contained anywhere in the lower-cased query.
    pub fn extract_generics(&self, query: &str) -> Vec<GenericTerm> {
        let lowered = query.to_lowercase();
        let mut seen = HashSet::new();
        self.vocabulary
            .iter()
            .filter(|term| lowered.contains(term.as_str()))
            .filter(|term| seen.insert(term.as_str()))
            .map(GenericTerm::new)
            .collect()
    }
}
