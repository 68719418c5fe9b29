//! Retrieval domain types.

pub mod entity;
pub mod passage;

pub use entity::{DEFAULT_GENERIC_VOCABULARY, EntityLabel, EntityMention, GenericTerm};
pub use passage::{ContextBundle, MAX_CHUNKS, Passage};
