//! Hybrid retrieval engine.
//!
//! A question is turned into bounded context from two stores:
//!
//! - [`extraction`]: dictionary phrase matching for named entities, plus generic category terms
//! - [`graph`]: conjunctive entity queries with single-entity fallback, and generic sampling
//! - [`vector`]: cosine nearest neighbours over pgvector
//! - [`composer`]: graph-first, capped merge of both passage sets
//! - [`orchestrator`]: the per-turn state machine tying these to streamed generation

pub mod composer;
pub mod domain;
pub mod embedding;
pub mod extraction;
pub mod graph;
pub mod orchestrator;
pub mod vector;

pub use composer::ContextComposer;
pub use domain::{ContextBundle, EntityLabel, EntityMention, GenericTerm, MAX_CHUNKS, Passage};
pub use extraction::{EntityExtractor, Extraction};
pub use orchestrator::{QueryOrchestrator, RetrievalSettings, RetrievedContext, TurnState};
pub use vector::{VectorRetriever, VectorStore};
