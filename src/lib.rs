//! Hybrid RAG
//!
//! Answers questions about a text corpus by merging named-entity graph lookups, generic
//! category sampling and dense vector similarity into one bounded context, then streaming an
//! answer from a chat model.
//!
//! # Architecture
//!
//! - **Extraction**: dictionary phrase matching with maximal-span overlap resolution
//! - **Graph retrieval**: SurrealDB entity graph, conjunctive match with one-level fallback
//! - **Vector retrieval**: pgvector cosine search with a bounded connection pool
//! - **Generation**: OpenAI-compatible streaming chat completions
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (defaults, file, environment, CLI)
//! - [`error`]: Startup error taxonomy
//! - [`llm`]: LLM driver trait and streaming generation
//! - [`normalized`]: Unified streaming event model
//! - [`rag`]: The retrieval engine and turn orchestrator
//! - [`session`]: Conversation history

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod llm;
pub mod normalized;
pub mod rag;
pub mod session;
