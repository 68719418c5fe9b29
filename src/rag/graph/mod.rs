//! Graph retrieval: query building, the store seam and execution with fallback.

pub mod executor;
pub mod query;
pub mod store;

pub use executor::{GraphExecutor, MAX_FALLBACK_DEPTH};
pub use query::{GraphQuery, GraphQueryBuilder, QueryKind};
pub use store::{GraphStore, SurrealGraphStore};
