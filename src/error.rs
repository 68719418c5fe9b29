//! Startup error taxonomy.
//!
//! Only configuration and initialisation failures are represented here. Per-query failures
//! (graph query errors, vector store timeouts, embedding failures) are logged and degraded to
//! empty results inside the retrieval engine and never surface as a [`RagError`].

use std::path::PathBuf;

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// The entity dictionary file does not exist or could not be read.
    #[error("Entity dictionary not found: {path}")]
    DictionaryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entity dictionary was readable but could not be parsed.
    #[error("Entity dictionary {path} is malformed: {message}")]
    DictionaryFormat { path: PathBuf, message: String },

    /// The entity dictionary parsed but contained no usable entries.
    #[error("Entity dictionary {0} contains no entities")]
    DictionaryEmpty(PathBuf),

    /// The graph store could not be reached or authenticated against.
    #[error("Graph store unavailable: {0}")]
    GraphStore(#[source] anyhow::Error),

    /// The vector store pool could not be established.
    #[error("Vector store unavailable: {0}")]
    VectorStore(#[source] anyhow::Error),

    /// The embedding backend could not be initialised.
    #[error("Embedding provider unavailable: {0}")]
    Embedding(#[source] anyhow::Error),

    /// Configuration was missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for RagError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
