//! Nearest-neighbour passage retrieval over pgvector.

use crate::config::VectorStoreConfig;
use crate::rag::domain::Passage;
use anyhow::{Result, bail};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Passages ranked by cosine similarity (`1 - cosine distance`), best first.
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    async fn find_similar(&self, embedding: &[f32], limit: usize) -> Result<Vec<Passage>>;

    async fn find_similar_above_threshold(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<Passage>>;
}

// =============================================================================
// Postgres / pgvector
// =============================================================================

/// A passages table with `chunk`, `chapter` and `embedding vector(N)` columns.
#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
}

impl PgVectorStore {
    /// Connect a bounded pool. Each search checks a connection out and returns it when the
    /// query completes, whether it succeeded or not.
    pub async fn connect(config: &VectorStoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await?;

        tracing::info!(
            name: "rag.vector.connected",
            table = %config.table,
            max_connections = config.max_connections,
            "Vector store connected"
        );

        Self::with_pool(pool, &config.table)
    }

    /// Wrap an existing pool. `table` must be a plain SQL identifier.
    pub fn with_pool(pool: PgPool, table: &str) -> Result<Self> {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!("Invalid vector table name: {table:?}");
        }
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    async fn search(
        &self,
        embedding: &[f32],
        threshold: Option<f32>,
        limit: usize,
    ) -> Result<Vec<Passage>> {
        let embedding_vector = Vector::from(embedding.to_vec());
        let limit_i64 = limit as i64;

        let sql = match threshold {
            Some(_) => format!(
                r#"
                SELECT id, chunk, chapter, 1 - (embedding <=> $1) AS similarity
                FROM {}
                WHERE 1 - (embedding <=> $1) >= $3
                ORDER BY embedding <=> $1
                LIMIT $2
                "#,
                self.table
            ),
            None => format!(
                r#"
                SELECT id, chunk, chapter, 1 - (embedding <=> $1) AS similarity
                FROM {}
                ORDER BY embedding <=> $1
                LIMIT $2
                "#,
                self.table
            ),
        };

        let mut query = sqlx::query(&sql).bind(embedding_vector).bind(limit_i64);
        if let Some(threshold) = threshold {
            query = query.bind(f64::from(threshold));
        }

        let mut conn = self.pool.acquire().await?;
        let rows = query.fetch_all(&mut *conn).await?;
        drop(conn);

        let mut passages = Vec::with_capacity(rows.len());
        for row in rows {
            let content: String = row.try_get("chunk")?;
            let chapter: Option<String> = row.try_get("chapter")?;
            let similarity: f64 = row.try_get("similarity")?;

            passages.push(Passage {
                content,
                chapter,
                similarity: Some(similarity as f32),
            });
        }
        Ok(passages)
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn find_similar(&self, embedding: &[f32], limit: usize) -> Result<Vec<Passage>> {
        self.search(embedding, None, limit).await
    }

    async fn find_similar_above_threshold(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<Passage>> {
        self.search(embedding, Some(threshold), limit).await
    }
}

// =============================================================================
// Retriever
// =============================================================================

/// Error-absorbing front for a [`VectorStore`].
///
/// Store failures are logged and reported as `None` ("no vector context"), never as errors.
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    store: Arc<dyn VectorStore>,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub async fn find_similar(&self, embedding: &[f32], limit: usize) -> Option<Vec<Passage>> {
        match self.store.find_similar(embedding, limit).await {
            Ok(passages) => {
                debug!(limit, passages = passages.len(), "Vector search complete");
                Some(passages)
            }
            Err(e) => {
                error!(
                    name: "rag.vector.search_failed",
                    error = %e,
                    "Error while retrieving similar chunks"
                );
                None
            }
        }
    }

    pub async fn find_similar_above_threshold(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Option<Vec<Passage>> {
        match self
            .store
            .find_similar_above_threshold(embedding, threshold, limit)
            .await
        {
            Ok(passages) => {
                debug!(
                    limit,
                    threshold,
                    passages = passages.len(),
                    "Vector threshold search complete"
                );
                Some(passages)
            }
            Err(e) => {
                error!(
                    name: "rag.vector.search_failed",
                    threshold,
                    error = %e,
                    "Error while retrieving chunks above threshold"
                );
                None
            }
        }
    }
}
