//! Graph query execution with the conjunctive-match fallback.

use super::query::{GraphQuery, GraphQueryBuilder};
use super::store::GraphStore;
use crate::rag::domain::Passage;
use crate::rag::extraction::Extraction;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many times a failed conjunctive query may be decomposed.
pub const MAX_FALLBACK_DEPTH: usize = 1;

/// Runs graph queries for one turn and records every query it issues.
///
/// Errors from the store are logged and treated as empty results, so graph retrieval never
/// aborts a turn. Create one executor per turn; the log is not shared between turns.
#[derive(Debug)]
pub struct GraphExecutor {
    store: Arc<dyn GraphStore>,
    builder: GraphQueryBuilder,
    log: Vec<GraphQuery>,
    failures: usize,
}

impl GraphExecutor {
    pub fn new(store: Arc<dyn GraphStore>, builder: GraphQueryBuilder) -> Self {
        Self {
            store,
            builder,
            log: Vec::new(),
            failures: 0,
        }
    }

    /// Queries issued so far, oldest first.
    pub fn query_log(&self) -> &[GraphQuery] {
        &self.log
    }

    /// Number of queries that failed in the store.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Execute `query`, decomposing it into single-entity queries when a conjunctive match
    /// finds nothing.
    ///
    /// Fallback queries are appended to the log and their results concatenated in entity
    /// order. Decomposition is bounded by [`MAX_FALLBACK_DEPTH`].
    pub async fn execute(&mut self, query: GraphQuery) -> Vec<Passage> {
        let mut pending = VecDeque::from([(query, 0usize)]);
        let mut passages = Vec::new();

        while let Some((query, depth)) = pending.pop_front() {
            self.log.push(query.clone());

            let Some(contents) = self.attempt(&query).await else {
                continue;
            };

            if contents.is_empty() && query.is_conjunctive() && depth < MAX_FALLBACK_DEPTH {
                let entities = query.entities();
                info!(
                    name: "rag.graph.fallback",
                    entities = entities.len(),
                    depth,
                    "No combined chunks; querying entities individually"
                );
                for entity in entities {
                    if let Some(single) = self
                        .builder
                        .build_entity_query(std::slice::from_ref(&entity))
                    {
                        pending.push_back((single, depth + 1));
                    }
                }
                continue;
            }

            passages.extend(contents.into_iter().map(Passage::new));
        }

        passages
    }

    /// Re-run the most recent query in the log.
    pub async fn execute_newest(&mut self) -> Vec<Passage> {
        match self.log.last().cloned() {
            Some(query) => self.execute(query).await,
            None => Vec::new(),
        }
    }

    /// Full graph step for one query: the entity query (with fallback) followed by every
    /// generic query, concatenated and capped at `max_chunks`.
    pub async fn run(&mut self, extraction: &Extraction, max_chunks: usize) -> Vec<Passage> {
        let mut passages = Vec::new();

        if let Some(query) = self.builder.build_entity_query(&extraction.entities) {
            passages.extend(self.execute(query).await);
        }

        for query in self.builder.build_generic_queries(&extraction.generics) {
            passages.extend(self.execute(query).await);
        }

        passages.truncate(max_chunks);

        debug!(
            queries = self.log.len(),
            failures = self.failures,
            passages = passages.len(),
            "Graph retrieval complete"
        );
        passages
    }

    async fn attempt(&mut self, query: &GraphQuery) -> Option<Vec<String>> {
        match self.store.run(query).await {
            Ok(contents) => {
                debug!(
                    kind = ?query.kind,
                    params = query.bound_params(),
                    rows = contents.len(),
                    "Graph query executed"
                );
                Some(contents)
            }
            Err(e) => {
                self.failures += 1;
                warn!(
                    name: "rag.graph.query_failed",
                    kind = ?query.kind,
                    error = %e,
                    "Graph query failed"
                );
                None
            }
        }
    }
}
