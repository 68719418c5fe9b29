//! Merges graph and vector passages into a bounded context.

use crate::rag::domain::{ContextBundle, MAX_CHUNKS, Passage};
use std::collections::HashSet;

/// Graph-first, capped passage composition.
#[derive(Debug, Clone)]
pub struct ContextComposer {
    dedupe: bool,
}

impl Default for ContextComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextComposer {
    pub fn new() -> Self {
        Self { dedupe: false }
    }

    /// Drop passages whose content already appeared earlier in the bundle.
    #[must_use]
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Graph passages first, then vector passages, truncated to `cap`.
    ///
    /// Graph passages are never displaced by vector passages: vector entries only fill the
    /// slots left after every graph entry has been placed.
    pub fn compose(
        &self,
        graph_passages: Vec<Passage>,
        vector_passages: Vec<Passage>,
        cap: usize,
    ) -> ContextBundle {
        let mut seen: HashSet<String> = HashSet::new();
        let passages: Vec<Passage> = graph_passages
            .into_iter()
            .chain(vector_passages)
            .filter(|p| !self.dedupe || seen.insert(p.content.clone()))
            .take(cap)
            .collect();

        tracing::debug!(passages = passages.len(), cap, "Context composed");
        ContextBundle { passages }
    }

    /// [`compose`](Self::compose) with the default cap.
    pub fn compose_default(
        &self,
        graph_passages: Vec<Passage>,
        vector_passages: Vec<Passage>,
    ) -> ContextBundle {
        self.compose(graph_passages, vector_passages, MAX_CHUNKS)
    }
}
