//! Parameterized graph queries over the entity/chunk graph.
//!
//! The graph holds one table per [`EntityLabel`] (`person`, `loc`, ...), a `chunk` table with
//! a `content` field, and a `mentioned_in` edge from an entity to every chunk it appears in.
//! Entity names and limits are always bound as parameters. Table names come from the closed
//! label enum and are the only interpolated fragments.
//!
//! Each `name{i}` parameter is an array holding every spelling of the entity, so a chunk
//! matches when it is linked to a node under any of them.

use crate::rag::domain::{EntityLabel, EntityMention, GenericTerm};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default number of chunks sampled per generic term.
pub const DEFAULT_GENERIC_LIMIT: usize = 10;

/// Which builder produced a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Conjunctive match over one or more named entities.
    Entity,
    /// Category sample for a generic term.
    Generic(EntityLabel),
}

/// A query text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQuery {
    pub text: String,
    pub params: BTreeMap<String, Value>,
    pub kind: QueryKind,
}

impl GraphQuery {
    /// Number of bound parameters.
    #[must_use]
    pub fn bound_params(&self) -> usize {
        self.params.len()
    }

    /// True for entity queries binding at least two entities (name + label each).
    #[must_use]
    pub fn is_conjunctive(&self) -> bool {
        self.kind == QueryKind::Entity && self.bound_params() >= 3
    }

    /// Rebuild the entity list from the `name{i}` / `label{i}` parameters.
    ///
    /// A name may be a single string or an array of spellings, first one canonical. Pairs
    /// whose label is missing or not in the label set are skipped.
    pub fn entities(&self) -> Vec<EntityMention> {
        let mut entities = Vec::new();
        for (key, value) in &self.params {
            let Some(index) = key.strip_prefix("name") else {
                continue;
            };
            let spellings: Vec<&str> = match value {
                Value::String(name) => vec![name.as_str()],
                Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
                _ => continue,
            };
            let Some((name, variants)) = spellings.split_first() else {
                continue;
            };
            let label = self
                .params
                .get(&format!("label{index}"))
                .and_then(Value::as_str)
                .and_then(|l| l.parse::<EntityLabel>().ok());

            match label {
                Some(label) => {
                    let position = index.parse::<usize>().unwrap_or(usize::MAX);
                    let mention = EntityMention::new(*name, label).with_variants(variants.to_vec());
                    entities.push((position, mention));
                }
                None => tracing::warn!(param = %key, "Could not find label for entity parameter"),
            }
        }
        entities.sort_by_key(|(index, _)| *index);
        entities.into_iter().map(|(_, e)| e).collect()
    }
}

/// Builds entity and generic queries.
#[derive(Debug, Clone)]
pub struct GraphQueryBuilder {
    generic_limit: usize,
}

impl Default for GraphQueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphQueryBuilder {
    pub fn new() -> Self {
        Self {
            generic_limit: DEFAULT_GENERIC_LIMIT,
        }
    }

    #[must_use]
    pub fn with_generic_limit(mut self, limit: usize) -> Self {
        self.generic_limit = limit.max(1);
        self
    }

    /// Chunks linked to every one of `entities`.
    ///
    /// Returns `None` for an empty list. Each entity adds one edge condition on the same chunk,
    /// so the query only matches chunks mentioning all of them. An entity is satisfied by any
    /// of its spellings. Content is de-duplicated.
    pub fn build_entity_query(&self, entities: &[EntityMention]) -> Option<GraphQuery> {
        if entities.is_empty() {
            return None;
        }

        let mut params = BTreeMap::new();
        let mut conditions = Vec::with_capacity(entities.len());

        for (i, entity) in entities.iter().enumerate() {
            conditions.push(format!(
                "<-mentioned_in<-{}.name CONTAINSANY $name{i}",
                entity.label.table()
            ));
            let spellings: Vec<Value> = entity.spellings().map(Value::from).collect();
            params.insert(format!("name{i}"), Value::Array(spellings));
            params.insert(format!("label{i}"), Value::from(entity.label.as_str()));
        }

        let mut text = String::from("SELECT content FROM chunk\nWHERE ");
        text.push_str(&conditions.join("\n  AND "));
        text.push_str("\nGROUP BY content");

        Some(GraphQuery {
            text,
            params,
            kind: QueryKind::Entity,
        })
    }

    /// One sampling query per mapped generic term; unmapped terms are skipped.
    ///
    /// Each query picks up to `generic_limit` distinct entities of the term's label in random
    /// order and returns one randomly chosen chunk per entity. The chunk is read straight off
    /// the entity's own outgoing edges, so each row costs one edge walk.
    pub fn build_generic_queries<'a, I>(&self, generics: I) -> Vec<GraphQuery>
    where
        I: IntoIterator<Item = &'a GenericTerm>,
    {
        generics
            .into_iter()
            .filter_map(|term| {
                let label = term.label();
                if label.is_none() {
                    tracing::debug!(term = %term, "Skipping unmapped generic term");
                }
                label
            })
            .map(|label| self.generic_query(label))
            .collect()
    }

    fn generic_query(&self, label: EntityLabel) -> GraphQuery {
        let table = label.table();
        let text = format!(
            "SELECT array::first(array::shuffle(->mentioned_in->chunk.content)) AS content\n\
             FROM {table}\n\
             WHERE count(->mentioned_in) > 0\n\
             ORDER BY RAND()\n\
             LIMIT $limit"
        );

        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), Value::from(self.generic_limit));

        GraphQuery {
            text,
            params,
            kind: QueryKind::Generic(label),
        }
    }
}
