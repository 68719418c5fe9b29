//! Graph store seam and the SurrealDB implementation.

use super::query::GraphQuery;
use crate::config::GraphStoreConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;

/// Executes graph queries and returns the `content` column of every row.
#[async_trait]
pub trait GraphStore: Send + Sync + std::fmt::Debug {
    async fn run(&self, query: &GraphQuery) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct ContentRow {
    #[serde(default)]
    content: Option<String>,
}

/// SurrealDB-backed property graph.
///
/// One long-lived client is shared by all queries; every [`GraphStore::run`] call issues an
/// independent request against it.
#[derive(Debug, Clone)]
pub struct SurrealGraphStore {
    db: Surreal<Any>,
}

impl SurrealGraphStore {
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self> {
        let db = connect(config.url.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        tracing::info!(
            name: "rag.graph.connected",
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Graph store connected"
        );

        Ok(Self { db })
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn run(&self, query: &GraphQuery) -> Result<Vec<String>> {
        let mut request = self.db.query(query.text.as_str());
        for (key, value) in &query.params {
            request = request.bind((key.clone(), value.clone()));
        }

        let mut response = request.await?;
        let rows: Vec<ContentRow> = response.take(0)?;

        Ok(rows.into_iter().filter_map(|row| row.content).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::domain::{EntityLabel, EntityMention, GenericTerm};
    use crate::rag::extraction::Extraction;
    use crate::rag::graph::{GraphExecutor, GraphQueryBuilder};
    use std::sync::Arc;

    const SEED: &str = r#"
        CREATE chunk:c1 SET content = "Fu Jian and Xie Xuan met at the Fei river.";
        CREATE chunk:c2 SET content = "Fu Jian gathered his army.";
        CREATE chunk:c3 SET content = "Xie Xuan held the southern bank.";
        CREATE chunk:c4 SET content = "Sun Bin feigned retreat.";
        CREATE chunk:c5 SET content = "Pang Juan pursued at speed.";
        CREATE chunk:c6 SET content = "The Fei River ran high that autumn.";
        CREATE person:fu_jian SET name = "Fu Jian";
        CREATE person:xie_xuan SET name = "Xie Xuan";
        CREATE person:sun_bin SET name = "Sun Bin";
        CREATE person:pang_juan SET name = "Pang Juan";
        CREATE loc:fei_river SET name = "Fei river";
        CREATE loc:fei_river_title SET name = "Fei River";
        RELATE person:fu_jian->mentioned_in->chunk:c1;
        RELATE person:fu_jian->mentioned_in->chunk:c2;
        RELATE person:xie_xuan->mentioned_in->chunk:c1;
        RELATE person:xie_xuan->mentioned_in->chunk:c3;
        RELATE person:sun_bin->mentioned_in->chunk:c4;
        RELATE person:pang_juan->mentioned_in->chunk:c5;
        RELATE loc:fei_river->mentioned_in->chunk:c1;
        RELATE loc:fei_river_title->mentioned_in->chunk:c6;
    "#;

    async fn seeded_store(dir: &tempfile::TempDir) -> SurrealGraphStore {
        let config = GraphStoreConfig {
            url: format!("surrealkv://{}", dir.path().join("graph").display()),
            namespace: "test".into(),
            database: "graph".into(),
            username: None,
            password: None,
        };
        let store = SurrealGraphStore::connect(&config).await.unwrap();
        store.db.query(SEED).await.unwrap().check().unwrap();
        store
    }

    fn person(name: &str) -> EntityMention {
        EntityMention::new(name, EntityLabel::Person)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_joint_match_returns_shared_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;
        let builder = GraphQueryBuilder::new();

        let query = builder
            .build_entity_query(&[person("Fu Jian"), person("Xie Xuan")])
            .unwrap();
        let rows = store.run(&query).await.unwrap();
        assert_eq!(rows, vec!["Fu Jian and Xie Xuan met at the Fei river."]);

        let query = builder
            .build_entity_query(&[
                EntityMention::new("Fei river", EntityLabel::Loc),
                person("Fu Jian"),
            ])
            .unwrap();
        let rows = store.run(&query).await.unwrap();
        assert_eq!(rows, vec!["Fu Jian and Xie Xuan met at the Fei river."]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_case_variant_spelling_is_matched() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let fei = EntityMention::new("Fei river", EntityLabel::Loc).with_variants(["Fei River"]);
        let query = GraphQueryBuilder::new().build_entity_query(&[fei]).unwrap();
        let mut rows = store.run(&query).await.unwrap();
        rows.sort();

        assert_eq!(
            rows,
            vec![
                "Fu Jian and Xie Xuan met at the Fei river.",
                "The Fei River ran high that autumn.",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_joint_match_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(seeded_store(&dir).await);

        let query = GraphQueryBuilder::new()
            .build_entity_query(&[person("Sun Bin"), person("Pang Juan")])
            .unwrap();
        assert!(store.run(&query).await.unwrap().is_empty());

        let mut executor = GraphExecutor::new(store, GraphQueryBuilder::new());
        let extraction = Extraction {
            entities: vec![person("Sun Bin"), person("Pang Juan")],
            generics: Vec::new(),
        };
        let passages = executor.run(&extraction, 25).await;
        let contents: Vec<&str> = passages.iter().map(|p| p.content.as_str()).collect();

        assert_eq!(contents, vec!["Sun Bin feigned retreat.", "Pang Juan pursued at speed."]);
        assert_eq!(executor.query_log().len(), 3);
        assert_eq!(executor.failures(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_generic_sample_yields_one_row_per_entity() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir).await;

        let queries = GraphQueryBuilder::new().build_generic_queries(&[GenericTerm::new("people")]);
        let rows = store.run(&queries[0]).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().any(|r| r == "Sun Bin feigned retreat."));
        assert!(rows.iter().any(|r| r == "Pang Juan pursued at speed."));
        assert_eq!(rows.iter().filter(|r| r.starts_with("Sun Bin")).count(), 1);

        let queries = GraphQueryBuilder::new()
            .with_generic_limit(2)
            .build_generic_queries(&[GenericTerm::new("people")]);
        assert_eq!(store.run(&queries[0]).await.unwrap().len(), 2);
    }
}
