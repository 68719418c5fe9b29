use std::sync::{Arc, Mutex};

use futures::{StreamExt, stream};
use hybrid_rag::llm::{EventStream, LlmDriver, LlmRequest, Message, MessageRole};
use hybrid_rag::normalized::NormalizedEvent;
use hybrid_rag::rag::domain::{EntityLabel, Passage};
use hybrid_rag::rag::embedding::Embedder;
use hybrid_rag::rag::extraction::EntityExtractor;
use hybrid_rag::rag::extraction::dictionary::{DictionaryEntry, EntityDictionary};
use hybrid_rag::rag::graph::{GraphQuery, GraphStore, QueryKind};
use hybrid_rag::rag::orchestrator::RETRIEVAL_FAILED_MESSAGE;
use hybrid_rag::rag::{QueryOrchestrator, RetrievalSettings, VectorRetriever, VectorStore};

// =============================================================================
// Fakes
// =============================================================================

/// Answers entity queries from a fixed (entity name -> chunks) table. Conjunctive queries
/// only match when every named entity shares a chunk.
#[derive(Debug, Default)]
struct FakeGraph {
    chunks: Vec<(&'static str, Vec<&'static str>)>,
    fail: bool,
    issued: Mutex<Vec<GraphQuery>>,
}

impl FakeGraph {
    fn new(chunks: Vec<(&'static str, Vec<&'static str>)>) -> Self {
        Self {
            chunks,
            fail: false,
            issued: Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for FakeGraph {
    async fn run(&self, query: &GraphQuery) -> anyhow::Result<Vec<String>> {
        self.issued.lock().unwrap().push(query.clone());
        if self.fail {
            anyhow::bail!("graph session expired");
        }
        if query.kind != QueryKind::Entity {
            return Ok(Vec::new());
        }
        let names: Vec<String> = query.entities().into_iter().map(|e| e.text).collect();
        Ok(self
            .chunks
            .iter()
            .filter(|(_, mentions)| names.iter().all(|n| mentions.contains(&n.as_str())))
            .map(|(content, _)| (*content).to_string())
            .collect())
    }
}

#[derive(Debug)]
struct FakeVectorStore {
    passages: Vec<Passage>,
    fail: bool,
}

#[async_trait::async_trait]
impl VectorStore for FakeVectorStore {
    async fn find_similar(&self, _embedding: &[f32], limit: usize) -> anyhow::Result<Vec<Passage>> {
        if self.fail {
            anyhow::bail!("connection pool timed out");
        }
        Ok(self.passages.iter().take(limit).cloned().collect())
    }

    async fn find_similar_above_threshold(
        &self,
        _embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> anyhow::Result<Vec<Passage>> {
        if self.fail {
            anyhow::bail!("connection pool timed out");
        }
        Ok(self
            .passages
            .iter()
            .filter(|p| p.similarity.unwrap_or(0.0) >= threshold)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug)]
struct FakeEmbedder;

#[async_trait::async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.25; 4])
    }
}

/// Streams fixed text pieces and records the prompt it was given.
#[derive(Debug, Default)]
struct FakeDriver {
    pieces: Vec<&'static str>,
    fail_after: bool,
    requests: Mutex<Vec<LlmRequest>>,
}

#[async_trait::async_trait]
impl LlmDriver for FakeDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        self.requests.lock().unwrap().push(req);
        let mut events: Vec<anyhow::Result<NormalizedEvent>> = self
            .pieces
            .iter()
            .map(|p| {
                Ok(NormalizedEvent::MessageDelta {
                    text: (*p).to_string(),
                })
            })
            .collect();
        if self.fail_after {
            events.push(Err(anyhow::anyhow!("stream reset by peer")));
        } else {
            events.push(Ok(NormalizedEvent::Done));
        }
        Ok(Box::pin(stream::iter(events)))
    }
}

fn vector_passages(n: usize) -> Vec<Passage> {
    (0..n)
        .map(|i| {
            Passage::new(format!("vector passage {i}"))
                .with_chapter("Terrain")
                .with_similarity(0.9 - i as f32 * 0.1)
        })
        .collect()
}

fn extractor() -> Arc<EntityExtractor> {
    let dictionary = EntityDictionary::from_entries([
        DictionaryEntry {
            text: "Fei river".to_string(),
            label: EntityLabel::Loc,
        },
        DictionaryEntry {
            text: "Fu Jian".to_string(),
            label: EntityLabel::Person,
        },
        DictionaryEntry {
            text: "Xie Xuan".to_string(),
            label: EntityLabel::Person,
        },
    ]);
    Arc::new(EntityExtractor::new(&dictionary).with_vocabulary(["terrain", "battle", "who"]))
}

fn orchestrator(
    graph: Arc<FakeGraph>,
    vector: FakeVectorStore,
    driver: Arc<FakeDriver>,
) -> QueryOrchestrator {
    QueryOrchestrator::new(
        extractor(),
        graph,
        VectorRetriever::new(Arc::new(vector)),
        Arc::new(FakeEmbedder),
        driver,
    )
}

fn answers(snapshots: &[Vec<Message>]) -> Vec<String> {
    snapshots
        .iter()
        .map(|s| s.last().map(|m| m.content.clone()).unwrap_or_default())
        .collect()
}

// =============================================================================
// Retrieval
// =============================================================================

#[tokio::test]
async fn test_vector_only_when_nothing_extracted() {
    let graph = Arc::new(FakeGraph::default());
    let orchestrator = orchestrator(
        Arc::clone(&graph),
        FakeVectorStore {
            passages: vector_passages(4),
            fail: false,
        },
        Arc::new(FakeDriver::default()),
    );

    let context = orchestrator
        .retrieve_context("How should an army be supplied?")
        .await;

    assert!(context.extraction.is_empty());
    assert!(context.graph_queries.is_empty());
    assert!(graph.issued.lock().unwrap().is_empty());
    assert_eq!(context.bundle.passages, vector_passages(4));
}

#[tokio::test]
async fn test_fei_river_end_to_end_context() {
    let graph = Arc::new(FakeGraph::new(vec![
        ("At the Fei river the larger army broke.", vec!["Fei river"]),
        ("Fu Jian crossed the Fei river.", vec!["Fei river", "Fu Jian"]),
    ]));
    let orchestrator = orchestrator(
        Arc::clone(&graph),
        FakeVectorStore {
            passages: vector_passages(6),
            fail: false,
        },
        Arc::new(FakeDriver::default()),
    );

    let context = orchestrator
        .retrieve_context("What did Sun Tzu say about terrain near the Fei river?")
        .await;

    assert_eq!(context.extraction.entities.len(), 1);
    assert_eq!(context.extraction.entities[0].text, "Fei river");
    assert_eq!(context.extraction.entities[0].label, EntityLabel::Loc);
    assert_eq!(context.extraction.generics.len(), 1);
    assert_eq!(context.extraction.generics[0].as_str(), "terrain");

    // "terrain" is detected but unmapped: only the single-entity query is issued.
    assert_eq!(context.graph_queries.len(), 1);
    assert_eq!(context.graph_queries[0].kind, QueryKind::Entity);
    assert_eq!(context.graph_queries[0].bound_params(), 2);

    assert_eq!(context.graph_passages, 2);
    assert_eq!(context.vector_passages, Some(6));
    assert_eq!(context.bundle.len(), 8);
    assert!(context.bundle.len() <= 25);
    assert_eq!(
        context.bundle.passages[0].content,
        "At the Fei river the larger army broke."
    );
    assert_eq!(context.bundle.passages[2].content, "vector passage 0");
}

#[tokio::test]
async fn test_conjunctive_miss_falls_back_per_entity() {
    let graph = Arc::new(FakeGraph::new(vec![
        ("Fu Jian led the northern host.", vec!["Fu Jian"]),
        ("Xie Xuan commanded the Beifu troops.", vec!["Xie Xuan"]),
    ]));
    let orchestrator = orchestrator(
        Arc::clone(&graph),
        FakeVectorStore {
            passages: vector_passages(2),
            fail: false,
        },
        Arc::new(FakeDriver::default()),
    );

    let context = orchestrator
        .retrieve_context("Did Fu Jian ever face Xie Xuan?")
        .await;

    assert_eq!(context.extraction.entities.len(), 2);
    assert_eq!(context.graph_queries.len(), 3);
    assert!(context.graph_queries[0].is_conjunctive());
    assert!(!context.graph_queries[1].is_conjunctive());
    assert!(!context.graph_queries[2].is_conjunctive());

    let contents: Vec<&str> = context
        .bundle
        .iter()
        .map(|p| p.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec![
            "Fu Jian led the northern host.",
            "Xie Xuan commanded the Beifu troops.",
            "vector passage 0",
            "vector passage 1",
        ]
    );
}

#[tokio::test]
async fn test_cap_and_threshold_settings_apply() {
    let orchestrator = orchestrator(
        Arc::new(FakeGraph::default()),
        FakeVectorStore {
            passages: vector_passages(6),
            fail: false,
        },
        Arc::new(FakeDriver::default()),
    )
    .with_settings(RetrievalSettings {
        max_chunks: 2,
        similarity_threshold: Some(0.75),
        ..RetrievalSettings::default()
    });

    let context = orchestrator.retrieve_context("How is victory won?").await;

    // Threshold keeps 0.9 and 0.8; the cap of 2 holds either way.
    assert_eq!(context.vector_passages, Some(2));
    assert_eq!(context.bundle.len(), 2);
}

// =============================================================================
// Answer streaming
// =============================================================================

#[tokio::test]
async fn test_answer_grows_monotonically() {
    let driver = Arc::new(FakeDriver {
        pieces: vec!["All warfare ", "is based ", "on deception."],
        ..FakeDriver::default()
    });
    let orchestrator = orchestrator(
        Arc::new(FakeGraph::default()),
        FakeVectorStore {
            passages: vector_passages(3),
            fail: false,
        },
        Arc::clone(&driver),
    );

    let history = vec![
        Message::user("Who wrote the Art of War?"),
        Message::assistant("Sun Tzu."),
    ];
    let snapshots: Vec<Vec<Message>> = orchestrator
        .answer("What is the essence of war?", history)
        .collect()
        .await;

    let answers = answers(&snapshots);
    assert_eq!(answers.first().map(String::as_str), Some(""));
    for pair in answers.windows(2) {
        assert!(pair[1].len() > pair[0].len());
        assert!(pair[1].starts_with(&pair[0]));
    }
    assert_eq!(
        answers.last().map(String::as_str),
        Some("All warfare is based on deception.")
    );

    // Exactly one user entry and one assistant entry appended to the prior two.
    let last = snapshots.last().unwrap();
    assert_eq!(last.len(), 4);
    assert_eq!(last[2].role, MessageRole::User);
    assert_eq!(last[3].role, MessageRole::Assistant);

    // Prompt: system context, prior history, then the question.
    let requests = driver.requests.lock().unwrap();
    let messages = &requests[0].messages;
    assert_eq!(messages[0].role, MessageRole::System);
    assert!(messages[0].content.contains("[Terrain]\nvector passage 0"));
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].content, "What is the essence of war?");
}

#[tokio::test]
async fn test_generation_error_is_appended_inline() {
    let driver = Arc::new(FakeDriver {
        pieces: vec!["Know the enemy"],
        fail_after: true,
        ..FakeDriver::default()
    });
    let orchestrator = orchestrator(
        Arc::new(FakeGraph::default()),
        FakeVectorStore {
            passages: vector_passages(1),
            fail: false,
        },
        driver,
    );

    let snapshots: Vec<Vec<Message>> = orchestrator
        .answer("What must a general know?", Vec::new())
        .collect()
        .await;

    let answer = answers(&snapshots).pop().unwrap();
    assert!(answer.starts_with("Know the enemy"));
    assert!(answer.contains("stream reset by peer"));
    assert_eq!(snapshots.last().unwrap().len(), 2);
}

#[tokio::test]
async fn test_both_retrievers_failing_shows_error() {
    let graph = Arc::new(FakeGraph::unreachable());
    let driver = Arc::new(FakeDriver {
        pieces: vec!["should not be generated"],
        ..FakeDriver::default()
    });
    let orchestrator = orchestrator(
        Arc::clone(&graph),
        FakeVectorStore {
            passages: Vec::new(),
            fail: true,
        },
        Arc::clone(&driver),
    );

    let snapshots: Vec<Vec<Message>> = orchestrator
        .answer("What happened at the Fei river?", Vec::new())
        .collect()
        .await;

    assert_eq!(graph.issued.lock().unwrap().len(), 1);
    let last = snapshots.last().unwrap();
    assert_eq!(last.len(), 2);
    assert_eq!(last[1].content, RETRIEVAL_FAILED_MESSAGE);
    assert!(driver.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_graph_failure_is_reported_per_query() {
    let orchestrator = orchestrator(
        Arc::new(FakeGraph::unreachable()),
        FakeVectorStore {
            passages: Vec::new(),
            fail: true,
        },
        Arc::new(FakeDriver::default()),
    );

    let context = orchestrator
        .retrieve_context("Did Fu Jian ever face Xie Xuan?")
        .await;

    // The failed conjunctive query is not decomposed.
    assert_eq!(context.graph_queries.len(), 1);
    assert_eq!(context.graph_failures, 1);
    assert!(context.graph_failed());
    assert!(context.retrieval_failed());
}

#[tokio::test]
async fn test_vector_failure_without_graph_terms_still_answers() {
    let graph = Arc::new(FakeGraph::default());
    let driver = Arc::new(FakeDriver {
        pieces: vec!["Supply lines decide campaigns."],
        ..FakeDriver::default()
    });
    let orchestrator = orchestrator(
        Arc::clone(&graph),
        FakeVectorStore {
            passages: Vec::new(),
            fail: true,
        },
        Arc::clone(&driver),
    );

    let snapshots: Vec<Vec<Message>> = orchestrator
        .answer("How should an army be supplied?", Vec::new())
        .collect()
        .await;

    assert!(graph.issued.lock().unwrap().is_empty());
    assert_eq!(
        answers(&snapshots).pop().as_deref(),
        Some("Supply lines decide campaigns.")
    );
    assert_eq!(driver.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_vector_failure_with_empty_graph_match_still_answers() {
    let driver = Arc::new(FakeDriver {
        pieces: vec!["Little is recorded."],
        ..FakeDriver::default()
    });
    let orchestrator = orchestrator(
        Arc::new(FakeGraph::default()),
        FakeVectorStore {
            passages: Vec::new(),
            fail: true,
        },
        Arc::clone(&driver),
    );

    let context = orchestrator
        .retrieve_context("What happened at the Fei river?")
        .await;
    assert_eq!(context.graph_queries.len(), 1);
    assert_eq!(context.graph_failures, 0);
    assert!(!context.retrieval_failed());

    let snapshots: Vec<Vec<Message>> = orchestrator
        .answer("What happened at the Fei river?", Vec::new())
        .collect()
        .await;
    assert_eq!(
        answers(&snapshots).pop().as_deref(),
        Some("Little is recorded.")
    );
}

#[tokio::test]
async fn test_vector_failure_with_graph_hits_still_answers() {
    let graph = Arc::new(FakeGraph::new(vec![(
        "At the Fei river the larger army broke.",
        vec!["Fei river"],
    )]));
    let driver = Arc::new(FakeDriver {
        pieces: vec!["The Fei river battle."],
        ..FakeDriver::default()
    });
    let orchestrator = orchestrator(
        graph,
        FakeVectorStore {
            passages: Vec::new(),
            fail: true,
        },
        Arc::clone(&driver),
    );

    let snapshots: Vec<Vec<Message>> = orchestrator
        .answer("What happened at the Fei river?", Vec::new())
        .collect()
        .await;

    assert_eq!(
        answers(&snapshots).pop().as_deref(),
        Some("The Fei river battle.")
    );
    let requests = driver.requests.lock().unwrap();
    assert!(requests[0].messages[0]
        .content
        .contains("At the Fei river the larger army broke."));
}
