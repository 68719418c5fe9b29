//! Turn orchestration: extraction, concurrent graph and vector retrieval, composition and
//! streamed generation.
//!
//! A turn walks the [`TurnState`] machine strictly in order. Graph and vector retrieval run
//! concurrently and are joined before composition. Every per-query failure is absorbed here
//! and becomes either less context or visible error text in the assistant entry; nothing
//! escapes to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_rag::rag::QueryOrchestrator;
//!
//! let orchestrator = QueryOrchestrator::from_config(&config, llm_settings).await?;
//! let turn = orchestrator.answer("Who fought at the Fei river?", Vec::new());
//! futures::pin_mut!(turn);
//! while let Some(history) = turn.next().await {
//!     render(&history);
//! }
//! ```

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, EmbeddingProvider, RetrievalConfig};
use crate::error::RagError;
use crate::llm::{
    ChatCompletionsDriver, Increment, LlmDriver, LlmRequest, LlmSettings, Message, generate_stream,
};
use crate::session::Conversation;

use super::composer::ContextComposer;
use super::domain::{ContextBundle, MAX_CHUNKS, Passage};
use super::embedding::{Embedder, FastEmbedder, OpenAiEmbedder};
use super::extraction::{EntityExtractor, Extraction};
use super::graph::query::DEFAULT_GENERIC_LIMIT;
use super::graph::{GraphExecutor, GraphQuery, GraphQueryBuilder, GraphStore, SurrealGraphStore};
use super::vector::{PgVectorStore, VectorRetriever};

/// Default vector neighbours per question.
pub const DEFAULT_VECTOR_LIMIT: usize = 6;

/// Shown in place of an answer when neither store produced any context.
pub const RETRIEVAL_FAILED_MESSAGE: &str =
    "Sorry, I could not retrieve any context for this question. Please try again later.";

/// System prompt used when none is configured. `{context}` is replaced by the rendered
/// passages.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert on Sun Tzu's The Art of War.

You will helpfully answer users' questions about the Art of War, with close reference to the \
extracts below from a book-length modern commentary on the Art of War by Hua Shan. Explicitly \
reference at least 2 passages from the extracts to illustrate your points. In each reference, \
quote from the passage, include its chapter title, and clearly distinguish between Hua Shan's \
own words and Sun Tzu's original text. Loosely follow this format:
\"<point>, as pointed out by Hua Shan in the chapter entitled <chapter title> - <quotation>\"

Always include at least one direct quote from Sun Tzu. The users are not very familiar with \
Chinese history, culture and geography, so add brief explanations of people, places and events, \
e.g. 'the Fei river - a river that no longer exists, but which is believed to have flowed \
through modern Anhui province, at the southern limit of the Central China Plain.'

Do not limit the length of your output; answer as fully as possible.

Extracts from the book:
{context}";

// =============================================================================
// Turn State Machine
// =============================================================================

/// Stages of one question/answer turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Extracting,
    RetrievingGraph,
    RetrievingVector,
    Composing,
    Generating,
    Emitting,
    Terminal,
}

impl TurnState {
    /// The only state reachable from this one. `Emitting` loops back for the next turn.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::AwaitingInput => Self::Extracting,
            Self::Extracting => Self::RetrievingGraph,
            Self::RetrievingGraph => Self::RetrievingVector,
            Self::RetrievingVector => Self::Composing,
            Self::Composing => Self::Generating,
            Self::Generating => Self::Emitting,
            Self::Emitting => Self::AwaitingInput,
            Self::Terminal => Self::Terminal,
        }
    }
}

fn advance(state: &mut TurnState, request_id: &str) {
    let next = state.next();
    debug!(name: "rag.turn.state", request_id, from = ?*state, to = ?next, "Turn state advanced");
    *state = next;
}

// =============================================================================
// Settings & Results
// =============================================================================

/// Per-turn retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub max_chunks: usize,
    pub vector_limit: usize,
    pub generic_limit: usize,
    pub dedupe: bool,
    pub similarity_threshold: Option<f32>,
    /// Expected embedding length; mismatching query vectors are not sent to the store.
    pub embedding_dimension: Option<usize>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_chunks: MAX_CHUNKS,
            vector_limit: DEFAULT_VECTOR_LIMIT,
            generic_limit: DEFAULT_GENERIC_LIMIT,
            dedupe: false,
            similarity_threshold: None,
            embedding_dimension: None,
        }
    }
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_chunks: config.max_chunks,
            vector_limit: config.vector_limit,
            generic_limit: config.generic_limit,
            dedupe: config.dedupe,
            similarity_threshold: config.similarity_threshold,
            embedding_dimension: None,
        }
    }
}

/// Everything retrieval produced for one question.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub extraction: Extraction,
    /// Graph queries issued, in order, including fallbacks.
    pub graph_queries: Vec<GraphQuery>,
    /// Graph queries the store rejected or could not run.
    pub graph_failures: usize,
    pub graph_passages: usize,
    /// `None` when embedding or the vector store failed.
    pub vector_passages: Option<usize>,
    pub bundle: ContextBundle,
}

impl RetrievedContext {
    /// Graph queries were issued and every one of them errored.
    ///
    /// A graph step that issued no queries, or whose queries simply matched nothing, has not
    /// failed.
    #[must_use]
    pub fn graph_failed(&self) -> bool {
        !self.graph_queries.is_empty() && self.graph_failures == self.graph_queries.len()
    }

    /// Both retrievers failed: the vector side errored and so did every graph query.
    #[must_use]
    pub fn retrieval_failed(&self) -> bool {
        self.vector_passages.is_none() && self.graph_failed()
    }
}

/// Output of the graph branch of one turn.
#[derive(Debug, Default)]
struct GraphStep {
    passages: Vec<Passage>,
    queries: Vec<GraphQuery>,
    failures: usize,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Coordinates retrieval and generation for each turn.
#[derive(Clone)]
pub struct QueryOrchestrator {
    extractor: Arc<EntityExtractor>,
    graph: Arc<dyn GraphStore>,
    vector: VectorRetriever,
    embedder: Arc<dyn Embedder>,
    driver: Arc<dyn LlmDriver>,
    builder: GraphQueryBuilder,
    composer: ContextComposer,
    settings: RetrievalSettings,
    system_prompt: String,
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("settings", &self.settings)
            .field("embedder", &self.embedder)
            .field("driver", &self.driver)
            .finish()
    }
}

impl QueryOrchestrator {
    pub fn new(
        extractor: Arc<EntityExtractor>,
        graph: Arc<dyn GraphStore>,
        vector: VectorRetriever,
        embedder: Arc<dyn Embedder>,
        driver: Arc<dyn LlmDriver>,
    ) -> Self {
        Self {
            extractor,
            graph,
            vector,
            embedder,
            driver,
            builder: GraphQueryBuilder::new(),
            composer: ContextComposer::new(),
            settings: RetrievalSettings::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RetrievalSettings) -> Self {
        self.builder = GraphQueryBuilder::new().with_generic_limit(settings.generic_limit);
        self.composer = ContextComposer::new().with_dedupe(settings.dedupe);
        self.settings = settings;
        self
    }

    /// Replace the system prompt. A `{context}` placeholder receives the passages; without
    /// one they are appended.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Build every collaborator from configuration.
    ///
    /// Loads the entity dictionary, connects both stores and initialises the embedder. Any
    /// failure here is fatal.
    pub async fn from_config(config: &AppConfig, llm: LlmSettings) -> Result<Self, RagError> {
        let mut extractor = EntityExtractor::from_path(&config.entities.dictionary_path)?;
        if let Some(vocabulary) = &config.entities.generics {
            extractor = extractor.with_vocabulary(vocabulary);
        }

        let graph = SurrealGraphStore::connect(&config.graph_store)
            .await
            .map_err(RagError::GraphStore)?;

        let store = PgVectorStore::connect(&config.vector_store)
            .await
            .map_err(RagError::VectorStore)?;

        let embedder: Arc<dyn Embedder> = match config.embedding.provider {
            EmbeddingProvider::Fastembed => {
                let embedder = FastEmbedder::new(config.embedding.model.clone());
                embedder.initialize().await.map_err(RagError::Embedding)?;
                Arc::new(embedder)
            }
            EmbeddingProvider::Openai => Arc::new(OpenAiEmbedder::new(
                config
                    .embedding
                    .base_url
                    .clone()
                    .unwrap_or_else(|| llm.base_url.clone()),
                config
                    .embedding
                    .api_key
                    .clone()
                    .or_else(|| llm.api_key.clone()),
                config.embedding.model.clone(),
            )),
        };

        info!(
            name: "rag.orchestrator.ready",
            model = %llm.model,
            embedding_model = %config.embedding.model,
            vocabulary = extractor.vocabulary().len(),
            "Query orchestrator initialised"
        );

        let settings = RetrievalSettings {
            embedding_dimension: Some(config.embedding.dimension),
            ..RetrievalSettings::from(&config.retrieval)
        };

        Ok(Self::new(
            Arc::new(extractor),
            Arc::new(graph),
            VectorRetriever::new(Arc::new(store)),
            embedder,
            Arc::new(ChatCompletionsDriver::new(llm)),
        )
        .with_settings(settings))
    }

    /// Run extraction and both retrievers for `question` and compose the bounded context.
    pub async fn retrieve_context(&self, question: &str) -> RetrievedContext {
        let request_id = Uuid::new_v4().to_string();
        let mut state = TurnState::AwaitingInput;
        self.retrieve(question, &request_id, &mut state).await
    }

    async fn retrieve(
        &self,
        question: &str,
        request_id: &str,
        state: &mut TurnState,
    ) -> RetrievedContext {
        advance(state, request_id);
        let extraction = self.extractor.extract(question);
        info!(
            name: "rag.turn.extracted",
            request_id,
            entities = extraction.entities.len(),
            generics = extraction.generics.len(),
            "Extracted query terms"
        );

        advance(state, request_id);
        let graph = self.retrieve_graph(&extraction);
        advance(state, request_id);
        let vector = self.retrieve_vector(question);
        let (graph_step, vector_passages) = tokio::join!(graph, vector);

        advance(state, request_id);
        let GraphStep {
            passages: graph_passages,
            queries: graph_queries,
            failures: graph_failures,
        } = graph_step;
        let graph_count = graph_passages.len();
        let vector_count = vector_passages.as_ref().map(Vec::len);
        let bundle = self.composer.compose(
            graph_passages,
            vector_passages.unwrap_or_default(),
            self.settings.max_chunks,
        );

        info!(
            name: "rag.turn.composed",
            request_id,
            graph_queries = graph_queries.len(),
            graph_failures,
            graph_passages = graph_count,
            vector_passages = ?vector_count,
            passages = bundle.len(),
            "Context composed"
        );

        RetrievedContext {
            extraction,
            graph_queries,
            graph_failures,
            graph_passages: graph_count,
            vector_passages: vector_count,
            bundle,
        }
    }

    async fn retrieve_graph(&self, extraction: &Extraction) -> GraphStep {
        if extraction.is_empty() {
            return GraphStep::default();
        }
        let mut executor = GraphExecutor::new(Arc::clone(&self.graph), self.builder.clone());
        let passages = executor.run(extraction, self.settings.max_chunks).await;
        GraphStep {
            passages,
            queries: executor.query_log().to_vec(),
            failures: executor.failures(),
        }
    }

    async fn retrieve_vector(&self, question: &str) -> Option<Vec<Passage>> {
        let embedding = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    name: "rag.embedding.failed",
                    error = %e,
                    "Query embedding failed; continuing without vector context"
                );
                return None;
            }
        };

        if let Some(expected) = self.settings.embedding_dimension {
            if embedding.len() != expected {
                warn!(
                    name: "rag.embedding.dimension_mismatch",
                    expected,
                    actual = embedding.len(),
                    "Query embedding has the wrong length; skipping vector search"
                );
                return None;
            }
        }

        match self.settings.similarity_threshold {
            Some(threshold) => {
                self.vector
                    .find_similar_above_threshold(&embedding, threshold, self.settings.vector_limit)
                    .await
            }
            None => {
                self.vector
                    .find_similar(&embedding, self.settings.vector_limit)
                    .await
            }
        }
    }

    fn build_request(
        &self,
        history: &[Message],
        question: &str,
        bundle: &ContextBundle,
    ) -> LlmRequest {
        let context = if bundle.is_empty() {
            "(no extracts found)".to_string()
        } else {
            bundle.render()
        };

        let system = if self.system_prompt.contains("{context}") {
            self.system_prompt.replace("{context}", &context)
        } else {
            format!("{}\n\n{context}", self.system_prompt)
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(question));
        LlmRequest { messages }
    }

    /// Answer `question` given the prior `history`.
    ///
    /// Yields the full history after the user entry and empty assistant entry are appended,
    /// then again after every increment of the answer. The assistant content only ever
    /// grows. Failures are written into the assistant entry; the stream always ends normally.
    pub fn answer(
        &self,
        question: &str,
        history: Vec<Message>,
    ) -> impl Stream<Item = Vec<Message>> + Send + 'static {
        let this = self.clone();
        let question = question.to_string();

        async_stream::stream! {
            let request_id = Uuid::new_v4().to_string();
            let mut state = TurnState::AwaitingInput;
            let prior = history.clone();
            let mut conversation = Conversation::from_messages(history);
            conversation.push_user(question.as_str());

            let context = this.retrieve(&question, &request_id, &mut state).await;

            advance(&mut state, &request_id);
            conversation.begin_assistant();
            yield conversation.snapshot();

            if context.retrieval_failed() {
                warn!(
                    name: "rag.turn.retrieval_failed",
                    request_id = %request_id,
                    "No context from either store"
                );
                conversation.append_assistant(RETRIEVAL_FAILED_MESSAGE);
                advance(&mut state, &request_id);
                yield conversation.snapshot();
                return;
            }

            let request = this.build_request(&prior, &question, &context.bundle);
            let increments = generate_stream(Arc::clone(&this.driver), request);
            futures::pin_mut!(increments);

            let mut emitting = false;
            while let Some(increment) = increments.next().await {
                if !emitting {
                    advance(&mut state, &request_id);
                    emitting = true;
                }
                match increment {
                    Increment::Text(text) => conversation.append_assistant(&text),
                    Increment::Error(message) => {
                        let answered = conversation.last_answer().is_some_and(|a| !a.is_empty());
                        conversation.append_assistant(&generation_error_text(&message, answered));
                    }
                }
                yield conversation.snapshot();
            }
            if !emitting {
                advance(&mut state, &request_id);
            }

            info!(
                name: "rag.turn.complete",
                request_id = %request_id,
                answer_len = conversation.last_answer().map_or(0, str::len),
                "Turn complete"
            );
        }
    }
}

fn generation_error_text(message: &str, after_text: bool) -> String {
    if after_text {
        format!("\n\n[Error while generating the answer: {message}]")
    } else {
        format!("[Error while generating the answer: {message}]")
    }
}
