//! Query embedding providers.
//!
//! - [`FastEmbedder`]: local ONNX inference via `fastembed`
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/v1/embeddings` endpoint

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// =============================================================================
// FastEmbed
// =============================================================================

/// Local embedding model.
///
/// The model is loaded by [`FastEmbedder::initialize`] or on first use, and reloaded if an
/// inference task dies and takes it down.
pub struct FastEmbedder {
    model_name: String,
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model_name", &self.model_name)
            .field("model_loaded", &"Dynamic")
            .finish()
    }
}

impl FastEmbedder {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model: Arc::new(Mutex::new(None)),
        }
    }

    fn resolve_model(name: &str) -> Result<EmbeddingModel> {
        match name {
            "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "BAAI/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "BAAI/bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
            "sentence-transformers/all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            other => Err(anyhow!("Unsupported fastembed model: {other}")),
        }
    }

    fn loader(&self) -> impl FnOnce() -> Result<TextEmbedding> + Send + 'static {
        let model_name = self.model_name.clone();
        move || {
            info!(model = %model_name, "Initializing fastembed model...");
            let mut options = InitOptions::new(Self::resolve_model(&model_name)?);
            options.show_download_progress = true;
            Ok(TextEmbedding::try_new(options)?)
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        with_model(&self.model, self.loader(), |_| Ok(())).await
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = vec![text.to_string()];
        with_model(&self.model, self.loader(), move |model| {
            model
                .embed(input, None)
                .map_err(|e| anyhow!(e))?
                .into_iter()
                .next()
                .context("No embedding generated")
        })
        .await
    }
}

/// Run `job` against the model in `slot` on the blocking pool.
///
/// An empty slot is filled by `load` first. The model is put back once `job` returns. A job
/// that panics takes the model with it, so the slot stays empty and the next call reloads.
async fn with_model<M, T, L, F>(slot: &Mutex<Option<M>>, load: L, job: F) -> Result<T>
where
    M: Send + 'static,
    T: Send + 'static,
    L: FnOnce() -> Result<M> + Send + 'static,
    F: FnOnce(&mut M) -> Result<T> + Send + 'static,
{
    let mut guard = slot.lock().await;
    let loaded = guard.take();

    let task = tokio::task::spawn_blocking(move || {
        let mut model = match loaded {
            Some(model) => model,
            None => load()?,
        };
        let result = job(&mut model);
        Ok::<_, anyhow::Error>((model, result))
    });

    match task.await {
        Ok(Ok((model, result))) => {
            *guard = Some(model);
            result
        }
        Ok(Err(e)) => Err(e),
        Err(e) => {
            warn!(
                name: "rag.embedding.model_lost",
                error = %e,
                "Embedding task aborted; model will be reloaded on next use"
            );
            Err(anyhow!("Embedding task aborted: {e}"))
        }
    }
}

// =============================================================================
// OpenAI-compatible
// =============================================================================

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Remote embeddings over HTTP.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp: EmbeddingResponse = rb.send().await?.error_for_status()?.json().await?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("Embedding response contained no data")
    }
}
