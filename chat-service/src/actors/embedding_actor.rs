use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use lru::LruCache;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use crate::actors::model_gateway::resolve_provider_endpoint;
use crate::protocol::{EmbeddingMsg, ModelProvider};
use crate::settings::{EmbeddingProviderKind, EmbeddingSettings, ProviderSettings};

const REMOTE_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Where embeddings are computed.
pub enum EmbeddingBackend {
    /// In-process fastembed model
    Local(Arc<TextEmbedding>),
    /// OpenAI-compatible `/embeddings` endpoint
    Remote {
        client: reqwest::Client,
        url: String,
        api_key: Option<String>,
        model: String,
    },
}

impl EmbeddingBackend {
    pub async fn from_settings(
        embedding: &EmbeddingSettings,
        providers: &ProviderSettings,
    ) -> Result<Self, String> {
        let provider = match embedding.provider {
            EmbeddingProviderKind::Local => {
                let model_name = local_model_for(&embedding.model)?;
                tracing::info!(model = %embedding.model, "loading local embedding model");
                let model = tokio::task::spawn_blocking(move || {
                    let mut options = InitOptions::default();
                    options.model_name = model_name;
                    options.show_download_progress = true;
                    TextEmbedding::try_new(options)
                })
                .await
                .map_err(|e| format!("Embedding model initialization task panicked: {}", e))?
                .map_err(|e| format!("Failed to load embedding model: {}", e))?;
                return Ok(EmbeddingBackend::Local(Arc::new(model)));
            }
            EmbeddingProviderKind::OpenAi => ModelProvider::OpenAi,
            EmbeddingProviderKind::Mistral => ModelProvider::Mistral,
        };

        let endpoint = resolve_provider_endpoint(providers, provider)?;
        Ok(EmbeddingBackend::Remote {
            client: reqwest::Client::new(),
            url: endpoint.embeddings_url(),
            api_key: endpoint.api_key,
            model: embedding.model.clone(),
        })
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>, String> {
        match self {
            EmbeddingBackend::Local(model) => {
                let model = Arc::clone(model);
                let embeddings = tokio::task::spawn_blocking(move || model.embed(vec![text], None))
                    .await
                    .map_err(|e| format!("Embedding task panicked: {}", e))?
                    .map_err(|e| format!("Embedding generation failed: {}", e))?;
                embeddings
                    .into_iter()
                    .next()
                    .ok_or_else(|| "Embedding model returned no vector".to_string())
            }
            EmbeddingBackend::Remote {
                client,
                url,
                api_key,
                model,
            } => {
                let mut request = client.post(url).timeout(REMOTE_EMBED_TIMEOUT).json(&json!({
                    "model": model,
                    "input": text,
                }));
                if let Some(key) = api_key {
                    request = request.bearer_auth(key);
                }

                let resp = request
                    .send()
                    .await
                    .map_err(|e| format!("Embedding request failed: {}", e))?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(format!("Embedding HTTP {}: {}", status, body));
                }

                let json: Value = resp
                    .json()
                    .await
                    .map_err(|e| format!("Invalid embedding response: {}", e))?;
                parse_embedding_response(&json)
            }
        }
    }
}

fn local_model_for(name: &str) -> Result<EmbeddingModel, String> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        other => Err(format!("Unsupported local embedding model `{}`", other)),
    }
}

fn parse_embedding_response(json: &Value) -> Result<Vec<f32>, String> {
    let values = json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| "Embedding response has no data[0].embedding".to_string())?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| "Embedding contains a non-numeric value".to_string())
        })
        .collect()
}

/// Turns text into vectors, remembering recent inputs.
///
/// Cache lookups happen on the actor loop; misses are computed on their own
/// task so one slow request never holds up the others.
pub struct EmbeddingActor {
    rx: mpsc::Receiver<EmbeddingMsg>,
    backend: Arc<Result<EmbeddingBackend, String>>,
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl EmbeddingActor {
    /// `backend` may be an error; requests then fail with that message
    /// instead of the service refusing to start.
    pub fn new(
        rx: mpsc::Receiver<EmbeddingMsg>,
        backend: Result<EmbeddingBackend, String>,
        cache_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            rx,
            backend: Arc::new(backend),
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub async fn run(mut self) {
        if let Err(reason) = self.backend.as_ref() {
            tracing::warn!(%reason, "embedding backend unavailable");
        }

        while let Some(msg) = self.rx.recv().await {
            match msg {
                EmbeddingMsg::Embed { text, respond_to } => {
                    if let Some(vector) = self.cache.lock().await.get(&text) {
                        tracing::debug!(chars = text.len(), "embedding cache hit");
                        let _ = respond_to.send(Ok(vector.clone()));
                        continue;
                    }

                    let backend = Arc::clone(&self.backend);
                    let cache = Arc::clone(&self.cache);
                    tokio::spawn(async move {
                        let result = embed_uncached(&backend, &cache, text).await;
                        let _ = respond_to.send(result);
                    });
                }
            }
        }
    }
}

async fn embed_uncached(
    backend: &Result<EmbeddingBackend, String>,
    cache: &Mutex<LruCache<String, Vec<f32>>>,
    text: String,
) -> Result<Vec<f32>, String> {
    let backend = backend.as_ref().map_err(Clone::clone)?;
    let vector = backend.embed(text.clone()).await?;
    cache.lock().await.put(text, vector.clone());
    Ok(vector)
}
