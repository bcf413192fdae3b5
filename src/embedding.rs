//! Embedding provider abstraction and implementations.
//!
//! Two interchangeable strategies, selected at construction time:
//! - **[`RemoteProvider`]** — one HTTP request per text against a configured
//!   embedding endpoint. A failed request degrades to a zero vector of the
//!   provider's dimensionality instead of aborting the batch; ingestion must
//!   not halt on isolated embedding failures.
//! - **`LocalProvider`** — a multilingual sentence-embedding model loaded
//!   once via fastembed (behind the `local-embeddings` feature), encoding
//!   the whole batch in one call.
//!
//! Also provides vector utilities for BLOB storage:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::models::truncate_chars;

/// Remote requests carry at most this many characters of text.
const REMOTE_TEXT_CAP: usize = 2000;

const DEFAULT_REMOTE_MODEL: &str = "nomic-embed-text";
const DEFAULT_REMOTE_DIMS: usize = 768;
const DEFAULT_REMOTE_URL: &str = "http://localhost:11434";

/// Trait for embedding providers.
///
/// The actual embedding computation is performed by [`embed_texts`]
/// (kept as a free function due to async trait limitations).
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
}

/// Embed a batch of texts using the configured provider.
///
/// Returns one vector per input text, in the same order. The remote path
/// never fails for an individual text: provider errors are substituted with
/// zero vectors, which lowers that item's future similarity scores rather
/// than blocking the pipeline.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "remote" => embed_remote(config, texts).await,
        #[cfg(feature = "local-embeddings")]
        "local" => embed_local(config, texts).await,
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query text (single-item batch).
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Remote Provider ============

/// Embedding provider backed by an HTTP embedding endpoint.
///
/// Calls `POST /api/embeddings` on the configured URL with `{model, text}`,
/// one request per text, sequentially — a deliberate trade-off favoring
/// provider rate-limit safety over latency.
pub struct RemoteProvider {
    model: String,
    dims: usize,
}

impl RemoteProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_REMOTE_MODEL.to_string()),
            dims: config.dims.unwrap_or(DEFAULT_REMOTE_DIMS),
        }
    }
}

impl EmbeddingProvider for RemoteProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// One request per text; no retries. A non-success response or transport
/// failure yields a zero vector for that text only.
async fn embed_remote(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_REMOTE_MODEL);
    let dims = config.dims.unwrap_or(DEFAULT_REMOTE_DIMS);
    let url = config.url.as_deref().unwrap_or(DEFAULT_REMOTE_URL);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let mut embeddings = Vec::with_capacity(texts.len());

    for text in texts {
        let body = serde_json::json!({
            "model": model,
            "text": truncate_chars(text, REMOTE_TEXT_CAP),
        });

        let resp = client
            .post(format!("{}/api/embeddings", url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        let vector = match resp {
            Ok(response) if response.status().is_success() => {
                match response.json::<serde_json::Value>().await {
                    Ok(json) => parse_embedding(&json).unwrap_or_else(|e| {
                        warn!(error = %e, "embedding response unparseable, substituting zero vector");
                        vec![0.0; dims]
                    }),
                    Err(e) => {
                        warn!(error = %e, "embedding response body unreadable, substituting zero vector");
                        vec![0.0; dims]
                    }
                }
            }
            Ok(response) => {
                warn!(
                    status = %response.status(),
                    text = %truncate_chars(text, 50),
                    "embedding endpoint returned non-success, substituting zero vector"
                );
                vec![0.0; dims]
            }
            Err(e) => {
                warn!(error = %e, "embedding request failed, substituting zero vector");
                vec![0.0; dims]
            }
        };

        embeddings.push(vector);
    }

    Ok(embeddings)
}

fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid response: missing embedding array"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference. The model is downloaded on first
/// use and cached; after that, embeddings run entirely offline.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config)?;
        Ok(Self { model_name, dims })
    }
}

#[cfg(feature = "local-embeddings")]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

#[cfg(feature = "local-embeddings")]
fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "multilingual-e5-small".to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        "all-minilm-l6-v2" => 384,
        _ => 384,
    });

    Ok((model_name, dims))
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, all-minilm-l6-v2",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
async fn embed_local(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "multilingual-e5-small".to_string());

    let fastembed_model = config_to_fastembed_model(&model_name)?;
    let texts = texts.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        let embeddings = model
            .embed(texts, None)
            .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?;

        Ok(embeddings)
    })
    .await?
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "remote" => Ok(Box::new(RemoteProvider::new(config))),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
