//! Embedding collaborator client and order-preserving batch gateway.
//!
//! The backend is an OpenAI-compatible `POST /embeddings` endpoint that may
//! return vectors tagged with an index that does not match submission order.
//! [`EmbeddingGateway`] partitions input into fixed-size groups, issues one
//! request per group sequentially, re-sorts each response by its index tag,
//! and concatenates the groups, so output order always equals input order.
//!
//! A failed group aborts the whole call; there is no internal retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{RaglineError, Result};

/// One vector from a backend response, tagged with its submission index
/// within the group.
#[derive(Debug, Clone)]
pub struct TaggedEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Seam for the embedding collaborator: one request per group of texts.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_group(&self, texts: &[String]) -> Result<Vec<TaggedEmbedding>>;
}

/// HTTP client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl HttpEmbeddingBackend {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(env = %config.api_key_env, "embedding API key not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed_group(&self, texts: &[String]) -> Result<Vec<TaggedEmbedding>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RaglineError::from_reqwest("embedding", self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RaglineError::collaborator("embedding", status.as_u16(), &text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RaglineError::from_reqwest("embedding", self.timeout_secs, e))?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                RaglineError::collaborator("embedding", status.as_u16(), "missing data array")
            })?;

        let mut tagged = Vec::with_capacity(data.len());
        for (i, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(i);
            let embedding: Vec<f32> = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .map(|arr| {
                    arr.iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
                .ok_or_else(|| {
                    RaglineError::collaborator("embedding", status.as_u16(), "missing embedding")
                })?;
            tagged.push(TaggedEmbedding { index, embedding });
        }
        Ok(tagged)
    }
}

/// Batched, order-preserving wrapper over an [`EmbeddingBackend`].
pub struct EmbeddingGateway {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl EmbeddingGateway {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RaglineError::collaborator("embedding", 200, "empty embedding response")
        })
    }

    /// Embed a batch of texts; output order equals input order regardless of
    /// how the backend orders vectors within each group response.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(texts.len());
        for group in texts.chunks(self.batch_size) {
            let mut tagged = self.backend.embed_group(group).await?;
            if tagged.len() != group.len() {
                return Err(RaglineError::collaborator(
                    "embedding",
                    200,
                    &format!(
                        "response carried {} vectors for {} inputs",
                        tagged.len(),
                        group.len()
                    ),
                ));
            }
            tagged.sort_by_key(|t| t.index);
            out.extend(tagged.into_iter().map(|t| t.embedding));
        }
        Ok(out)
    }
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty vectors, mismatched
/// lengths, or a zero norm.
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
