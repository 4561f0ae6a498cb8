//! Embedding provider abstraction and batching service.
//!
//! [`EmbeddingProvider`] is the capability contract for turning text into
//! fixed-dimension vectors. [`EmbeddingService`] wraps a provider with
//! batching, a small inter-batch delay to respect upstream rate limits,
//! and once-guarded lazy initialization.
//!
//! Also provides [`cosine_similarity`], the pure scoring function used by
//! the in-memory vector store and by tests.
//!
//! # Retry Strategy (REST client)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately, not retryable
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Delay inserted between consecutive batches submitted upstream.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Capability contract for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Fixed output dimension (e.g. `768`).
    fn dims(&self) -> usize;

    /// One-time setup (model handle acquisition). Must be idempotent;
    /// the default is a no-op for providers without setup.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a group of texts, returning one vector per input in input
    /// order. A failure fails the whole group; no partial results.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Batching front-end over an [`EmbeddingProvider`].
///
/// Partitions input into consecutive groups of at most `batch_size`,
/// submits them sequentially with [`INTER_BATCH_DELAY`] between groups,
/// and concatenates results preserving input order.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    init: OnceCell<()>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            init: OnceCell::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Run the provider's one-time setup exactly once. Safe to call
    /// implicitly before first use; a failed attempt is retried on the
    /// next call.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| self.provider.initialize())
            .await?;
        Ok(())
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::embedding("provider returned no vector", false))
    }

    /// Embed many texts, batched. Output order strictly matches input
    /// order; a failing batch fails the whole call.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.ensure_initialized().await?;

        let mut all = Vec::with_capacity(texts.len());
        for (group_idx, group) in texts.chunks(self.batch_size).enumerate() {
            if group_idx > 0 {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }
            let vectors = self.provider.embed(group).await?;
            if vectors.len() != group.len() {
                return Err(RagError::embedding(
                    format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        group.len()
                    ),
                    false,
                ));
            }
            all.extend(vectors);
        }
        debug!(texts = texts.len(), batches = texts.len().div_ceil(self.batch_size), "embedded batch");
        Ok(all)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `dot(a,b) / (‖a‖·‖b‖)`, or `0.0` for zero vectors, empty
/// vectors, or vectors of different lengths. Never fails.
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

/// Embedding provider backed by an OpenAI-compatible REST endpoint.
///
/// Posts `{"model", "input"}` to the configured endpoint and reads
/// `data[].embedding`. Transient failures (429, 5xx, network) are retried
/// with exponential backoff; other client errors fail immediately.
pub struct RestEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl RestEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::embedding(format!("failed to build HTTP client: {}", e), false))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RestEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::embedding(format!("invalid embedding response: {}", e), false)
                        })?;
                        return parse_embedding_response(&json);
                    }

                    // Rate limited or server error, worth retrying.
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(RagError::embedding(
                            format!("embedding API error {}: {}", status, body_text),
                            true,
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RagError::embedding(
                        format!("embedding API error {}: {}", status, body_text),
                        false,
                    ));
                }
                Err(e) => {
                    last_err = Some(RagError::embedding(
                        format!("embedding request failed: {}", e),
                        true,
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::embedding("embedding failed after retries", true)))
    }
}

/// Extract `data[].embedding` arrays from the response, in order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::embedding("invalid response: missing data array", false))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for entry in data {
        let values = entry
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::embedding("invalid response: missing embedding", false))?;
        embeddings.push(
            values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}
