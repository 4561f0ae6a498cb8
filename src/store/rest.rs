//! REST-backed [`VectorStore`] for a managed vector database.
//!
//! Speaks the common serverless vector-DB wire protocol:
//! `POST /vectors/upsert`, `POST /query`, `POST /vectors/delete`, and
//! `POST /describe_index_stats`. Chunk text travels inside the record
//! metadata, the way managed backends persist it.
//!
//! Connectivity is verified lazily on first use (one `describe_index_stats`
//! round-trip, once-guarded); transient failures (429, 5xx, network) are
//! retried with the same capped exponential backoff as the embedding
//! client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::VectorConfig;
use crate::error::{RagError, Result};
use crate::models::{ChunkMetadata, RetrievalResult};

use super::{IndexStats, MetadataFilter, UpsertFailure, UpsertOutcome, VectorRecord, VectorStore};

/// Metadata as stored by the backend: chunk text plus the typed fields.
#[derive(Debug, Serialize, Deserialize)]
struct WireMetadata {
    text: String,
    #[serde(flatten)]
    meta: ChunkMetadata,
}

/// Vector store client for a remote HTTP backend.
pub struct RestVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    dimension: usize,
    max_retries: u32,
    connected: OnceCell<()>,
}

impl RestVectorStore {
    pub fn new(config: &VectorConfig, dimension: usize) -> Result<Self> {
        let base_url = config.url.clone().ok_or_else(|| {
            RagError::Configuration("vector.url is required for the rest backend".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::vector_db(format!("failed to build HTTP client: {}", e), false))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            dimension,
            max_retries: config.max_retries,
            connected: OnceCell::new(),
        })
    }

    /// Verify connectivity and dimension once; queries arriving before an
    /// explicit connect trigger this implicitly.
    async fn ensure_connected(&self) -> Result<()> {
        self.connected
            .get_or_try_init(|| async {
                let stats = self.fetch_stats().await?;
                if stats.dimension != 0 && stats.dimension != self.dimension {
                    return Err(RagError::vector_db(
                        format!(
                            "index dimension {} does not match configured dimension {}",
                            stats.dimension, self.dimension
                        ),
                        false,
                    ));
                }
                debug!(dimension = self.dimension, "connected to vector backend");
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// POST a JSON body with retry on 429/5xx/network errors.
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, path, delay_secs = delay.as_secs(), "retrying vector backend request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &self.api_key {
                request = request.header("Api-Key", key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            RagError::vector_db(format!("invalid backend response: {}", e), false)
                        });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(RagError::vector_db(
                            format!("vector backend error {}: {}", status, body_text),
                            true,
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RagError::vector_db(
                        format!("vector backend error {}: {}", status, body_text),
                        false,
                    ));
                }
                Err(e) => {
                    last_err = Some(RagError::vector_db(
                        format!("vector backend request failed: {}", e),
                        true,
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::vector_db("vector backend failed after retries", true)))
    }

    async fn fetch_stats(&self) -> Result<IndexStats> {
        let json = self
            .post_json("/describe_index_stats", &serde_json::json!({}))
            .await?;
        Ok(Self::parse_stats(&json, None))
    }

    fn parse_stats(json: &serde_json::Value, namespace: Option<&str>) -> IndexStats {
        let dimension = json
            .get("dimension")
            .and_then(|d| d.as_u64())
            .unwrap_or(0) as usize;
        // Per-namespace counts are reported under "namespaces"; the
        // unscoped total under "totalVectorCount".
        let total_vectors = match namespace {
            Some(ns) => json
                .get("namespaces")
                .and_then(|n| n.get(ns))
                .and_then(|n| n.get("vectorCount"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0) as usize,
            None => json
                .get("totalVectorCount")
                .and_then(|c| c.as_u64())
                .unwrap_or(0) as usize,
        };
        let mut namespaces: Vec<String> = json
            .get("namespaces")
            .and_then(|n| n.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        if let Some(ns) = namespace {
            namespaces.retain(|n| n == ns);
        }
        namespaces.sort();

        IndexStats {
            total_vectors,
            dimension,
            namespaces,
        }
    }

    fn wire_record(record: &VectorRecord) -> Result<serde_json::Value> {
        if record.vector.is_empty() {
            return Err(RagError::vector_db(
                format!("vector {} is empty", record.id),
                false,
            ));
        }
        let metadata = serde_json::to_value(WireMetadata {
            text: record.text.clone(),
            meta: record.metadata.clone(),
        })
        .map_err(|e| RagError::vector_db(format!("metadata serialization failed: {}", e), false))?;

        Ok(serde_json::json!({
            "id": record.id,
            "values": record.vector,
            "metadata": metadata,
        }))
    }

    /// Encode records for the wire, reporting bad ones individually so a
    /// single rejected record never aborts the rest of the batch.
    fn prepare_upsert(
        &self,
        records: &[VectorRecord],
    ) -> (Vec<serde_json::Value>, Vec<UpsertFailure>) {
        let mut wire = Vec::with_capacity(records.len());
        let mut failed = Vec::new();

        for record in records {
            if record.vector.len() != self.dimension {
                failed.push(UpsertFailure {
                    id: record.id.clone(),
                    error: format!(
                        "dimension {} does not match index dimension {}",
                        record.vector.len(),
                        self.dimension
                    ),
                });
                continue;
            }
            match Self::wire_record(record) {
                Ok(value) => wire.push(value),
                Err(e) => failed.push(UpsertFailure {
                    id: record.id.clone(),
                    error: e.to_string(),
                }),
            }
        }

        (wire, failed)
    }
}

#[async_trait]
impl VectorStore for RestVectorStore {
    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<()> {
        let outcome = self.upsert_many(vec![record], namespace).await?;
        if let Some(failure) = outcome.failed.into_iter().next() {
            return Err(RagError::vector_db(
                format!("upsert of {} failed: {}", failure.id, failure.error),
                false,
            ));
        }
        Ok(())
    }

    async fn upsert_many(
        &self,
        records: Vec<VectorRecord>,
        namespace: &str,
    ) -> Result<UpsertOutcome> {
        self.ensure_connected().await?;

        let (wire, failed) = self.prepare_upsert(&records);
        let mut outcome = UpsertOutcome {
            upserted: 0,
            failed,
        };

        if !wire.is_empty() {
            let count = wire.len();
            self.post_json(
                "/vectors/upsert",
                &serde_json::json!({
                    "vectors": wire,
                    "namespace": namespace,
                }),
            )
            .await?;
            outcome.upserted = count;
        }

        Ok(outcome)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        namespace: &str,
    ) -> Result<Vec<RetrievalResult>> {
        self.ensure_connected().await?;

        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "namespace": namespace,
        });
        if let Some(f) = filter {
            if !f.is_empty() {
                body["filter"] = serde_json::to_value(f).unwrap_or_default();
            }
        }

        let json = self.post_json("/query", &body).await?;

        let matches = json
            .get("matches")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            let chunk_id = m
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or_default()
                .to_string();
            let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            let wire: WireMetadata = match m.get("metadata") {
                Some(meta) => serde_json::from_value(meta.clone()).map_err(|e| {
                    RagError::vector_db(format!("malformed match metadata: {}", e), false)
                })?,
                None => continue,
            };
            results.push(RetrievalResult {
                content_id: wire.meta.content_id.clone(),
                chunk_id,
                similarity_score: score.clamp(0.0, 1.0),
                text: wire.text,
                metadata: wire.meta,
            });
        }
        Ok(results)
    }

    async fn delete_by_ids(&self, ids: &[String], namespace: &str) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ensure_connected().await?;
        self.post_json(
            "/vectors/delete",
            &serde_json::json!({
                "ids": ids,
                "namespace": namespace,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter, namespace: &str) -> Result<()> {
        self.ensure_connected().await?;
        self.post_json(
            "/vectors/delete",
            &serde_json::json!({
                "filter": filter,
                "namespace": namespace,
            }),
        )
        .await?;
        Ok(())
    }

    async fn stats(&self, namespace: Option<&str>) -> Result<IndexStats> {
        self.ensure_connected().await?;
        let json = self
            .post_json("/describe_index_stats", &serde_json::json!({}))
            .await?;
        Ok(Self::parse_stats(&json, namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use std::collections::BTreeMap;

    fn store(dimension: usize) -> RestVectorStore {
        let config = VectorConfig {
            backend: "rest".to_string(),
            url: Some("http://localhost:9/".to_string()),
            ..VectorConfig::default()
        };
        RestVectorStore::new(&config, dimension).unwrap()
    }

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("text for {}", id),
            metadata: ChunkMetadata {
                content_id: "doc1".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                subject: "physics".into(),
                source_type: ContentType::Textbook,
                chapter: String::new(),
                topic_id: String::new(),
                difficulty: String::new(),
                extra: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_prepare_upsert_reports_dimension_failures_per_record() {
        let store = store(2);
        let records = vec![
            record("ok", vec![1.0, 0.0]),
            record("bad", vec![1.0]),
            record("ok2", vec![0.0, 1.0]),
        ];
        let (wire, failed) = store.prepare_upsert(&records);
        assert_eq!(wire.len(), 2);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "bad");
        assert!(failed[0].error.contains("dimension"));
    }

    #[test]
    fn test_prepare_upsert_rejects_empty_vector_per_record() {
        // Only reachable with a zero-dimension index; the record must be
        // reported individually, not abort the batch.
        let store = store(0);
        let records = vec![record("e1", Vec::new())];
        let (wire, failed) = store.prepare_upsert(&records);
        assert!(wire.is_empty());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "e1");
        assert!(failed[0].error.contains("empty"));
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base_url() {
        let store = store(2);
        assert_eq!(store.base_url, "http://localhost:9");
    }
}
