//! Content indexing orchestration: chunk → embed → upsert.
//!
//! [`ContentIndexer`] owns the chunk→vector mapping for the duration of a
//! single indexing call; once upserted, the vector store is the sole
//! long-lived owner of the records.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chunk::chunk_content_item;
use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::models::{BatchIndexReport, ContentItem, IndexFailure, IndexReport};
use crate::store::{MetadataFilter, VectorRecord, VectorStore};

/// Orchestrates the ingestion pipeline for content items.
pub struct ContentIndexer {
    embedder: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    namespace: String,
}

impl ContentIndexer {
    pub fn new(
        embedder: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            namespace: namespace.into(),
        }
    }

    /// Index one content item: chunk the body, embed all chunk texts as
    /// one batch, and upsert one record per chunk.
    ///
    /// An empty body produces a `success = false` report with an
    /// explanatory message rather than an error; any step failure is
    /// wrapped as a pipeline error.
    pub async fn index(
        &self,
        item: &ContentItem,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IndexReport> {
        let chunks = chunk_content_item(item, chunk_size, chunk_overlap)
            .map_err(|e| RagError::pipeline("chunking", e))?;

        if chunks.is_empty() {
            return Ok(IndexReport {
                content_id: item.id.clone(),
                chunks_created: 0,
                embeddings_generated: 0,
                success: false,
                message: "No chunks created from content".into(),
                reindexed: false,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| RagError::pipeline("embedding", e))?;

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.id,
                vector,
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        let total = records.len();
        let outcome = self
            .store
            .upsert_many(records, &self.namespace)
            .await
            .map_err(|e| RagError::pipeline("upsert", e))?;

        let success = outcome.failed.is_empty();
        let message = if success {
            format!("Successfully indexed {} chunks", total)
        } else {
            warn!(
                content_id = %item.id,
                failed = outcome.failed.len(),
                "partial upsert failure"
            );
            format!(
                "Indexed {} of {} chunks; {} failed",
                outcome.upserted,
                total,
                outcome.failed.len()
            )
        };

        info!(content_id = %item.id, chunks = total, "indexed content item");
        Ok(IndexReport {
            content_id: item.id.clone(),
            chunks_created: total,
            embeddings_generated: total,
            success,
            message,
            reindexed: false,
        })
    }

    /// Index many items, isolating failures per item.
    ///
    /// One item's failure is recorded and never aborts the remaining
    /// items; totals aggregate across successes only.
    pub async fn index_batch(
        &self,
        items: &[ContentItem],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> BatchIndexReport {
        let mut report = BatchIndexReport {
            total_items: items.len(),
            successful_items: 0,
            failed_items: 0,
            total_chunks: 0,
            total_embeddings: 0,
            failures: Vec::new(),
            success: true,
        };

        for item in items {
            match self.index(item, chunk_size, chunk_overlap).await {
                Ok(item_report) => {
                    report.successful_items += 1;
                    report.total_chunks += item_report.chunks_created;
                    report.total_embeddings += item_report.embeddings_generated;
                }
                Err(e) => {
                    warn!(content_id = %item.id, error = %e, "item failed during batch indexing");
                    report.failed_items += 1;
                    report.failures.push(IndexFailure {
                        content_id: item.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.success = report.failed_items == 0;
        report
    }

    /// Re-index existing content: delete every vector carrying this
    /// `content_id`, then index the updated item. Guarantees no stale
    /// chunks survive a content edit and no duplicate ids accumulate.
    ///
    /// The delete and the insert are not atomic; a query running between
    /// them may transiently see zero or stale results for this content
    /// id. This is an accepted race, not a correctness bug.
    pub async fn reindex(&self, content_id: &str, item: &ContentItem) -> Result<IndexReport> {
        self.reindex_with(content_id, item, crate::config::ChunkingConfig::default()).await
    }

    /// [`reindex`](Self::reindex) with explicit chunking parameters.
    pub async fn reindex_with(
        &self,
        content_id: &str,
        item: &ContentItem,
        chunking: crate::config::ChunkingConfig,
    ) -> Result<IndexReport> {
        let filter: MetadataFilter =
            [("content_id".to_string(), content_id.to_string())].into();
        self.store
            .delete_by_filter(&filter, &self.namespace)
            .await
            .map_err(|e| RagError::pipeline("reindex delete", e))?;

        let mut report = self
            .index(item, chunking.chunk_size, chunking.chunk_overlap)
            .await?;
        report.reindexed = true;
        Ok(report)
    }

    /// Remove every indexed vector for a content id. Idempotent.
    pub async fn delete_index(&self, content_id: &str) -> Result<()> {
        let filter: MetadataFilter =
            [("content_id".to_string(), content_id.to_string())].into();
        self.store
            .delete_by_filter(&filter, &self.namespace)
            .await
            .map_err(|e| RagError::pipeline("delete", e))?;
        info!(content_id, "deleted content index");
        Ok(())
    }
}
