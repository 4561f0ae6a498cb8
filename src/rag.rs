//! Retrieval-augmented query orchestration.
//!
//! [`RagService`] embeds a query, retrieves the most similar chunks,
//! computes an aggregate confidence, and either short-circuits (no
//! results, low confidence) or grounds a generated answer in the
//! retrieved context.
//!
//! Each query moves through `EMBEDDING → RETRIEVING → {NO_RESULTS |
//! LOW_CONFIDENCE | GENERATING} → DONE` independently; the service holds
//! no call-spanning state and never writes to the vector store.
//!
//! "No results" and "low confidence" are ordinary, structured responses,
//! not errors; only infrastructure failures (embedding, retrieval,
//! generation) raise.

use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::generation::{build_prompt, GenerationProvider};
use crate::models::{
    RagContext, RagQuery, RagResponse, ResponseMetadata, RetrievalResult, SourceRef,
};
use crate::store::{MetadataFilter, VectorStore};

const NO_RESULTS_TEXT: &str = "I couldn't find relevant information in the available \
content. Please try rephrasing your question or ask about a different topic.";

/// Answers natural-language queries over the indexed content.
pub struct RagService {
    embedder: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationProvider>,
    namespace: String,
}

impl RagService {
    pub fn new(
        embedder: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationProvider>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            namespace: namespace.into(),
        }
    }

    /// Process one RAG query.
    pub async fn query(&self, request: &RagQuery) -> Result<RagResponse> {
        let query_vector = self
            .embedder
            .embed_one(&request.query)
            .await
            .map_err(|e| RagError::pipeline("query embedding", e))?;

        // Merge the subject constraint into the caller's filters.
        let mut filters: MetadataFilter = request.filters.clone();
        if let Some(subject) = &request.subject {
            filters.insert("subject".to_string(), subject.clone());
        }
        let filter = (!filters.is_empty()).then_some(&filters);

        let results = self
            .store
            .query(&query_vector, request.top_k, filter, &self.namespace)
            .await
            .map_err(|e| RagError::pipeline("retrieval", e))?;

        if results.is_empty() {
            debug!(query = %request.query, "no retrieval results");
            return Ok(RagResponse {
                query: request.query.clone(),
                generated_text: NO_RESULTS_TEXT.to_string(),
                contexts: Vec::new(),
                confidence: 0.0,
                sources: Vec::new(),
                metadata: ResponseMetadata {
                    reason: Some("no_results".to_string()),
                    ..Default::default()
                },
            });
        }

        let confidence =
            results.iter().map(|r| r.similarity_score).sum::<f32>() / results.len() as f32;

        if confidence < request.confidence_threshold {
            debug!(
                confidence,
                threshold = request.confidence_threshold,
                "confidence below threshold, skipping generation"
            );
            return Ok(RagResponse {
                query: request.query.clone(),
                generated_text: format!(
                    "I found some related content, but I'm not confident enough \
                     (confidence: {:.0}%) to provide an accurate answer. Could you \
                     please rephrase your question or provide more context?",
                    confidence * 100.0
                ),
                contexts: Vec::new(),
                confidence,
                sources: Vec::new(),
                metadata: ResponseMetadata {
                    reason: Some("low_confidence".to_string()),
                    threshold: Some(request.confidence_threshold),
                    ..Default::default()
                },
            });
        }

        let (contexts, sources, context_block) = assemble_context(&results, request);

        let prompt = build_prompt(&context_block, &request.query);
        let generated_text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| RagError::pipeline("generation", e))?;

        info!(
            query = %request.query,
            chunks = results.len(),
            confidence,
            "answered query"
        );
        Ok(RagResponse {
            query: request.query.clone(),
            generated_text,
            contexts,
            confidence,
            sources,
            metadata: ResponseMetadata {
                model: Some(self.generator.model_name().to_string()),
                chunks_retrieved: Some(results.len()),
                ..Default::default()
            },
        })
    }

    /// Find content similar to a free text, without generation.
    pub async fn find_similar(
        &self,
        text: &str,
        top_k: usize,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let vector = self
            .embedder
            .embed_one(text)
            .await
            .map_err(|e| RagError::pipeline("query embedding", e))?;
        self.store
            .query(&vector, top_k, filters, &self.namespace)
            .await
            .map_err(|e| RagError::pipeline("retrieval", e))
    }
}

/// Build the response contexts, source citations, and the tagged context
/// block handed to the generation provider.
fn assemble_context(
    results: &[RetrievalResult],
    request: &RagQuery,
) -> (Vec<RagContext>, Vec<SourceRef>, String) {
    let mut contexts = Vec::with_capacity(results.len());
    let mut sources = Vec::with_capacity(results.len());
    let mut block_parts = Vec::with_capacity(results.len());

    for (idx, result) in results.iter().enumerate() {
        let source_type = result.metadata.source_type.as_str().to_string();
        let chapter = if result.metadata.chapter.is_empty() {
            "N/A"
        } else {
            &result.metadata.chapter
        };

        block_parts.push(format!(
            "[Source {}] ({} - {})\n{}",
            idx + 1,
            source_type,
            chapter,
            result.text
        ));

        contexts.push(RagContext {
            chunk_id: result.chunk_id.clone(),
            content_id: result.content_id.clone(),
            text: result.text.clone(),
            similarity_score: result.similarity_score,
            source_type: source_type.clone(),
            subject: request
                .subject
                .clone()
                .unwrap_or_else(|| result.metadata.subject.clone()),
            metadata: result.metadata.clone(),
        });

        sources.push(SourceRef {
            id: result.content_id.clone(),
            source_type,
            subject: result.metadata.subject.clone(),
            chapter: result.metadata.chapter.clone(),
            similarity: result.similarity_score,
        });
    }

    (contexts, sources, block_parts.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, ContentType};
    use std::collections::BTreeMap;

    fn result(idx: usize, chapter: &str) -> RetrievalResult {
        RetrievalResult {
            content_id: format!("doc{}", idx),
            chunk_id: format!("doc{}_chunk_0", idx),
            similarity_score: 0.9,
            text: format!("passage {}", idx),
            metadata: ChunkMetadata {
                content_id: format!("doc{}", idx),
                chunk_index: 0,
                total_chunks: 1,
                subject: "physics".into(),
                source_type: ContentType::Textbook,
                chapter: chapter.into(),
                topic_id: String::new(),
                difficulty: String::new(),
                extra: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_context_block_tags_sources_in_order() {
        let results = vec![result(1, "Optics"), result(2, "")];
        let request = RagQuery::new("how do lenses work?");
        let (contexts, sources, block) = assemble_context(&results, &request);

        assert_eq!(contexts.len(), 2);
        assert_eq!(sources.len(), 2);
        assert!(block.starts_with("[Source 1] (textbook - Optics)\npassage 1"));
        assert!(block.contains("[Source 2] (textbook - N/A)\npassage 2"));
    }

    #[test]
    fn test_contexts_carry_scores_and_subject() {
        let results = vec![result(1, "Optics")];
        let mut request = RagQuery::new("query");
        request.subject = Some("physics".into());
        let (contexts, _, _) = assemble_context(&results, &request);
        assert!((contexts[0].similarity_score - 0.9).abs() < 1e-6);
        assert_eq!(contexts[0].subject, "physics");
    }
}
