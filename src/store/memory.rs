//! In-memory [`VectorStore`] for tests and single-process deployments.
//!
//! Namespaced `HashMap`s behind `std::sync::RwLock`; queries are
//! brute-force cosine similarity over all vectors in the namespace.
//! Negative cosine values are clamped to `0.0` so similarity scores stay
//! in `[0, 1]` like the managed backends report them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::RetrievalResult;

use super::{IndexStats, MetadataFilter, UpsertOutcome, VectorRecord, VectorStore};

/// In-memory namespaced vector store.
pub struct MemoryVectorStore {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
    dimension: usize,
}

impl MemoryVectorStore {
    /// Create a store accepting vectors of the given fixed dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            dimension,
        }
    }

    fn check_dimension(&self, record: &VectorRecord) -> Result<()> {
        if record.vector.len() != self.dimension {
            return Err(RagError::vector_db(
                format!(
                    "vector {} has dimension {}, index expects {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                ),
                false,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<()> {
        self.check_dimension(&record)?;
        let mut namespaces = self.namespaces.write().unwrap();
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn upsert_many(
        &self,
        records: Vec<VectorRecord>,
        namespace: &str,
    ) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome {
            upserted: 0,
            failed: Vec::new(),
        };
        let mut namespaces = self.namespaces.write().unwrap();
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            match self.check_dimension(&record) {
                Ok(()) => {
                    ns.insert(record.id.clone(), record);
                    outcome.upserted += 1;
                }
                Err(e) => outcome.failed.push(super::UpsertFailure {
                    id: record.id,
                    error: e.to_string(),
                }),
            }
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
        let namespaces = self.namespaces.read().unwrap();
        let ns = match namespaces.get(namespace) {
            Some(ns) => ns,
            None => return Ok(Vec::new()),
        };

        let mut results: Vec<RetrievalResult> = ns
            .values()
            .filter(|r| filter.map_or(true, |f| r.metadata.matches(f)))
            .map(|r| RetrievalResult {
                content_id: r.metadata.content_id.clone(),
                chunk_id: r.id.clone(),
                similarity_score: cosine_similarity(vector, &r.vector).max(0.0),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete_by_ids(&self, ids: &[String], namespace: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        if let Some(ns) = namespaces.get_mut(namespace) {
            for id in ids {
                ns.remove(id);
            }
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter, namespace: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        if let Some(ns) = namespaces.get_mut(namespace) {
            ns.retain(|_, r| !r.metadata.matches(filter));
        }
        Ok(())
    }

    async fn stats(&self, namespace: Option<&str>) -> Result<IndexStats> {
        let namespaces = self.namespaces.read().unwrap();
        let total_vectors = match namespace {
            Some(ns) => namespaces.get(ns).map(|m| m.len()).unwrap_or(0),
            None => namespaces.values().map(|m| m.len()).sum(),
        };
        let mut names: Vec<String> = namespaces.keys().cloned().collect();
        names.sort();
        Ok(IndexStats {
            total_vectors,
            dimension: self.dimension,
            namespaces: names,
        })
    }
}
