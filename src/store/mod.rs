//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait defines the namespaced (id, vector, metadata)
//! store the indexing and query pipelines operate on, enabling pluggable
//! backends (in-memory for tests and single-process use, REST for a
//! managed vector database).
//!
//! Implementations must be `Send + Sync` and tolerate concurrent upserts
//! and queries without external locking; consistency is delegated to the
//! backend's per-call atomicity. The store never holds two entries with
//! the same id in one namespace; upsert strictly replaces.

pub mod memory;
pub mod rest;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ChunkMetadata, RetrievalResult};

/// Exact-match key/value conjunction over [`ChunkMetadata`] fields.
pub type MetadataFilter = BTreeMap<String, String>;

/// The persisted unit inside a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique within a namespace: `{content_id}_chunk_{index}`.
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One failed record from a bulk upsert.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of a bulk upsert. Partial success is acceptable but reported.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub upserted: usize,
    pub failed: Vec<UpsertFailure>,
}

/// Index statistics, optionally scoped to one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub namespaces: Vec<String>,
}

/// Abstract namespaced vector store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite one record by id |
/// | [`upsert_many`](VectorStore::upsert_many) | Bulk upsert, partial success reported |
/// | [`query`](VectorStore::query) | Top-k similarity search with metadata filter |
/// | [`delete_by_ids`](VectorStore::delete_by_ids) | Idempotent delete by id |
/// | [`delete_by_filter`](VectorStore::delete_by_filter) | Idempotent delete by metadata filter |
/// | [`stats`](VectorStore::stats) | Vector counts, dimension, namespaces |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite by id. Idempotent.
    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<()>;

    /// Bulk upsert. All-or-nothing is not required; failures are reported
    /// per record.
    async fn upsert_many(&self, records: Vec<VectorRecord>, namespace: &str)
        -> Result<UpsertOutcome>;

    /// Top-k similarity query, descending score, ties stable within one
    /// call. A query against an empty or unknown namespace returns an
    /// empty sequence, never an error.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        namespace: &str,
    ) -> Result<Vec<RetrievalResult>>;

    /// Delete by ids. Deleting nonexistent ids is not an error.
    async fn delete_by_ids(&self, ids: &[String], namespace: &str) -> Result<()>;

    /// Delete every record whose metadata matches the filter. Idempotent.
    async fn delete_by_filter(&self, filter: &MetadataFilter, namespace: &str) -> Result<()>;

    /// Current statistics, optionally scoped to one namespace.
    async fn stats(&self, namespace: Option<&str>) -> Result<IndexStats>;
}
