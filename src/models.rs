//! Data models for the RAG pipeline.
//!
//! [`ContentItem`] is the immutable unit of source material handed in by
//! ingestion collaborators. [`Chunk`]s are derived from it during a single
//! indexing operation and are not persisted themselves; only their vector
//! and [`ChunkMetadata`] survive inside the vector store.
//!
//! Metadata is a typed struct with the known fields explicit plus an
//! `extra` map for pass-through fields, so consumers get compile-time
//! safety for the common path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Source category of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Textbook prose.
    Textbook,
    /// Previous exam questions.
    Exam,
    /// Higher-order thinking questions.
    Hots,
    /// Video transcript.
    Transcript,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Textbook => "textbook",
            Self::Exam => "exam",
            Self::Hots => "hots",
            Self::Transcript => "transcript",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// An immutable unit of source material. Read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub subject: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    /// Arbitrary extension metadata, carried through to every chunk.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Metadata attached to every indexed vector.
///
/// Known fields are explicit; `extra` holds pass-through fields from the
/// source content item (prefixed `content_` at chunking time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub content_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub subject: String,
    #[serde(rename = "type")]
    pub source_type: ContentType,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub topic_id: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// Look up a metadata field by name, covering both the typed fields
    /// and the extension map. Numeric fields are not addressable here;
    /// filters are string exact-match only.
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "content_id" => Some(&self.content_id),
            "subject" => Some(&self.subject),
            "type" => Some(self.source_type.as_str()),
            "chapter" => Some(&self.chapter),
            "topic_id" => Some(&self.topic_id),
            "difficulty" => Some(&self.difficulty),
            _ => self.extra.get(key).map(String::as_str),
        }
    }

    /// Exact-match conjunction: every filter key must be present and equal.
    pub fn matches(&self, filter: &BTreeMap<String, String>) -> bool {
        filter.iter().all(|(k, v)| self.field(k) == Some(v.as_str()))
    }
}

/// A contiguous segment of a content item's body, alive only within one
/// indexing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived identifier: `{content_id}_chunk_{index}`.
    pub id: String,
    /// 0-based position within the content item.
    pub index: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A single similarity match from the vector store. Ephemeral, per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content_id: String,
    pub chunk_id: String,
    /// Similarity in `[0.0, 1.0]`.
    pub similarity_score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A retrieved passage included in a [`RagResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagContext {
    pub chunk_id: String,
    pub content_id: String,
    pub text: String,
    pub similarity_score: f32,
    pub source_type: String,
    pub subject: String,
    pub metadata: ChunkMetadata,
}

/// A cited source in a [`RagResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub subject: String,
    pub chapter: String,
    pub similarity: f32,
}

/// Diagnostic metadata on a [`RagResponse`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// `"no_results"` or `"low_confidence"` on short-circuited responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Echoed confidence threshold on the low-confidence path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    /// Generation model used, when a generation call was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_retrieved: Option<usize>,
}

/// A grounded answer to a natural-language query. Ephemeral, one per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub query: String,
    pub generated_text: String,
    pub contexts: Vec<RagContext>,
    /// Mean similarity of the retrieved result set, `[0.0, 1.0]`.
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    pub metadata: ResponseMetadata,
}

/// Parameters for one RAG query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQuery {
    pub query: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

fn default_top_k() -> usize {
    5
}
fn default_confidence_threshold() -> f32 {
    0.7
}

impl RagQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            subject: None,
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
            filters: BTreeMap::new(),
        }
    }
}

/// Outcome of indexing one content item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub content_id: String,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub reindexed: bool,
}

/// A single failed item inside a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFailure {
    pub content_id: String,
    pub error: String,
}

/// Aggregate outcome of a batch indexing run.
///
/// Totals are accumulated across successful items only; failed items are
/// listed individually and never abort the remaining items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIndexReport {
    pub total_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub total_chunks: usize,
    pub total_embeddings: usize,
    pub failures: Vec<IndexFailure>,
    pub success: bool,
}
