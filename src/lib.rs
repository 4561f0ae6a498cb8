//! # studyrag
//!
//! Retrieval-augmented generation core for educational content: splits
//! heterogeneous material (textbook prose, exam questions, video
//! transcripts) into overlapping chunks, embeds them into a namespaced
//! vector index, and answers natural-language queries with
//! confidence-gated, source-cited generation.
//!
//! The embedding, vector-store, and generation capabilities are opaque
//! collaborators behind traits; services are constructed once with their
//! dependencies injected and passed explicitly to consumers.

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod models;
pub mod rag;
pub mod store;

pub use config::{load_config, Config};
pub use embedding::{cosine_similarity, EmbeddingProvider, EmbeddingService};
pub use error::{RagError, Result};
pub use generation::GenerationProvider;
pub use indexer::ContentIndexer;
pub use models::{
    BatchIndexReport, ContentItem, ContentType, IndexReport, RagQuery, RagResponse,
};
pub use rag::RagService;
pub use store::{MetadataFilter, VectorStore};
