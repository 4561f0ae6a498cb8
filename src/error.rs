//! Error types for the RAG pipeline.
//!
//! The taxonomy separates caller-fixable configuration problems from
//! transient provider/backend failures. Transient variants carry a
//! `retryable` flag so the surrounding API layer can map them to
//! retriable semantics; the core itself never retries beyond the
//! transport-level backoff inside the REST clients.

use thiserror::Error;

/// Result type alias for RAG pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur anywhere in the indexing or query pipeline.
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid parameters or configuration. The caller must fix the input.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected failure during text segmentation. Treated as a bug signal.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// The embedding provider failed (timeout, quota, malformed input).
    #[error("embedding generation error: {message}")]
    Embedding { message: String, retryable: bool },

    /// The vector backend failed (connectivity, backend error, dimension mismatch).
    #[error("vector store error: {message}")]
    VectorDb { message: String, retryable: bool },

    /// The generation provider failed.
    #[error("generation error: {message}")]
    Generation { message: String, retryable: bool },

    /// A failure that occurred while orchestrating a pipeline stage.
    ///
    /// Wraps the underlying cause; the retryable flag is inherited from it.
    #[error("pipeline failure during {stage}: {source}")]
    Pipeline {
        stage: &'static str,
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    pub fn embedding(message: impl Into<String>, retryable: bool) -> Self {
        Self::Embedding {
            message: message.into(),
            retryable,
        }
    }

    pub fn vector_db(message: impl Into<String>, retryable: bool) -> Self {
        Self::VectorDb {
            message: message.into(),
            retryable,
        }
    }

    pub fn generation(message: impl Into<String>, retryable: bool) -> Self {
        Self::Generation {
            message: message.into(),
            retryable,
        }
    }

    /// Wrap a failure with the pipeline stage it occurred in.
    pub fn pipeline(stage: &'static str, source: RagError) -> Self {
        Self::Pipeline {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether retrying the failed operation is sensible.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::Chunking(_) => false,
            Self::Embedding { retryable, .. }
            | Self::VectorDb { retryable, .. }
            | Self::Generation { retryable, .. } => *retryable,
            Self::Pipeline { source, .. } => source.is_retryable(),
        }
    }
}
