//! TOML configuration for the RAG pipeline.
//!
//! Defaults match the reference deployment: 1200/200 chunking for
//! textbook-style prose (a 300/50 profile for short-form transcripts),
//! 768-dimension embeddings in batches of 10, top-5 retrieval gated at
//! 0.7 confidence.

use std::path::Path;

use serde::Deserialize;

use crate::error::{RagError, Result};
use crate::models::ContentType;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Chunking profile for a content category. Short-form transcript
    /// content uses smaller windows than textbook prose.
    pub fn for_content(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Transcript => Self {
                chunk_size: 300,
                chunk_overlap: 50,
            },
            _ => Self::default(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API key, if the endpoint needs one.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_embedding_key_env(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_embedding_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `"memory"` or `"rest"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Base URL of the REST backend. Required when `backend = "rest"`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_vector_key_env")]
    pub api_key_env: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            namespace: String::new(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_vector_key_env(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}
fn default_vector_key_env() -> String {
    "VECTOR_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: default_generation_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
            api_key_env: default_generation_key_env(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_generation_key_env() -> String {
    "GENERATION_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_confidence_threshold() -> f32 {
    0.7
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::Configuration(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| RagError::Configuration(format!("failed to parse config file: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        return Err(RagError::Configuration(
            "chunking.chunk_size must be > 0".into(),
        ));
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        return Err(RagError::Configuration(
            "chunking.chunk_overlap must be smaller than chunking.chunk_size".into(),
        ));
    }
    if config.embedding.dims == 0 {
        return Err(RagError::Configuration("embedding.dims must be > 0".into()));
    }
    if config.embedding.batch_size == 0 {
        return Err(RagError::Configuration(
            "embedding.batch_size must be > 0".into(),
        ));
    }
    if config.retrieval.top_k == 0 {
        return Err(RagError::Configuration("retrieval.top_k must be >= 1".into()));
    }
    if !(0.0..=1.0).contains(&config.retrieval.confidence_threshold) {
        return Err(RagError::Configuration(
            "retrieval.confidence_threshold must be in [0.0, 1.0]".into(),
        ));
    }
    match config.vector.backend.as_str() {
        "memory" => {}
        "rest" => {
            if config.vector.url.is_none() {
                return Err(RagError::Configuration(
                    "vector.url is required when vector.backend is 'rest'".into(),
                ));
            }
        }
        other => {
            return Err(RagError::Configuration(format!(
                "unknown vector backend: '{}'. Must be memory or rest.",
                other
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_tuning() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 1200);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.embedding.dims, 768);
        assert_eq!(config.embedding.batch_size, 10);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.confidence_threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_transcript_profile() {
        let profile = ChunkingConfig::for_content(ContentType::Transcript);
        assert_eq!(profile.chunk_size, 300);
        assert_eq!(profile.chunk_overlap, 50);

        let textbook = ChunkingConfig::for_content(ContentType::Textbook);
        assert_eq!(textbook.chunk_size, 1200);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyrag.toml");
        std::fs::write(
            &path,
            r#"
[chunking]
chunk_size = 300
chunk_overlap = 50

[embedding]
endpoint = "http://localhost:9000/v1/embeddings"
dims = 384

[vector]
backend = "memory"
namespace = "class12"

[retrieval]
top_k = 3
confidence_threshold = 0.6
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 300);
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.vector.namespace, "class12");
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        )
        .unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_rest_backend_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[vector]\nbackend = \"rest\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[vector]\nbackend = \"sqlite\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
